use anyhow::Result;
use clap::Parser;
use steward::{config, tui};

#[derive(Parser, Debug)]
#[command(name = "steward")]
#[command(about = "Terminal dashboard for supervising multi-agent analysis pipeline runs")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    /// Pipeline API base URL (overrides config)
    #[arg(long)]
    server: Option<String>,

    /// Attach to an existing analysis session instead of starting fresh
    #[arg(long)]
    session: Option<String>,

    /// Week to analyze when triggering a run (e.g. 2026-W34)
    #[arg(long)]
    week: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("steward=info".parse()?),
        )
        .init();

    let mut config = config::load(args.config.as_deref())?;
    if let Some(server) = args.server {
        config.server.base_url = server;
    }

    tui::run(config, args.session, args.week).await
}
