//! Rendering: header, progress gauge, agent roster, log pane, banners.

use crate::data::{AgentState, AgentStatus, Connectivity, SessionStatus};
use crate::tui::app::{App, SPINNER_FRAMES};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table};
use ratatui::Frame;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_notice(f, app, chunks[1]);
    draw_gauge(f, app, chunks[2]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[3]);
    draw_agent_table(f, app, main[0]);
    draw_log_pane(f, app, main[1]);

    draw_footer(f, app, chunks[4]);
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let snapshot = &app.snapshot;
    let session = snapshot.session_id.as_deref().unwrap_or("no session");
    let week = snapshot.week.as_deref().unwrap_or("-");

    let mut status_spans = vec![
        Span::styled(
            snapshot.status.label(),
            Style::default()
                .fg(status_color(snapshot.status))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  ·  "),
        Span::styled(
            snapshot.connectivity.label(),
            Style::default().fg(connectivity_color(snapshot.connectivity)),
        ),
    ];
    if snapshot.status == SessionStatus::Processing {
        status_spans.push(Span::raw(format!(
            "  {}",
            SPINNER_FRAMES[app.spinner_frame]
        )));
    }

    let header = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Steward", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("  session: {session}  week: {week}")),
        ]),
        Line::from(status_spans),
    ])
    .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, area);
}

/// One line for the most urgent banner: failure, connectivity loss, retry
/// indicator, or transient operator feedback, in that order.
fn draw_notice(f: &mut Frame, app: &App, area: Rect) {
    let snapshot = &app.snapshot;

    let line = if let Some(error) = &snapshot.error {
        let hint = if error.can_retry {
            "  (press r to retry)"
        } else {
            ""
        };
        Line::from(Span::styled(
            format!("✗ {}{hint}", error.message),
            Style::default().fg(Color::Red),
        ))
    } else if let Some(reason) = &snapshot.connectivity_error {
        Line::from(Span::styled(
            format!("✗ {reason}"),
            Style::default().fg(Color::Red),
        ))
    } else if let Some(retry) = &snapshot.retrying {
        let attempts = match (retry.attempt, retry.max_attempts) {
            (Some(a), Some(m)) => format!(" (attempt {a}/{m})"),
            (Some(a), None) => format!(" (attempt {a})"),
            _ => String::new(),
        };
        let notice = retry.notice.as_deref().unwrap_or("pipeline retrying");
        Line::from(Span::styled(
            format!("↻ {notice}{attempts}"),
            Style::default().fg(Color::Yellow),
        ))
    } else if let Some(status) = &app.status_line {
        Line::from(Span::styled(
            status.clone(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::default()
    };

    f.render_widget(Paragraph::new(line), area);
}

fn draw_gauge(f: &mut Frame, app: &App, area: Rect) {
    let progress = app.snapshot.progress.min(100);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Progress "))
        .gauge_style(Style::default().fg(status_color(app.snapshot.status)))
        .ratio(f64::from(progress) / 100.0)
        .label(format!("{progress}%"));
    f.render_widget(gauge, area);
}

fn draw_agent_table(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .snapshot
        .agents
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let style = if i == app.selected_agent {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(Span::styled(
                    agent_icon(agent.status).to_string(),
                    Style::default().fg(agent_color(agent.status)),
                )),
                Cell::from(agent.id.label()),
                Cell::from(agent.status.label()),
                Cell::from(
                    agent
                        .confidence
                        .map(|c| format!("{c:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::from(
                    agent
                        .last_log()
                        .map(|l| l.message.clone())
                        .unwrap_or_default(),
                ),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["", "Agent", "Status", "Conf", "Last activity"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(" Agents "));
    f.render_widget(table, area);
}

fn draw_log_pane(f: &mut Frame, app: &App, area: Rect) {
    let (title, lines) = match app.selected_agent_state() {
        Some(agent) => (
            format!(" {} — {} ", agent.id.label(), agent.id.role()),
            log_lines(agent, app.log_scroll),
        ),
        None => (" Log ".to_string(), Vec::new()),
    };

    let pane = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(pane, area);
}

fn log_lines(agent: &AgentState, scroll: usize) -> Vec<Line<'static>> {
    agent
        .logs
        .iter()
        .skip(scroll)
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    entry.timestamp.format("%H:%M:%S ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(entry.message.clone()),
            ])
        })
        .collect()
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let rerun_hint = if app.snapshot.status == SessionStatus::Failed {
        "r rerun · "
    } else {
        ""
    };
    let footer = Paragraph::new(Line::from(Span::styled(
        format!(" q quit · j/k agents · J/K scroll log · s start run · {rerun_hint}"),
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(footer, area);
}

fn status_color(status: SessionStatus) -> Color {
    match status {
        SessionStatus::Initializing => Color::DarkGray,
        SessionStatus::Processing => Color::Yellow,
        SessionStatus::Completed => Color::Green,
        SessionStatus::Failed => Color::Red,
    }
}

fn connectivity_color(connectivity: Connectivity) -> Color {
    match connectivity {
        Connectivity::Connecting => Color::DarkGray,
        Connectivity::Open => Color::Green,
        Connectivity::Reconnecting => Color::Yellow,
        Connectivity::Lost => Color::Red,
    }
}

fn agent_icon(status: AgentStatus) -> char {
    match status {
        AgentStatus::Idle => '○',
        AgentStatus::Running => '●',
        AgentStatus::Completed => '●',
        AgentStatus::Error => '✗',
    }
}

fn agent_color(status: AgentStatus) -> Color {
    match status {
        AgentStatus::Idle => Color::DarkGray,
        AgentStatus::Running => Color::Yellow,
        AgentStatus::Completed => Color::Green,
        AgentStatus::Error => Color::Red,
    }
}
