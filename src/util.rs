//! Small shared helpers.

use tokio::sync::mpsc;

/// Send a value through a channel, logging a warning when the receiver is
/// gone instead of propagating the error to every call site.
pub async fn send_or_log<T>(tx: &mpsc::Sender<T>, value: T, context: &str) {
    if let Err(e) = tx.send(value).await {
        tracing::warn!("Failed to send {}: {}", context, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_when_receiver_alive() {
        let (tx, mut rx) = mpsc::channel(1);
        send_or_log(&tx, 7, "test value").await;
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn swallows_closed_channel() {
        let (tx, rx) = mpsc::channel::<i32>(1);
        drop(rx);
        send_or_log(&tx, 7, "test value").await;
    }
}
