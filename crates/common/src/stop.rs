use tokio::sync::watch;

/// Owner side of the shutdown signal
///
/// Dropping the source counts as a stop request for every outstanding token.
#[derive(Debug)]
pub struct StopSource {
    tx: watch::Sender<bool>,
}

impl StopSource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Create a token observing this source
    pub fn token(&self) -> StopToken {
        StopToken { rx: self.tx.subscribe() }
    }

    /// Broadcast the stop request to every token
    pub fn request_stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the shutdown signal, cheap to clone into every task
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once a stop has been requested
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // An error means the source is gone, which is a stop as well
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_stop_reaches_all_tokens() {
        let source = StopSource::new();
        let first = source.token();
        let second = first.clone();
        assert!(!first.is_stopped());

        let waiter = tokio::spawn(async move { second.stopped().await });
        source.request_stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(first.is_stopped());
        assert!(source.is_stopped());
    }

    #[tokio::test]
    async fn test_dropped_source_stops_tokens() {
        let source = StopSource::new();
        let token = source.token();
        drop(source);

        assert!(token.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), token.stopped())
            .await
            .unwrap();
    }
}
