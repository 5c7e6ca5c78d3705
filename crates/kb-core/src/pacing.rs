//! Fixed-interval request pacing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

#[derive(Debug)]
struct PacerState {
    last_request: Option<Instant>,
}

/// Enforces a minimum interval between consecutive requests to one provider.
///
/// The first call never waits. Clones share the same clock.
#[derive(Clone, Debug)]
pub struct Pacer {
    state: Arc<Mutex<PacerState>>,
    min_interval: Duration,
}

impl Pacer {
    /// Creates a pacer with the given minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(PacerState { last_request: None })),
            min_interval,
        }
    }

    /// Creates a pacer that never waits.
    #[must_use]
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns the configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the interval since the previous request has elapsed,
    /// then records the current instant as the latest request.
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        state.last_request = Some(Instant::now());
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::unpaced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let pacer = Pacer::new(Duration::from_secs(5));
        let started = std::time::Instant::now();
        pacer.wait().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_spaced() {
        let pacer = Pacer::new(Duration::from_millis(50));
        let started = std::time::Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_clones_share_clock() {
        let pacer = Pacer::new(Duration::from_millis(40));
        let other = pacer.clone();
        let started = std::time::Instant::now();
        pacer.wait().await;
        other.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
