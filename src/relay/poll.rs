//! The main loop: fetch a batch, dispatch it, repeat until interrupted.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::relay::chat::{ChatApi, InboundEvent};
use crate::relay::dispatcher::Dispatcher;
use crate::relay::provider::Provider;

/// Fetching updates from the chat platform failed.
#[derive(Debug, Error)]
#[error("failed to fetch updates: {0}")]
pub struct PollError(pub String);

/// Source of inbound events, one batch per call.
pub trait EventSource {
    fn next_batch(&mut self) -> impl Future<Output = Result<Vec<InboundEvent>, PollError>> + Send;
}

/// Pause between failed fetches. Doubles on every failure up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Run until `shutdown` is cancelled.
///
/// Events are handled one at a time, in the order received. A cancelled
/// token abandons a pending fetch or pause. A batch already fetched is
/// handled in full, since its updates are acknowledged.
pub async fn run<S, P, C>(
    source: &mut S,
    dispatcher: &mut Dispatcher<P, C>,
    mut backoff: Backoff,
    shutdown: CancellationToken,
) where
    S: EventSource,
    P: Provider,
    C: ChatApi,
{
    info!("Polling for updates");

    loop {
        let batch = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            batch = source.next_batch() => batch,
        };

        match batch {
            Ok(events) => {
                backoff.reset();
                for event in events {
                    dispatcher.handle(event).await;
                }
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("[polling error] {e}; retrying in {delay:?}");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!("Poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(3), Duration::from_secs(20));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![3, 6, 12, 20, 20]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_max_below_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
