//! Tokio plumbing for the abandonment tick.
//!
//! The decision core is synchronous: hosts call
//! [`AbrOrchestrator::on_abandon_tick`](crate::AbrOrchestrator::on_abandon_tick)
//! every [`ABANDON_TICK_INTERVAL`] while a fragment loads. Hosts running on
//! tokio can spawn an [`AbandonTicker`] instead and drive the call from the
//! tick stream it emits. Cancellation is idempotent and also happens on
//! drop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Cadence of the emergency-abandonment check.
pub const ABANDON_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Background task emitting tick instants at the abandonment cadence.
#[derive(Debug)]
pub struct AbandonTicker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AbandonTicker {
    /// Spawn the tick loop on the current tokio runtime. Ticks stop when the
    /// receiver is dropped or the ticker is cancelled.
    pub fn spawn(ticks: mpsc::Sender<std::time::Instant>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ABANDON_TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of a tokio interval fires immediately; skip it
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    instant = interval.tick() => {
                        if ticks.send(instant.into_std()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Stop ticking. Safe to call any number of times.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for AbandonTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_cadence() {
        let (tx, mut rx) = mpsc::channel(8);
        let ticker = AbandonTicker::spawn(tx);
        tokio::task::yield_now().await;

        for _ in 0..4 {
            tokio::time::advance(ABANDON_TICK_INTERVAL).await;
            tokio::task::yield_now().await;
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert!(received >= 3, "expected at least 3 ticks, got {received}");
        ticker.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_stops_ticks() {
        let (tx, mut rx) = mpsc::channel(8);
        let ticker = AbandonTicker::spawn(tx);
        ticker.cancel();
        ticker.cancel();
        assert!(ticker.is_cancelled());

        tokio::time::advance(Duration::from_millis(500)).await;
        // drain anything raced in before the cancel landed
        while rx.try_recv().is_ok() {}
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }
}
