//! Periodic driver shared by the producer loops.
//!
//! A [`Producer`] does one unit of work per tick. [`run_periodic`] calls it on
//! a fixed interval until the shutdown signal flips to `true` (or its sender
//! is dropped). The signal is only checked between ticks, so a tick that has
//! started always finishes.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Work performed once per tick.
#[async_trait]
pub trait Producer: Send + 'static {
    /// Result of a single tick, for callers driving ticks by hand.
    type Outcome: Send;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Perform one tick.
    async fn tick(&mut self) -> Self::Outcome;
}

/// Tick `producer` every `period` until shutdown, then hand it back.
pub async fn run_periodic<P: Producer>(
    mut producer: P,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> P {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(producer = producer.name(), ?period, "Producer loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                producer.tick().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(producer = producer.name(), "Producer loop stopped");
    producer
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        ticks: u32,
    }

    #[async_trait]
    impl Producer for Counter {
        type Outcome = u32;

        fn name(&self) -> &'static str {
            "counter"
        }

        async fn tick(&mut self) -> u32 {
            self.ticks += 1;
            self.ticks
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_periodic(
            Counter { ticks: 0 },
            Duration::from_millis(100),
            rx,
        ));

        // First tick fires immediately, then one every 100 ms.
        tokio::time::sleep(Duration::from_millis(450)).await;
        tx.send_replace(true);

        let counter = handle.await.unwrap();
        assert_eq!(counter.ticks, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_periodic(
            Counter { ticks: 0 },
            Duration::from_millis(100),
            rx,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(tx);
        assert_eq!(handle.await.unwrap().ticks, 1);
    }

    #[tokio::test]
    async fn already_signalled_never_ticks() {
        let (_tx, rx) = watch::channel(true);
        let counter = run_periodic(Counter { ticks: 0 }, Duration::from_millis(1), rx).await;
        assert_eq!(counter.ticks, 0);
    }
}
