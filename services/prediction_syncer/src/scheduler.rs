use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::error::Result;

/// Shutdown signal shared by every periodic loop. Flip it with
/// `sender.send(true)`; loops stop at their next tick boundary.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Runs one cycle of `task` and logs its outcome. A failed cycle is logged,
/// never propagated.
pub async fn run_now<F, Fut>(name: &str, task: &F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let started = Instant::now();
    match task().await {
        Ok(()) => {
            info!("{} finished in {:?}", name, started.elapsed());
            true
        }
        Err(e) => {
            error!("{} failed after {:?}: {}", name, started.elapsed(), e);
            false
        }
    }
}

/// Runs `task` immediately and then every `period` until `shutdown` turns
/// true or its sender is dropped. A running cycle is never interrupted; a
/// slow cycle delays the next tick instead of bunching ticks up.
pub async fn run_every<F, Fut>(
    name: &str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    task: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Starting {} every {:?}", name, period);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                run_now(name, &task).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Stopped {}", name);
}
