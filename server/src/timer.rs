//! Deadline ticker
//!
//! One low-frequency loop drives every room's phase deadlines: 60 seconds
//! of painting, 30 seconds of guessing. Expiry fires the exact transition
//! the corresponding message would, within one tick of the deadline. No
//! finer precision is promised.

use crate::engine::Engine;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub async fn run_timer(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.check_deadlines().await;
            }
            _ = shutdown.changed() => {
                info!("Timer stopping");
                break;
            }
        }
    }
}
