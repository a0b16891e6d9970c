use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{info, warn};

use crate::engine::BookingCore;
use crate::notify::Invalidation;

/// Apply invalidations from `rx` until every sender is gone. A core holds
/// its own hub, so a listener on that hub runs until aborted.
///
/// Lagging behind the channel means some events were lost, so every cache
/// is dropped.
pub async fn run_invalidation_listener(core: Arc<BookingCore>, mut rx: Receiver<Invalidation>) {
    loop {
        match rx.recv().await {
            Ok(event) => core.handle_invalidation(&event).await,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "invalidation listener lagged; clearing all caches");
                core.clear_caches().await;
            }
            Err(RecvError::Closed) => break,
        }
    }
    info!("invalidation listener stopped");
}
