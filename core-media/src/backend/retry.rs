//! The single initialize-then-retry allowed for engines that report they are
//! not yet initialized.

use std::future::Future;

use bridge_traits::{BridgeError, PlaybackEngine};
use tracing::warn;

use crate::error::Result;

/// Run `call`; if the engine answers `NotInitialized`, initialize it and run
/// `call` exactly once more. Any other outcome is returned as is.
pub(crate) async fn with_init_retry<T, F, Fut>(
    engine: &dyn PlaybackEngine,
    op: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bridge_traits::Result<T>>,
{
    match call().await {
        Err(BridgeError::NotInitialized(reason)) => {
            warn!(engine = engine.name(), op, %reason, "Engine not initialized, retrying once");
            engine.initialize().await?;
            Ok(call().await?)
        }
        other => Ok(other?),
    }
}
