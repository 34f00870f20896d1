//! Waiting between attempts.

use async_trait::async_trait;
use std::time::Duration;

use crate::export::ExportError;
use crate::shutdown::ShutdownCoordinator;

/// Performs the blocking waits of the poll and retry loops.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wait `duration`, returning [`ExportError::Cancelled`] if shutdown is
/// requested first.
pub(crate) async fn pause(
    sleeper: &dyn Sleeper,
    shutdown: Option<&ShutdownCoordinator>,
    duration: Duration,
) -> Result<(), ExportError> {
    match shutdown {
        None => {
            sleeper.sleep(duration).await;
            Ok(())
        }
        Some(shutdown) => {
            if shutdown.is_shutdown_requested() {
                return Err(ExportError::Cancelled);
            }
            tokio::select! {
                _ = sleeper.sleep(duration) => Ok(()),
                _ = shutdown.wait_for_shutdown() => Err(ExportError::Cancelled),
            }
        }
    }
}
