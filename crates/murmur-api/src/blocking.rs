use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use murmur_db::StoreResult;

use crate::error::ApiError;

/// Run a blocking store call off the async runtime, bounded by `timeout`.
///
/// A timed-out call is detached, not cancelled: the write still completes on
/// the blocking pool and only its result is discarded. The caller gets a
/// retryable [`ApiError::TransientStore`].
pub async fn run_store<S, T, F>(store: &Arc<S>, timeout: Duration, f: F) -> Result<T, ApiError>
where
    S: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> StoreResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    let task = tokio::task::spawn_blocking(move || f(&*store));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(e)) => {
            error!("spawn_blocking join error: {}", e);
            Err(ApiError::Internal(anyhow::anyhow!("store task failed: {}", e)))
        }
        Err(_) => {
            warn!("Store call exceeded {:?}", timeout);
            Err(ApiError::TransientStore(format!("timed out after {:?}", timeout)))
        }
    }
}
