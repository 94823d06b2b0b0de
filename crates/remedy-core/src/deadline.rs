//! Deadline wrapper for collaborator calls.

use std::future::Future;
use std::time::Duration;

use remedy_state::{CollaboratorError, CollaboratorResult};

/// Await `call`, converting an elapsed `limit` into `CollaboratorError::Timeout`.
///
/// Dropping the inner future on timeout is the cancellation signal the
/// collaborator receives.
pub(crate) async fn with_deadline<T, F>(
    operation: &str,
    limit: Duration,
    call: F,
) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            operation: operation.to_string(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
