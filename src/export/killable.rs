//! Killable remote calls for export jobs.
//!
//! Every query an export issues gets an [`OperationHandle`] carrying a unique
//! comment. Remote calls are raced against the job's `CancellationToken`:
//!
//! 1. The call completes normally and its result is returned
//! 2. The token fires first: the server-side query is cancelled through the
//!    connection's [`QueryCanceller`] and [`Step::Cancelled`] is returned
//!
//! Cancellation is reported as a value, never as an error, so callers keep
//! it apart from genuine failures.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connection::QueryCanceller;
use crate::error::Result;

/// A handle representing a query that can be killed.
///
/// The comment is handed to the data source together with the query so the
/// data source can locate and abort it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    /// Unique comment identifying this operation.
    ///
    /// Format: `tabexport-<client_id>-<uuid>`
    pub comment: String,
}

impl OperationHandle {
    /// Create a new operation handle with a unique comment.
    ///
    /// # Arguments
    /// * `client_id` - Identifier for this process (e.g. hostname)
    pub fn new(client_id: &str) -> Self {
        Self {
            comment: format!("tabexport-{}-{}", client_id, Uuid::new_v4()),
        }
    }

    /// Get the comment string identifying the query.
    pub fn comment(&self) -> &str {
        &self.comment
    }
}

/// Identifier of this process used in operation comments.
pub fn client_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "local".to_string())
}

/// Outcome of a remote call raced against cancellation
#[derive(Debug, PartialEq)]
pub enum Step<T> {
    /// The call finished before cancellation
    Ready(T),
    /// The token fired; the server-side query has been asked to stop
    Cancelled,
}

/// Run a remote call with server-side cancellation support.
///
/// * If the call completes first, its result is returned as [`Step::Ready`]
///   (or its error is propagated)
/// * If `cancel_token` fires first, the pending call is dropped, the query
///   identified by `handle` is cancelled through `canceller`, and
///   [`Step::Cancelled`] is returned
///
/// A token that is already cancelled wins without polling the call.
pub async fn run_killable<F, T>(
    canceller: &dyn QueryCanceller,
    handle: &OperationHandle,
    cancel_token: &CancellationToken,
    call: F,
) -> Result<Step<T>>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            debug!("Cancelling {}", handle.comment());
            if let Err(e) = canceller.cancel(handle).await {
                // The fetch loop stops regardless of the server's answer
                warn!("Failed to cancel {}: {}", handle.comment(), e);
            }
            Ok(Step::Cancelled)
        }
        result = call => result.map(Step::Ready),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{DataSource, MemoryDataSource};
    use std::sync::Arc;

    async fn canceller(source: &MemoryDataSource) -> Arc<dyn QueryCanceller> {
        let conn = source.connect("Data Source=memory").await.unwrap();
        conn.canceller()
    }

    #[test]
    fn test_operation_handle_format() {
        let handle = OperationHandle::new("test-client");
        assert!(handle.comment.starts_with("tabexport-test-client-"));
        assert!(handle.comment.len() > "tabexport-test-client-".len());
    }

    #[test]
    fn test_operation_handle_uniqueness() {
        let handle1 = OperationHandle::new("test");
        let handle2 = OperationHandle::new("test");
        assert_ne!(handle1.comment, handle2.comment);
    }

    #[test]
    fn test_client_id_not_empty() {
        assert!(!client_id().is_empty());
    }

    #[tokio::test]
    async fn test_ready_when_not_cancelled() {
        let source = MemoryDataSource::new();
        let canceller = canceller(&source).await;
        let handle = OperationHandle::new("test");
        let token = CancellationToken::new();

        let step = run_killable(canceller.as_ref(), &handle, &token, async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(step, Step::Ready(42));
        assert!(source.cancelled_queries().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_call_kills_query() {
        let source = MemoryDataSource::new();
        let canceller = canceller(&source).await;
        let handle = OperationHandle::new("test");
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let step: Step<()> = run_killable(
            canceller.as_ref(),
            &handle,
            &token,
            std::future::pending::<Result<()>>(),
        )
        .await
        .unwrap();

        assert_eq!(step, Step::Cancelled);
        assert_eq!(source.cancelled_queries(), vec![handle.comment().to_string()]);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let source = MemoryDataSource::new();
        let canceller = canceller(&source).await;
        let handle = OperationHandle::new("test");
        let token = CancellationToken::new();

        let result: Result<Step<()>> = run_killable(canceller.as_ref(), &handle, &token, async {
            Err("boom".into())
        })
        .await;
        assert!(result.is_err());
    }
}
