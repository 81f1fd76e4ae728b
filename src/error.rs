//! Error taxonomy for the indexing engine.
//!
//! Collaborators (adapters, stores, enrichers) speak `anyhow`. The engine
//! sorts their failures into the levels below so callers can tell an
//! item that will be retried next cycle from a cycle that triggers backoff.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Failure writing one item's nodes to the stores.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The graph write failed; the vector store was not touched.
    #[error("graph store write failed: {0:#}")]
    Graph(anyhow::Error),

    /// The vector write failed after the graph write succeeded. The graph
    /// holds the nodes until the next cycle re-attempts the full write.
    #[error("vector store write failed after graph write: {0:#}")]
    Vector(anyhow::Error),
}

/// Failure of the single-item pipeline. Recorded in the cycle stats; the
/// cycle carries on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transform failed: {0:#}")]
    Transform(anyhow::Error),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

/// Failure of a whole cycle. Triggers backoff and counts toward the
/// circuit breaker.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("cursor store failed: {0:#}")]
    Cursor(anyhow::Error),

    #[error("fetch_delta failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

/// Raised by [`timed`] when the deadline passes.
#[derive(Debug, Error)]
#[error("{label} timed out after {after:?}")]
pub struct CallTimeout {
    pub label: &'static str,
    pub after: Duration,
}

/// Run a collaborator call under a deadline.
///
/// The outer `Result` is the deadline; the inner one is the call's own
/// outcome.
pub async fn timed<T, F>(
    label: &'static str,
    after: Duration,
    fut: F,
) -> Result<anyhow::Result<T>, CallTimeout>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| CallTimeout { label, after })
}

impl From<CallTimeout> for PipelineError {
    fn from(t: CallTimeout) -> Self {
        PipelineError::Timeout(t.label, t.after)
    }
}

impl From<CallTimeout> for CycleError {
    fn from(t: CallTimeout) -> Self {
        CycleError::Timeout(t.label, t.after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timed_reports_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, anyhow::Error>(1)
        };
        let err = timed("store.write", Duration::from_secs(1), slow)
            .await
            .unwrap_err();
        assert_eq!(err.label, "store.write");
        let as_item: PipelineError = err.into();
        assert!(as_item.to_string().contains("store.write timed out"));
    }

    #[tokio::test]
    async fn timed_passes_inner_result_through() {
        let ok = timed("x", Duration::from_secs(1), async { Ok::<_, anyhow::Error>(7) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ok, 7);

        let inner = timed("x", Duration::from_secs(1), async {
            Err::<u8, _>(anyhow::anyhow!("nope"))
        })
        .await
        .unwrap();
        assert!(inner.is_err());
    }

    #[test]
    fn write_error_keeps_source_message() {
        let err = PipelineError::from(WriteError::Vector(anyhow::anyhow!("index offline")));
        assert!(err.to_string().contains("index offline"));
        assert!(err.to_string().contains("after graph write"));
    }
}
