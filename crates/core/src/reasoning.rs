//! Interface to the backend reasoning service that answers intercepted tool
//! calls.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Non-fatal by design: a reasoning failure is reported back to the model as
/// an unsuccessful tool result and never changes session state.
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning backend unavailable: {0}")]
    Unavailable(String),
}

/// Answers a free-text query in the context of one session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Single best-effort attempt; no retry, no timeout.
    async fn ask(&self, message: &str, session_id: &str) -> Result<String, ReasoningError>;
}
