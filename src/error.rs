//! Failure taxonomy shared by every client operation

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Transport fault, malformed response, or an error reported by the node.
    #[error("Remote call {method} failed: {reason}")]
    RemoteCall { method: String, reason: String },

    #[error("Call encoding error: {0}")]
    CallEncoding(String),

    #[error("Compilation failed: {reason}")]
    Compile { reason: String, source_code: String },

    /// Terminal for the watch that produced it.
    #[error("Poll of filter {filter_id} failed: {reason}")]
    Poll { filter_id: String, reason: String },

    #[error("Executor is shut down and no longer accepts work")]
    ExecutorClosed,

    #[error("Unit of work panicked: {0}")]
    WorkerPanic(String),
}

impl ClientError {
    pub fn remote(method: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteCall {
            method: method.into(),
            reason: reason.to_string(),
        }
    }

    pub fn encoding(reason: impl ToString) -> Self {
        Self::CallEncoding(reason.to_string())
    }

    pub fn compile(reason: impl ToString, source_code: impl Into<String>) -> Self {
        Self::Compile {
            reason: reason.to_string(),
            source_code: source_code.into(),
        }
    }

    pub fn poll(filter_id: impl ToString, reason: impl ToString) -> Self {
        Self::Poll {
            filter_id: filter_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteCall { .. } => "remote_call",
            Self::CallEncoding(_) => "call_encoding",
            Self::Compile { .. } => "compile",
            Self::Poll { .. } => "poll",
            Self::ExecutorClosed => "executor_closed",
            Self::WorkerPanic(_) => "worker_panic",
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ClientError::remote("eth_getBalance", "connection refused");
        assert_eq!(
            err.to_string(),
            "Remote call eth_getBalance failed: connection refused"
        );
        assert_eq!(err.kind(), "remote_call");

        let err = ClientError::compile("unparseable output", "contract A {}");
        match &err {
            ClientError::Compile { source_code, .. } => assert_eq!(source_code, "contract A {}"),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.to_string(), "Compilation failed: unparseable output");
    }
}
