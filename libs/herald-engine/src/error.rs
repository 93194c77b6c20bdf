use std::time::Duration;

use herald_api::error::{BackendError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("config error: {0}")]
    Config(String),

    /// Broker or schema registry unreachable. Fatal for producer construction.
    #[error("connection error: {0}")]
    Connection(BackendError),

    #[error("schema error: {0}")]
    Schema(BackendError),

    #[error("serialization error: {0}")]
    Serialization(BackendError),

    #[error("delivery error: {0}")]
    Delivery(BackendError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("producer for topic '{topic}' is closed")]
    Closed { topic: String },

    #[error("close error: {0}")]
    Close(BackendError),
}

impl ProducerError {
    /// Add context to the error.
    ///
    /// For backend variants, context is added to the inner `BackendError`.
    /// `Config` gets the context prepended; other variants are returned as-is.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            ProducerError::Config(msg) => ProducerError::Config(format!("{ctx}: {msg}")),
            ProducerError::Connection(e) => ProducerError::Connection(e.with_context(ctx)),
            ProducerError::Schema(e) => ProducerError::Schema(e.with_context(ctx)),
            ProducerError::Serialization(e) => ProducerError::Serialization(e.with_context(ctx)),
            ProducerError::Delivery(e) => ProducerError::Delivery(e.with_context(ctx)),
            ProducerError::Close(e) => ProducerError::Close(e.with_context(ctx)),
            other => other,
        }
    }

    /// Classify an error raised while talking to the schema registry.
    pub(crate) fn from_registry(e: BackendError) -> Self {
        match e.kind {
            ErrorKind::Schema => ProducerError::Schema(e),
            _ => ProducerError::Connection(e),
        }
    }
}

impl From<BackendError> for ProducerError {
    fn from(e: BackendError) -> Self {
        match e.kind {
            ErrorKind::Config => ProducerError::Config(e.message),
            ErrorKind::Connection | ErrorKind::Io => ProducerError::Connection(e),
            ErrorKind::Schema => ProducerError::Schema(e),
            ErrorKind::Serialization => ProducerError::Serialization(e),
            ErrorKind::Timeout
            | ErrorKind::Admin
            | ErrorKind::AlreadyExists
            | ErrorKind::UnknownTopic
            | ErrorKind::Delivery => ProducerError::Delivery(e),
        }
    }
}

/// Why a provisioning attempt did not leave the topic known to exist.
/// Never fatal: it is recorded in [`ProvisionOutcome::Failed`](crate::ProvisionOutcome).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProvisionError {
    #[error("admin connection failed: {0}")]
    Connection(BackendError),

    #[error("metadata request failed: {0}")]
    Metadata(BackendError),

    #[error("topic creation failed: {0}")]
    Creation(BackendError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}
