use std::fmt;

/// Error kind for backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Timeout,
    Admin,
    AlreadyExists,
    UnknownTopic,
    Schema,
    Serialization,
    Delivery,
    Io,
}

/// Error returned by all broker, registry and codec trait methods.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }

    pub fn admin(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Admin, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, msg)
    }

    pub fn unknown_topic(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownTopic, msg)
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, msg)
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, msg)
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Delivery, msg)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BackendError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → BackendError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let err = BackendError::schema("unknown type 'strnig'").with_context("key schema");
        assert!(err.is(ErrorKind::Schema));
        assert_eq!(err.message, "key schema: unknown type 'strnig'");
        assert_eq!(err.to_string(), "Schema: key schema: unknown type 'strnig'");
    }
}
