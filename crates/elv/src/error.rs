//! Error taxonomy shared by every river.
//!
//! Whether a failure is retried, halts the message, or only produces a log
//! line is decided by its [`ErrorKind`], never by which concrete type was
//! thrown where.

use std::borrow::Cow;
use std::fmt;

/// What kind of failure this is, and therefore what happens next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network failure, 5xx or timeout. Retried by the client wrapper.
    Transient,
    /// A transient failure that kept failing past the retry budget.
    RetriesExhausted,
    /// Missing prior record, indeterminate lookup, overridden calculation.
    /// Never retried.
    DataIntegrity,
    /// A business rule the result must satisfy before it may be paid out.
    /// Never retried; surfaced to operators.
    BusinessInvariant,
    /// Worth a warning, not worth stopping for.
    Advisory,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::DataIntegrity => "data_integrity",
            ErrorKind::BusinessInvariant => "business_invariant",
            ErrorKind::Advisory => "advisory",
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    /// Everything but advisories stops the message from advancing.
    pub fn halts_message(self) -> bool {
        !matches!(self, ErrorKind::Advisory)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by domain errors so the framework can apply policy by kind.
pub trait Categorizable {
    fn kind(&self) -> ErrorKind;

    /// Stable identifier suitable for dashboards and alerts.
    fn code(&self) -> &'static str;
}

/// Error returned from a river handler.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RiverError {
    kind: ErrorKind,
    code: Cow<'static, str>,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RiverError {
    pub fn new(kind: ErrorKind, code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, code, message)
    }

    pub fn data_integrity(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataIntegrity, code, message)
    }

    pub fn business_invariant(
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::BusinessInvariant, code, message)
    }

    /// Wrap any categorized error, keeping it as the source.
    pub fn categorized<E>(error: E) -> Self
    where
        E: Categorizable + std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: error.kind(),
            code: Cow::Borrowed(error.code()),
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<crate::packet::PacketError> for RiverError {
    fn from(error: crate::packet::PacketError) -> Self {
        RiverError::categorized(error)
    }
}
