use std::fmt;

/// What went wrong in a messaging client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad client configuration or plugin. Fatal at startup.
    Config,
    /// Broker unreachable, client closed, shard unavailable.
    Unavailable,
    /// Unknown stream or subscription.
    NotFound,
    /// Operation conflicts with current state (duplicate id, busy consumer).
    Conflict,
    /// Undecodable payload or config document.
    Format,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Format => "format",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error of a messaging client operation, or a delivery-level error
/// attached to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Prefix the message with where it happened; the kind is kept.
    pub fn context(mut self, ctx: impl fmt::Display) -> Self {
        self.message = format!("{ctx}: {}", self.message);
        self
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::format(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_message_then_kind() {
        let err = ClientError::not_found("stream 'quotes' not found");
        assert_eq!(err.to_string(), "stream 'quotes' not found (not found)");
    }

    #[test]
    fn context_keeps_kind() {
        let err = ClientError::unavailable("connection refused").context("create subscription 'sub'");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(err.message, "create subscription 'sub': connection refused");
    }

    #[test]
    fn json_errors_are_format_errors() {
        let err: ClientError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
