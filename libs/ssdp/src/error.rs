//! Error types for SSDP parsing.

use thiserror::Error;

/// Errors produced while parsing an SSDP datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsdpError {
    /// Datagram is not valid UTF-8.
    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    /// Datagram has no start line.
    #[error("empty datagram")]
    Empty,

    /// Start line is neither a known request nor a status line.
    #[error("malformed start line: {0}")]
    MalformedStartLine(String),

    /// Request method other than NOTIFY or M-SEARCH.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Response with a status other than 200.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(String),

    /// Header line without a colon.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    /// A header required for this message type is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// A header is present but its value cannot be used.
    #[error("invalid {name} header: {value}")]
    InvalidHeader { name: &'static str, value: String },
}

impl SsdpError {
    /// Stable reason code for logging.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SsdpError::NotUtf8 => "not_utf8",
            SsdpError::Empty => "empty",
            SsdpError::MalformedStartLine(_) => "malformed_start_line",
            SsdpError::UnsupportedMethod(_) => "unsupported_method",
            SsdpError::UnexpectedStatus(_) => "unexpected_status",
            SsdpError::MalformedHeader(_) => "malformed_header",
            SsdpError::MissingHeader(_) => "missing_header",
            SsdpError::InvalidHeader { .. } => "invalid_header",
        }
    }
}
