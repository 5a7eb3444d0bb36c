//! Error types for the RTSP server core.

use std::fmt;

/// Errors that can occur in the RTSP server core.
///
/// None of these is fatal to the server process. They fall into:
///
/// - **Protocol**: [`MalformedRequest`](Self::MalformedRequest) and
///   [`UnsupportedTransport`](Self::UnsupportedTransport). The request is
///   dropped without a response.
/// - **Ingest**: [`BufferFull`](Self::BufferFull). The pushed chunk is
///   dropped, the stream continues.
/// - **Connection**: [`ConnectionClosed`](Self::ConnectionClosed),
///   [`SendFailure`](Self::SendFailure), [`Io`](Self::Io). Isolated to one
///   client.
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request could not be parsed or lacked a `CSeq` header.
    #[error("malformed RTSP request: {kind}")]
    MalformedRequest { kind: ParseErrorKind },

    /// SETUP carried a `Transport` header we cannot serve.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// The stream cache cannot hold the pushed chunk.
    #[error("stream buffer full: need {needed} bytes, {available} available")]
    BufferFull { needed: usize, available: usize },

    /// The peer closed its end of the connection (zero-byte read).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A send wrote fewer bytes than requested.
    #[error("short write: {written} of {expected} bytes")]
    SendFailure { written: usize, expected: usize },

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// Codec name not recognised (expected `h264` or `h265`).
    #[error("unknown codec: {0}")]
    UnknownCodec(String),
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The mandatory `CSeq` header was absent or not a number.
    MissingCSeq,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::MissingCSeq => write!(f, "missing CSeq"),
        }
    }
}

impl From<ParseErrorKind> for RtspError {
    fn from(kind: ParseErrorKind) -> Self {
        RtspError::MalformedRequest { kind }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
