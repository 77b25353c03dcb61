use std::io;

use reqwest::StatusCode;

/// Errors raised while opening or driving an HTTP byte stream.
///
/// Conditions that the reader recovers from internally (a response body
/// ending before its advertised length while bytes are still flowing) never
/// surface here; what does surface is terminal for the current stream.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The URL could not be parsed.
    #[error("invalid url `{url}`: {reason}")]
    Url { url: String, reason: String },

    /// The server answered an open with an unacceptable status.
    #[error("unexpected http status {status} at offset {offset}")]
    Status { status: StatusCode, offset: u64 },

    /// A ranged open was answered from the start of the resource.
    ///
    /// Restarting from byte zero would silently corrupt the caller's view
    /// of the stream, so this is refused rather than papered over.
    #[error("server ignored range request at offset {offset}")]
    RangeIgnored { offset: u64 },

    /// The requested range starts beyond the end of the resource and the
    /// resource length is unknown, so the condition cannot be treated as
    /// end-of-stream.
    #[error("requested range at offset {offset} not satisfiable")]
    RangeNotSatisfiable { offset: u64 },

    /// The transport failed before a response was established, or a
    /// reopen during resumption failed.
    #[error("transport error")]
    Transport(#[from] reqwest::Error),

    /// A session ended short without delivering a single byte, so
    /// automatic resumption was abandoned.
    #[error("response truncated at offset {offset}")]
    Truncated {
        offset: u64,
        #[source]
        source: Option<io::Error>,
    },
}

impl Error {
    /// The HTTP status associated with this error, when there is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::RangeNotSatisfiable { .. } => Some(StatusCode::RANGE_NOT_SATISFIABLE),
            Error::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Whether the failure was a transport-level timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_timeout())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
