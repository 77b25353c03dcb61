//! Types representing the ways a stream operation can fail.

use std::sync::Arc;
use std::{fmt, io};

/// Specialized `Result` for stream operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error from opening or operating on a [`Stream`](crate::Stream).
///
/// Errors are sticky: once an operation on a stream fails, the stream
/// remembers the error and every later operation except closing returns a
/// clone of it without touching the backend;
/// [`last_error()`](crate::Stream::last_error) exposes the remembered
/// value.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
}

/// The kind of failure that occurred.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The resource does not exist: a missing file, or HTTP 404/410.
    NotFound,
    /// Access to the resource was refused: file permissions, or HTTP
    /// 401/403/407.
    PermissionDenied,
    /// The operation timed out, locally or remotely (HTTP 408/504).
    Timeout,
    /// The resource is temporarily unavailable (HTTP 503); trying again
    /// later may succeed.
    TryAgain,
    /// A malformed URL, an unrecognized mode string, or a protocol
    /// violation such as a server answering a ranged request from the
    /// start of the resource.
    Invalid(String),
    /// The backend cannot seek, or cannot seek the requested way; seeking
    /// an HTTP stream relative to its end is the canonical case.
    NotSeekable,
    /// The named operation is not supported by this stream: reading a
    /// write stream, writing a read stream, or a capability the backend
    /// does not implement.
    Unsupported(&'static str),
    /// Any other transport, filesystem, or allocation failure.
    Io(Arc<io::Error>),
    /// A remote stream ended before delivering its full contents and
    /// recovery made no progress.
    Truncated,
}

impl Error {
    #[inline(always)]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error { kind }
    }

    pub(crate) fn unsupported(what: &'static str) -> Error {
        Error::new(ErrorKind::Unsupported(what))
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Error {
        Error::new(ErrorKind::Invalid(reason.into()))
    }

    /// The kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::NotFound => "resource not found".fmt(f),
            ErrorKind::PermissionDenied => "permission denied".fmt(f),
            ErrorKind::Timeout => "operation timed out".fmt(f),
            ErrorKind::TryAgain => "resource temporarily unavailable".fmt(f),
            ErrorKind::Invalid(reason) => write!(f, "invalid request: {reason}"),
            ErrorKind::NotSeekable => "stream is not seekable".fmt(f),
            ErrorKind::Unsupported(what) => write!(f, "unsupported operation: {what}"),
            ErrorKind::Io(e) => write!(f, "i/o error: {e}"),
            ErrorKind::Truncated => "stream truncated".fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Io(Arc::new(e)),
        };

        Error::new(kind)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        let kind = match e.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::Timeout => io::ErrorKind::TimedOut,
            ErrorKind::Invalid(_) => io::ErrorKind::InvalidInput,
            ErrorKind::NotSeekable | ErrorKind::Unsupported(_) => io::ErrorKind::Unsupported,
            ErrorKind::Truncated => io::ErrorKind::UnexpectedEof,
            ErrorKind::Io(inner) => inner.kind(),
            _ => io::ErrorKind::Other,
        };

        io::Error::new(kind, e)
    }
}

impl From<hstream_http::Error> for Error {
    fn from(e: hstream_http::Error) -> Error {
        use hstream_http::Error as Http;

        let kind = match e {
            Http::Status { status, offset } => match status.as_u16() {
                404 | 410 => ErrorKind::NotFound,
                401 | 403 | 407 => ErrorKind::PermissionDenied,
                408 | 504 => ErrorKind::Timeout,
                503 => ErrorKind::TryAgain,
                code if (400..500).contains(&code) => {
                    ErrorKind::Invalid(format!("http status {status}"))
                }
                _ => ErrorKind::Io(Arc::new(io::Error::new(
                    io::ErrorKind::Other,
                    Http::Status { status, offset },
                ))),
            },
            e @ (Http::Url { .. }
            | Http::RangeIgnored { .. }
            | Http::RangeNotSatisfiable { .. }) => ErrorKind::Invalid(e.to_string()),
            Http::Truncated { .. } => ErrorKind::Truncated,
            Http::Transport(t) if t.is_timeout() => ErrorKind::Timeout,
            e => ErrorKind::Io(Arc::new(io::Error::new(io::ErrorKind::Other, e))),
        };

        Error::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_map_onto_the_taxonomy() {
        let e = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(e.kind(), ErrorKind::NotFound));

        let e = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(matches!(e.kind(), ErrorKind::PermissionDenied));

        let e = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(e.kind(), ErrorKind::Io(_)));
    }

    #[test]
    fn round_trips_into_io_error() {
        let e: io::Error = Error::new(ErrorKind::NotSeekable).into();
        assert_eq!(e.kind(), io::ErrorKind::Unsupported);

        let e: io::Error = Error::new(ErrorKind::Truncated).into();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }
}
