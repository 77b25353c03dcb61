//! # hstream: uniform buffered byte streams
//!
//! hstream gives binary-format readers one buffered, seekable interface
//! over heterogeneous byte sources: local files, caller-owned memory,
//! `data:` URL payloads, and HTTP/HTTPS resources. Offset semantics, peek
//! behavior, and end-of-stream handling are identical across backends, and
//! the HTTP backend transparently resumes truncated responses with ranged
//! re-requests, so a flaky remote file reads exactly like a local one.
//!
//! ## Usage
//!
//! Open a [`Stream`] from a URL and use the standard I/O traits; the
//! backend is chosen from the prefix:
//!
//! ```rust,no_run
//! use std::io::Read;
//! use hstream::Mode;
//!
//! # fn main() -> hstream::Result<()> {
//! let mut remote = hstream::open("https://example.com/variants.bcf", Mode::Read)?;
//!
//! let mut magic = [0u8; 4];
//! remote.peek(&mut magic)?;       // look ahead without consuming
//! assert_eq!(remote.tell(), 0);
//!
//! let mut header = vec![0u8; 512];
//! let n = remote.read(&mut header)?;
//! assert_eq!(remote.tell(), n as u64);
//! # Ok(())
//! # }
//! ```
//!
//! In-memory streams come from [`Stream::from_vec()`] (read-only) and
//! [`SharedBuf`] (read/write, shared with the caller). The raw `mem:`
//! pointer URL scheme is supported for compatibility through the unsafe
//! [`Stream::open_raw()`].
//!
//! ## Libraries
//!
//! The workspace is split in two:
//!
//!   1. `hstream`: the buffered layer, the backends, and the error
//!      taxonomy. This is the crate applications depend on.
//!   2. `hstream_http`: the blocking resumable range reader, re-exported
//!      here as [`http`]. Depend on it directly only to drive raw HTTP
//!      streams without the buffered layer.

mod error;
mod stream;

pub mod backend;

/// Client-side resumable HTTP range streaming, re-exported from
/// `hstream_http`.
pub mod http {
    pub use hstream_http::{Error, Options, RangeReader, MAX_REDIRECTS, USER_AGENT};

    pub use hstream_http::testing;
}

pub use backend::SharedBuf;
pub use error::{Error, ErrorKind, Result};
pub use stream::{Mode, Stream, DEFAULT_BUFFER_SIZE};

/// Opens a [`Stream`] over `url`; shorthand for [`Stream::open()`].
pub fn open(url: impl AsRef<[u8]>, mode: Mode) -> Result<Stream> {
    Stream::open(url, mode)
}
