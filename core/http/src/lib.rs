//! Blocking, resumable HTTP range streaming.
//!
//! This crate turns an HTTP or HTTPS resource into a single logical byte
//! stream that survives truncated responses. The underlying transport is
//! `reqwest`'s blocking client; whenever a response body ends before the
//! resource does, [`RangeReader`] reissues the request with
//! `Range: bytes=<offset>-` at the next undelivered byte, so callers never
//! observe the seam. See [`RangeReader`] for the resumption rules and
//! [`Options`] for connection knobs.
//!
//! The [`testing`] module provides a scriptable localhost server used by
//! this crate's own tests and by integration tests of crates layered on
//! top of it.

mod error;
mod reader;

pub mod testing;

pub use error::{Error, Result};
pub use reader::{Options, RangeReader};

/// Redirects followed per request before giving up.
pub const MAX_REDIRECTS: usize = 16;

/// The `User-Agent` sent by readers opened without explicit [`Options`].
pub const USER_AGENT: &str = concat!("hstream/", env!("CARGO_PKG_VERSION"));
