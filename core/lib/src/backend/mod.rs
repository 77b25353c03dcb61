//! Backends: the byte sources and sinks behind a [`Stream`](crate::Stream).
//!
//! A backend is a bundle of capabilities. Every backend can be closed;
//! reading, writing, seeking, and flushing are each present only when the
//! underlying resource supports them, and an absent capability fails with
//! [`ErrorKind::Unsupported`](crate::ErrorKind::Unsupported) (seeking with
//! [`ErrorKind::NotSeekable`](crate::ErrorKind::NotSeekable)). The
//! buffered layer calls into exactly one backend, selected at open time
//! from the URL prefix.

mod file;
mod http;
mod memory;

use std::io::SeekFrom;
use std::path::PathBuf;

use crate::error::{Error, ErrorKind, Result};
use crate::stream::Mode;

pub use memory::SharedBuf;

pub(crate) use memory::{DataBackend, RawMemBackend, SharedBufBackend};

/// A concrete byte source or sink.
///
/// Implementations keep their own state and perform unbuffered transfers;
/// all buffering, offset accounting, and error stickiness live in the
/// [`Stream`](crate::Stream) on top. The default methods declare the
/// capability absent.
pub trait Backend {
    /// Reads up to `buf.len()` bytes. Short reads are allowed; `Ok(0)`
    /// means end-of-stream.
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::unsupported("read"))
    }

    /// Writes some prefix of `buf`, returning how much was accepted.
    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::unsupported("write"))
    }

    /// Repositions the backend, returning the new absolute offset.
    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(ErrorKind::NotSeekable.into())
    }

    /// Pushes any backend-held state toward durable storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases the underlying resource. Called exactly once, after which
    /// the backend is discarded.
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheme {
    Data,
    Mem,
    Http,
    File,
}

/// URL prefix dispatch, on raw bytes: `mem:` URLs embed machine words and
/// need never be valid UTF-8.
pub(crate) fn scheme_of(url: &[u8]) -> Scheme {
    if url.starts_with(b"data:") {
        Scheme::Data
    } else if url.starts_with(b"mem:") {
        Scheme::Mem
    } else if url.starts_with(b"http://") || url.starts_with(b"https://") {
        Scheme::Http
    } else {
        Scheme::File
    }
}

/// Opens the backend for `url`, refusing `mem:` (see
/// [`Stream::open_raw`](crate::Stream::open_raw)).
pub(crate) fn open_url(url: &[u8], mode: Mode) -> Result<Box<dyn Backend>> {
    match scheme_of(url) {
        Scheme::Data => {
            if mode == Mode::Write {
                return Err(Error::unsupported("writing to a data: url"));
            }
            Ok(Box::new(DataBackend::new(url[b"data:".len()..].to_vec())))
        }
        Scheme::Mem => Err(Error::unsupported(
            "mem: urls through the safe opener; use open_raw or a SharedBuf",
        )),
        Scheme::Http => {
            if mode == Mode::Write {
                return Err(Error::unsupported("writing over http"));
            }
            let url = std::str::from_utf8(url)
                .map_err(|_| Error::invalid("http url is not valid utf-8"))?;
            Ok(Box::new(http::HttpBackend::open(url)?))
        }
        Scheme::File => {
            let path = path_from_bytes(url)?;
            Ok(Box::new(file::FileBackend::open(&path, mode)?))
        }
    }
}

/// As [`open_url`], additionally honoring the raw `mem:` pointer scheme.
///
/// # Safety
///
/// A `mem:` URL embeds two raw addresses; see
/// [`Stream::open_raw`](crate::Stream::open_raw) for the contract the
/// caller must uphold.
pub(crate) unsafe fn open_url_raw(url: &[u8], mode: Mode) -> Result<Box<dyn Backend>> {
    match scheme_of(url) {
        Scheme::Mem => {
            let backend = RawMemBackend::from_url(&url[b"mem:".len()..], mode)?;
            Ok(Box::new(backend))
        }
        _ => open_url(url, mode),
    }
}

/// Clamps a `SeekFrom` against a known length, for backends that track
/// their own position. Seeking past the end is allowed; before the start
/// is not.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, len: u64) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
    };

    target.ok_or_else(|| Error::invalid("seek before the start of the stream"))
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> Result<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    Ok(PathBuf::from(OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> Result<PathBuf> {
    std::str::from_utf8(bytes)
        .map(PathBuf::from)
        .map_err(|_| Error::invalid("file path is not valid utf-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_dispatch_by_prefix() {
        assert_eq!(scheme_of(b"data:hello"), Scheme::Data);
        assert_eq!(scheme_of(b"mem:\x00\x01"), Scheme::Mem);
        assert_eq!(scheme_of(b"http://example.com/f"), Scheme::Http);
        assert_eq!(scheme_of(b"https://example.com/f"), Scheme::Http);
        assert_eq!(scheme_of(b"/tmp/f.bin"), Scheme::File);
        assert_eq!(scheme_of(b"relative/path"), Scheme::File);
        // Unrecognized schemes fall through to the filesystem.
        assert_eq!(scheme_of(b"ftp://example.com/f"), Scheme::File);
    }

    #[test]
    fn seek_resolution_bounds() {
        use std::io::SeekFrom;

        assert_eq!(resolve_seek(SeekFrom::Start(7), 0, 10).unwrap(), 7);
        assert_eq!(resolve_seek(SeekFrom::Current(-3), 5, 10).unwrap(), 2);
        assert_eq!(resolve_seek(SeekFrom::End(-4), 0, 10).unwrap(), 6);
        assert_eq!(resolve_seek(SeekFrom::End(3), 0, 10).unwrap(), 13);
        assert!(resolve_seek(SeekFrom::Current(-1), 0, 10).is_err());
        assert!(resolve_seek(SeekFrom::End(-11), 0, 10).is_err());
    }
}
