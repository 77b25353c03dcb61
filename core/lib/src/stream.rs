//! The buffered stream layer: one API over every backend.

use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::str::FromStr;

use log::warn;

use crate::backend::{self, Backend, SharedBuf};
use crate::error::{Error, Result};

/// Buffer capacity used by [`Stream::open()`].
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Whether a stream reads from or writes to its backend.
///
/// A stream does exactly one of the two for its whole life; using it the
/// other way fails with
/// [`ErrorKind::Unsupported`](crate::ErrorKind::Unsupported).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

impl FromStr for Mode {
    type Err = Error;

    /// Parses the classic stdio-style mode strings: `"r"`/`"rb"` and
    /// `"w"`/`"wb"`.
    fn from_str(s: &str) -> Result<Mode> {
        match s {
            "r" | "rb" => Ok(Mode::Read),
            "w" | "wb" => Ok(Mode::Write),
            other => Err(Error::invalid(format!("unrecognized mode `{other}`"))),
        }
    }
}

/// A buffered byte stream over a [`Backend`].
///
/// A `Stream` presents local files, in-memory buffers, `data:` URL
/// payloads, and HTTP resources through one interface with identical
/// offset, peek, and end-of-stream semantics. The backend is chosen from
/// the URL prefix at open time; see [`Stream::open()`].
///
/// Reading, writing, and seeking go through the standard [`Read`],
/// [`Write`], [`Seek`], and [`BufRead`] traits. On top of those the
/// stream adds [`peek()`](Stream::peek) (look ahead without moving the
/// offset), [`tell()`](Stream::tell) (the current logical offset),
/// byte-at-a-time conveniences, and an explicit
/// [`close()`](Stream::close) that reports what dropping would hide.
///
/// Errors are sticky: after a failed operation every later one fails the
/// same way without touching the backend, and
/// [`last_error()`](Stream::last_error) reveals what went wrong.
///
/// ```rust,no_run
/// use hstream::{Mode, Stream};
///
/// # fn main() -> hstream::Result<()> {
/// let mut stream = Stream::open("reads.bin", Mode::Read)?;
/// let mut magic = [0u8; 4];
/// let n = stream.peek(&mut magic)?;
/// assert_eq!(stream.tell(), 0);
/// assert!(n <= 4);
/// # Ok(())
/// # }
/// ```
pub struct Stream {
    buffer: Box<[u8]>,
    /// Valid bytes live in `buffer[begin..end]`.
    begin: usize,
    end: usize,
    /// Absolute stream position of `buffer[0]`.
    offset: u64,
    mode: Mode,
    at_eof: bool,
    err: Option<Error>,
    /// `None` once the stream has been shut down.
    backend: Option<Box<dyn Backend>>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("begin", &self.begin)
            .field("end", &self.end)
            .field("offset", &self.offset)
            .field("mode", &self.mode)
            .field("at_eof", &self.at_eof)
            .field("err", &self.err)
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

impl Stream {
    /// Opens `url` with the default buffer capacity.
    ///
    /// The backend is selected by prefix: `data:` serves the rest of the
    /// URL verbatim, `http://` and `https://` open a resumable remote
    /// reader, and anything else names a local file. `mem:` URLs embed
    /// raw pointers and are only honored by
    /// [`open_raw()`](Stream::open_raw); here they fail with
    /// `Unsupported`.
    pub fn open(url: impl AsRef<[u8]>, mode: Mode) -> Result<Stream> {
        Stream::with_capacity(DEFAULT_BUFFER_SIZE, url, mode)
    }

    /// As [`open()`](Stream::open), with an explicit buffer capacity.
    /// Peeks can look ahead at most `capacity` bytes.
    pub fn with_capacity(capacity: usize, url: impl AsRef<[u8]>, mode: Mode) -> Result<Stream> {
        let backend = backend::open_url(url.as_ref(), mode)?;
        Ok(Stream::from_backend_with_capacity(capacity, backend, mode))
    }

    /// Opens `url`, additionally honoring the raw `mem:` scheme: the
    /// bytes after `mem:` are two native-endian machine words, the
    /// address of the caller's buffer pointer followed by the address of
    /// the caller's length.
    ///
    /// While a `mem:` stream is writing, the caller's length tracks the
    /// allocated capacity; when the stream is closed it is set to the
    /// final data size, the allocation is trimmed to match, and the
    /// caller owns it from then on (releasable with
    /// `Layout::array::<u8>(len)`).
    ///
    /// # Safety
    ///
    /// For `mem:` URLs, both encoded addresses must stay valid for the
    /// life of the stream, nothing else may touch the buffer or length
    /// while the stream is open, and in write mode the buffer pointer
    /// must be null or hold a global-allocator allocation whose capacity
    /// is the caller's length. Other schemes impose nothing and behave
    /// exactly as [`open()`](Stream::open).
    pub unsafe fn open_raw(url: &[u8], mode: Mode) -> Result<Stream> {
        let backend = backend::open_url_raw(url, mode)?;
        Ok(Stream::from_backend_with_capacity(
            DEFAULT_BUFFER_SIZE,
            backend,
            mode,
        ))
    }

    /// A read stream over owned bytes.
    pub fn from_vec(data: Vec<u8>) -> Stream {
        Stream::from_backend(
            Box::new(backend::DataBackend::new(data)),
            Mode::Read,
        )
    }

    /// A stream over a [`SharedBuf`]. Opening for write truncates the
    /// buffer, like a fresh `"w"` stream.
    pub fn from_shared(buf: SharedBuf, mode: Mode) -> Stream {
        Stream::from_backend(
            Box::new(backend::SharedBufBackend::new(buf, mode)),
            mode,
        )
    }

    /// Wraps a custom backend with the default buffer capacity.
    pub fn from_backend(backend: Box<dyn Backend>, mode: Mode) -> Stream {
        Stream::from_backend_with_capacity(DEFAULT_BUFFER_SIZE, backend, mode)
    }

    pub fn from_backend_with_capacity(
        capacity: usize,
        backend: Box<dyn Backend>,
        mode: Mode,
    ) -> Stream {
        Stream {
            buffer: vec![0; capacity.max(1)].into_boxed_slice(),
            begin: 0,
            end: 0,
            offset: 0,
            mode,
            at_eof: false,
            err: None,
            backend: Some(backend),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The buffer capacity, which bounds how far a peek can look ahead.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The current logical offset: how many bytes precede the next byte
    /// read, or the next byte written. Buffering and remote session
    /// boundaries are invisible here.
    pub fn tell(&self) -> u64 {
        match self.mode {
            Mode::Read => self.offset + self.begin as u64,
            Mode::Write => self.offset + self.end as u64,
        }
    }

    /// Whether the stream has delivered its last byte. Meaningful for
    /// read streams only.
    pub fn is_eof(&self) -> bool {
        self.at_eof && self.begin == self.end
    }

    /// The sticky error, if an operation has failed.
    pub fn last_error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Forgets the sticky error. The backend may well fail the same way
    /// again; this merely allows another attempt.
    pub fn clear_error(&mut self) {
        self.err = None;
    }

    /// Reads up to `dst.len()` bytes **without** advancing the offset:
    /// [`tell()`](Stream::tell) answers the same before and after, and
    /// the returned bytes are a prefix of what subsequent reads deliver.
    ///
    /// At most [`capacity()`](Stream::capacity) bytes can be served; the
    /// stream slides its window and keeps asking the backend until the
    /// request is satisfied or the stream ends. A short return can also
    /// mean the backend came up short at a boundary, so callers should
    /// treat `k < dst.len()` as "at least `k` available", not as EOF.
    pub fn peek(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.check()?;
        match self.peek_inner(dst) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.stick(e)),
        }
    }

    /// Reads one byte; `Ok(None)` at end-of-stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        self.check()?;

        if self.mode == Mode::Read && self.begin < self.end {
            let byte = self.buffer[self.begin];
            self.begin += 1;
            return Ok(Some(byte));
        }

        let mut byte = [0u8; 1];
        match self.read_inner(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) => Err(self.stick(e)),
        }
    }

    /// Writes one byte.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.check()?;

        if self.mode == Mode::Write && self.end < self.buffer.len() {
            self.buffer[self.end] = byte;
            self.end += 1;
            return Ok(());
        }

        match self.write_inner(&[byte]) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.stick(e)),
        }
    }

    /// Repositions the stream, returning the new absolute offset.
    ///
    /// Write streams deliver their pending bytes first. Read streams
    /// whose target lies inside the buffered window just move the cursor,
    /// with no backend involvement; otherwise the buffer is discarded and
    /// the backend seeked. Backends without the capability fail with
    /// [`ErrorKind::NotSeekable`](crate::ErrorKind::NotSeekable), as does
    /// [`SeekFrom::End`] on an HTTP stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check()?;
        match self.seek_inner(pos) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.stick(e)),
        }
    }

    /// Delivers every pending write to the backend.
    pub fn flush(&mut self) -> Result<()> {
        self.check()?;
        match self.flush_inner() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.stick(e)),
        }
    }

    /// Flushes pending writes, closes the backend, and releases the
    /// buffer, reporting the first failure among flush and close.
    /// Dropping a stream does the same but can only log a failure.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn check(&self) -> Result<()> {
        match &self.err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Records the first error; later operations replay it.
    fn stick(&mut self, e: Error) -> Error {
        if self.err.is_none() {
            self.err = Some(e.clone());
        }
        e
    }

    /// Refills an empty read window with a single backend read. Short
    /// reads are fine; zero sets the EOF latch.
    fn refill(&mut self) -> Result<usize> {
        debug_assert_eq!(self.begin, self.end);
        self.offset += self.end as u64;
        self.begin = 0;
        self.end = 0;

        if self.at_eof {
            return Ok(0);
        }

        let backend = self.backend.as_mut().expect("open backend");
        let n = backend.read(&mut self.buffer)?;
        if n == 0 {
            self.at_eof = true;
        } else {
            self.end = n;
        }
        Ok(n)
    }

    fn read_inner(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.mode != Mode::Read {
            return Err(Error::unsupported("reading a write stream"));
        }
        if dst.is_empty() {
            return Ok(0);
        }

        if self.begin == self.end {
            if dst.len() >= self.buffer.len() {
                // Large requests skip the copy through the buffer.
                self.offset += self.end as u64;
                self.begin = 0;
                self.end = 0;
                if self.at_eof {
                    return Ok(0);
                }
                let backend = self.backend.as_mut().expect("open backend");
                let n = backend.read(dst)?;
                if n == 0 {
                    self.at_eof = true;
                } else {
                    self.offset += n as u64;
                }
                return Ok(n);
            }

            self.refill()?;
            if self.end == 0 {
                return Ok(0);
            }
        }

        let n = dst.len().min(self.end - self.begin);
        dst[..n].copy_from_slice(&self.buffer[self.begin..self.begin + n]);
        self.begin += n;
        Ok(n)
    }

    fn peek_inner(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.mode != Mode::Read {
            return Err(Error::unsupported("peeking a write stream"));
        }

        let want = dst.len().min(self.buffer.len());
        while self.end - self.begin < want && !self.at_eof {
            if self.begin > 0 {
                // Slide the live window to the front to make room.
                self.buffer.copy_within(self.begin..self.end, 0);
                self.offset += self.begin as u64;
                self.end -= self.begin;
                self.begin = 0;
            }

            let filled = self.end;
            let backend = self.backend.as_mut().expect("open backend");
            let n = backend.read(&mut self.buffer[filled..])?;
            if n == 0 {
                self.at_eof = true;
            } else {
                self.end += n;
            }
        }

        let n = dst.len().min(self.end - self.begin);
        dst[..n].copy_from_slice(&self.buffer[self.begin..self.begin + n]);
        Ok(n)
    }

    fn write_inner(&mut self, src: &[u8]) -> Result<usize> {
        if self.mode != Mode::Write {
            return Err(Error::unsupported("writing a read stream"));
        }
        if src.is_empty() {
            return Ok(0);
        }

        if self.end == self.buffer.len() {
            self.drain()?;
        }

        if self.end == 0 && src.len() >= self.buffer.len() {
            // Large writes go straight through.
            let backend = self.backend.as_mut().expect("open backend");
            let n = write_some(backend.as_mut(), src)?;
            self.offset += n as u64;
            return Ok(n);
        }

        let n = src.len().min(self.buffer.len() - self.end);
        self.buffer[self.end..self.end + n].copy_from_slice(&src[..n]);
        self.end += n;
        Ok(n)
    }

    /// Pushes every pending byte to the backend.
    fn drain(&mut self) -> Result<()> {
        debug_assert_eq!(self.begin, 0);
        let backend = self.backend.as_mut().expect("open backend");
        drain_into(&self.buffer[..self.end], backend.as_mut())?;
        self.offset += self.end as u64;
        self.end = 0;
        Ok(())
    }

    fn flush_inner(&mut self) -> Result<()> {
        if self.mode == Mode::Write {
            self.drain()?;
            self.backend.as_mut().expect("open backend").flush()?;
        }
        Ok(())
    }

    fn seek_inner(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.mode == Mode::Write {
            self.drain()?;
            let backend = self.backend.as_mut().expect("open backend");
            let new = backend.seek(pos)?;
            self.offset = new;
            return Ok(new);
        }

        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => Some(
                self.tell()
                    .checked_add_signed(delta)
                    .ok_or_else(|| Error::invalid("seek before the start of the stream"))?,
            ),
            // Only the backend knows where the end is.
            SeekFrom::End(_) => None,
        };

        if let Some(target) = target {
            let window_end = self.offset + self.end as u64;
            if target >= self.offset && target <= window_end {
                // The bytes are already buffered; just move the cursor.
                self.begin = (target - self.offset) as usize;
                self.at_eof = false;
                return Ok(target);
            }

            let backend = self.backend.as_mut().expect("open backend");
            let new = backend.seek(SeekFrom::Start(target))?;
            self.begin = 0;
            self.end = 0;
            self.offset = new;
            self.at_eof = false;
            return Ok(new);
        }

        let backend = self.backend.as_mut().expect("open backend");
        let new = backend.seek(pos)?;
        self.begin = 0;
        self.end = 0;
        self.offset = new;
        self.at_eof = false;
        Ok(new)
    }

    /// Tears the stream down exactly once; both `close` and `Drop` land
    /// here. The backend is always closed, whatever the flush did.
    fn shutdown(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };

        let mut result = Ok(());
        if self.mode == Mode::Write && self.err.is_none() {
            result = drain_into(&self.buffer[..self.end], backend.as_mut())
                .and_then(|()| backend.flush());
            self.end = 0;
        }

        result.and(backend.close())
    }
}

/// One backend write that actually accepts bytes.
fn write_some(backend: &mut dyn Backend, src: &[u8]) -> Result<usize> {
    debug_assert!(!src.is_empty());
    let n = backend.write(src)?;
    if n == 0 {
        return Err(io::Error::new(io::ErrorKind::WriteZero, "backend accepted no bytes").into());
    }
    Ok(n)
}

/// Writes all of `pending`, looping over partial backend writes.
fn drain_into(pending: &[u8], backend: &mut dyn Backend) -> Result<()> {
    let mut done = 0;
    while done < pending.len() {
        done += write_some(backend, &pending[done..])?;
    }
    Ok(())
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        match self.read_inner(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.stick(e).into()),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        match self.write_inner(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.stick(e).into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Stream::flush(self)?)
    }
}

impl Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(Stream::seek(self, pos)?)
    }
}

impl BufRead for Stream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.check()?;
        if self.mode != Mode::Read {
            return Err(self.stick(Error::unsupported("reading a write stream")).into());
        }
        if self.begin == self.end && !self.at_eof {
            if let Err(e) = self.refill() {
                return Err(self.stick(e).into());
            }
        }
        Ok(&self.buffer[self.begin..self.end])
    }

    fn consume(&mut self, amt: usize) {
        self.begin = (self.begin + amt).min(self.end);
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.backend.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("error closing stream on drop: {e}");
            }
        }
    }
}
