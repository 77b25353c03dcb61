use std::alloc::{self, Layout};
use std::io::{self, SeekFrom};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::stream::Mode;

use super::{resolve_seek, Backend};

const WORD: usize = std::mem::size_of::<usize>();

/// The payload of a `data:` URL, or any other owned immutable byte run.
/// Read-only, seekable, length known.
pub(crate) struct DataBackend {
    data: Vec<u8>,
    pos: u64,
}

impl DataBackend {
    pub(crate) fn new(data: Vec<u8>) -> DataBackend {
        DataBackend { data, pos: 0 }
    }
}

impl Backend for DataBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.data.len() as u64;
        if self.pos >= len {
            return Ok(0);
        }

        let start = self.pos as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.data.len() as u64)?;
        Ok(self.pos)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A growable byte buffer shared between a caller and the streams opened
/// over it.
///
/// This is the typed counterpart of the raw `mem:` URL scheme: the caller
/// keeps one handle, hands a clone to
/// [`Stream::from_shared()`](crate::Stream::from_shared), and inspects the
/// contents whenever the stream is done with them.
///
/// ```rust
/// use std::io::Write;
/// use hstream::{Mode, SharedBuf, Stream};
///
/// # fn main() -> hstream::Result<()> {
/// let buf = SharedBuf::new();
/// let mut stream = Stream::from_shared(buf.clone(), Mode::Write);
/// stream.write_all(b"staged bytes").map_err(hstream::Error::from)?;
/// stream.close()?;
/// assert_eq!(buf.take(), b"staged bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedBuf {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuf {
    pub fn new() -> SharedBuf {
        SharedBuf::default()
    }

    /// Wraps existing contents, typically to read them back through a
    /// stream.
    pub fn from_vec(data: Vec<u8>) -> SharedBuf {
        SharedBuf {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Takes the contents, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Backend over a [`SharedBuf`]. Reads and writes share one position;
/// writes overwrite in place and extend at the end, and opening for write
/// truncates, matching a fresh `"w"` stream.
pub(crate) struct SharedBufBackend {
    buf: SharedBuf,
    pos: u64,
}

impl SharedBufBackend {
    pub(crate) fn new(buf: SharedBuf, mode: Mode) -> SharedBufBackend {
        if mode == Mode::Write {
            buf.lock().clear();
        }
        SharedBufBackend { buf, pos: 0 }
    }
}

impl Backend for SharedBufBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data = self.buf.lock();
        if self.pos >= data.len() as u64 {
            return Ok(0);
        }

        let start = self.pos as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        drop(data);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut data = self.buf.lock();
        let start = self.pos as usize;
        if start > data.len() {
            // A seek moved past the end; fill the gap like a sparse file.
            data.resize(start, 0);
        }

        let overlap = buf.len().min(data.len() - start);
        data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        drop(data);
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.buf.len() as u64;
        self.pos = resolve_seek(pos, self.pos, len)?;
        Ok(self.pos)
    }

    fn close(&mut self) -> Result<()> {
        // The Vec's length is the final data size; the caller's handle
        // keeps the contents alive.
        Ok(())
    }
}

/// The raw `mem:` pointer-pair backend.
///
/// Holds a pointer to the caller's buffer pointer and a pointer to the
/// caller's length, both decoded from the bytes of a `mem:` URL. While
/// writing, the buffer is grown by doubling through the global allocator
/// and the caller's length tracks the allocated capacity; close shrinks
/// the allocation to the written size and stores that size, so the caller
/// can release it with `Layout::array::<u8>(*plen)`.
pub(crate) struct RawMemBackend {
    pbuf: *mut *mut u8,
    plen: *mut usize,
    /// Allocated capacity of `*pbuf` as this backend knows it.
    cap: usize,
    /// Bytes of real data in `*pbuf`.
    len: usize,
    pos: u64,
    writable: bool,
}

impl RawMemBackend {
    /// Decodes the two machine words following the `mem:` prefix.
    ///
    /// # Safety
    ///
    /// See [`Stream::open_raw`](crate::Stream::open_raw): both decoded
    /// addresses must be valid for the lifetime of the backend, and in
    /// write mode `*pbuf` must be null or a global-allocator allocation
    /// of capacity `*plen`.
    pub(crate) unsafe fn from_url(encoded: &[u8], mode: Mode) -> Result<RawMemBackend> {
        if encoded.len() != 2 * WORD {
            return Err(Error::invalid(
                "mem: url must encode exactly two machine words",
            ));
        }

        let mut word = [0u8; WORD];
        word.copy_from_slice(&encoded[..WORD]);
        let pbuf = usize::from_ne_bytes(word) as *mut *mut u8;
        word.copy_from_slice(&encoded[WORD..]);
        let plen = usize::from_ne_bytes(word) as *mut usize;

        if pbuf.is_null() || plen.is_null() {
            return Err(Error::invalid("mem: url encodes a null pointer"));
        }

        let (cap, len) = match mode {
            Mode::Read => {
                let len = *plen;
                (len, len)
            }
            Mode::Write => (*plen, 0),
        };

        Ok(RawMemBackend {
            pbuf,
            plen,
            cap,
            len,
            pos: 0,
            writable: mode == Mode::Write,
        })
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        if needed <= self.cap {
            return Ok(());
        }

        let mut new_cap = self.cap.max(4096);
        while new_cap < needed {
            new_cap = new_cap
                .checked_mul(2)
                .ok_or_else(|| Error::invalid("mem: buffer too large"))?;
        }

        let layout = Layout::array::<u8>(new_cap)
            .map_err(|_| Error::invalid("mem: buffer too large"))?;

        unsafe {
            let old = *self.pbuf;
            let grown = if old.is_null() || self.cap == 0 {
                alloc::alloc(layout)
            } else {
                let old_layout = Layout::array::<u8>(self.cap)
                    .map_err(|_| Error::invalid("mem: buffer too large"))?;
                alloc::realloc(old, old_layout, new_cap)
            };

            if grown.is_null() {
                return Err(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "growing mem: buffer",
                )
                .into());
            }

            *self.pbuf = grown;
            *self.plen = new_cap;
        }

        self.cap = new_cap;
        Ok(())
    }
}

impl Backend for RawMemBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.len as u64 {
            return Ok(0);
        }

        let start = self.pos as usize;
        let n = buf.len().min(self.len - start);
        unsafe {
            ptr::copy_nonoverlapping((*self.pbuf).add(start), buf.as_mut_ptr(), n);
        }
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(Error::unsupported("write"));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let start = self.pos as usize;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| Error::invalid("mem: buffer too large"))?;
        self.grow(end)?;

        unsafe {
            if start > self.len {
                // A seek moved past the end; zero the gap.
                ptr::write_bytes((*self.pbuf).add(self.len), 0, start - self.len);
            }
            ptr::copy_nonoverlapping(buf.as_ptr(), (*self.pbuf).add(start), buf.len());
        }

        self.len = self.len.max(end);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.len as u64)?;
        Ok(self.pos)
    }

    fn close(&mut self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }

        unsafe {
            if self.cap > self.len && !(*self.pbuf).is_null() {
                let old_layout = Layout::array::<u8>(self.cap)
                    .map_err(|_| Error::invalid("mem: buffer too large"))?;
                if self.len == 0 {
                    alloc::dealloc(*self.pbuf, old_layout);
                    *self.pbuf = ptr::null_mut();
                } else {
                    let shrunk = alloc::realloc(*self.pbuf, old_layout, self.len);
                    if shrunk.is_null() {
                        return Err(io::Error::new(
                            io::ErrorKind::OutOfMemory,
                            "trimming mem: buffer",
                        )
                        .into());
                    }
                    *self.pbuf = shrunk;
                }
                self.cap = self.len;
            }
            *self.plen = self.len;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(pbuf: &mut *mut u8, plen: &mut usize) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(2 * WORD);
        encoded.extend((pbuf as *mut *mut u8 as usize).to_ne_bytes());
        encoded.extend((plen as *mut usize as usize).to_ne_bytes());
        encoded
    }

    #[test]
    fn data_backend_reads_and_seeks() {
        let mut backend = DataBackend::new(b"hello, world!\n".to_vec());

        let mut buf = [0u8; 300];
        assert_eq!(backend.read(&mut buf).unwrap(), 14);
        assert_eq!(&buf[..14], b"hello, world!\n");
        assert_eq!(backend.read(&mut buf).unwrap(), 0);

        assert_eq!(backend.seek(SeekFrom::Start(7)).unwrap(), 7);
        assert_eq!(backend.read(&mut buf[..5]).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");
    }

    #[test]
    fn shared_backend_overwrites_and_extends() {
        let buf = SharedBuf::from_vec(b"xxxx".to_vec());
        let mut backend = SharedBufBackend::new(buf.clone(), Mode::Read);

        backend.write(b"ab").unwrap();
        backend.write(b"cdef").unwrap();
        assert_eq!(buf.to_vec(), b"abcdef");
    }

    #[test]
    fn opening_a_shared_buf_for_write_truncates() {
        let buf = SharedBuf::from_vec(b"old contents".to_vec());
        let _backend = SharedBufBackend::new(buf.clone(), Mode::Write);
        assert!(buf.is_empty());
    }

    #[test]
    fn raw_mem_round_trip() {
        let mut buffer: *mut u8 = ptr::null_mut();
        let mut length: usize = 0;
        let encoded = encode(&mut buffer, &mut length);

        let mut backend = unsafe { RawMemBackend::from_url(&encoded, Mode::Write).unwrap() };
        backend.write(b"hello ").unwrap();
        backend.write(b"world").unwrap();
        // While writing, the caller's length tracks the capacity.
        assert_eq!(length, 4096);
        backend.close().unwrap();
        assert_eq!(length, 11);
        assert!(!buffer.is_null());

        let mut backend = unsafe { RawMemBackend::from_url(&encoded, Mode::Read).unwrap() };
        let mut out = [0u8; 32];
        let n = backend.read(&mut out).unwrap();
        assert_eq!(&out[..n], b"hello world");
        backend.close().unwrap();

        unsafe {
            alloc::dealloc(buffer, Layout::array::<u8>(length).unwrap());
        }
    }

    #[test]
    fn raw_mem_rejects_bad_urls() {
        assert!(unsafe { RawMemBackend::from_url(b"short", Mode::Read) }.is_err());

        let encoded = vec![0u8; 2 * WORD];
        assert!(unsafe { RawMemBackend::from_url(&encoded, Mode::Read) }.is_err());
    }

    #[test]
    fn raw_mem_read_only_refuses_writes() {
        let mut data = *b"fixed";
        let mut buffer: *mut u8 = data.as_mut_ptr();
        let mut length: usize = data.len();
        let encoded = encode(&mut buffer, &mut length);

        let mut backend = unsafe { RawMemBackend::from_url(&encoded, Mode::Read).unwrap() };
        assert!(backend.write(b"nope").is_err());

        let mut out = [0u8; 8];
        assert_eq!(backend.read(&mut out).unwrap(), 5);
        assert_eq!(&out[..5], b"fixed");
    }
}
