use std::io::SeekFrom;

use hstream_http::RangeReader;

use crate::error::{ErrorKind, Result};

use super::Backend;

/// An HTTP or HTTPS resource behind a resumable range reader. Read-only;
/// seekable everywhere except relative to the end, which only the server
/// could resolve.
pub(crate) struct HttpBackend {
    reader: RangeReader,
}

impl HttpBackend {
    /// Opens the resource and drives the transport until the response
    /// status is known, so a missing or forbidden URL fails here rather
    /// than at the first read.
    pub(crate) fn open(url: &str) -> Result<HttpBackend> {
        let reader = RangeReader::open(url)?;
        Ok(HttpBackend { reader })
    }
}

impl Backend for HttpBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.reader.read(buf)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        // The buffered layer hands backends absolute targets; anything
        // end-relative only the server could resolve.
        let SeekFrom::Start(target) = pos else {
            return Err(ErrorKind::NotSeekable.into());
        };

        self.reader.seek_to(target);
        Ok(target)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the reader tears down any live session.
        Ok(())
    }
}
