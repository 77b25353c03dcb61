use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;
use crate::stream::Mode;

use super::Backend;

/// A local file. Transfers delegate straight to the descriptor; reads and
/// writes interrupted by a signal are retried.
pub(crate) struct FileBackend {
    file: File,
}

impl FileBackend {
    pub(crate) fn open(path: &Path, mode: Mode) -> Result<FileBackend> {
        let file = match mode {
            Mode::Read => File::open(path),
            Mode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path),
        }?;

        Ok(FileBackend { file })
    }
}

impl Backend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.file.write(buf) {
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.file.seek(pos)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    fn close(&mut self) -> Result<()> {
        // The descriptor is released when the backend is dropped.
        Ok(())
    }
}
