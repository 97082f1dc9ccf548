//! Scratch store: an append-only anonymous temp file holding line text.
//!
//! Line records carry `(pos, len)` pairs into this file; positions are
//! stable for the whole session because writes only ever append. Reads move
//! the underlying file position, so the store marks itself `seek_on_write`
//! and the next append first repositions to end-of-file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{EdError, Result};

pub struct ScratchFile {
    file: File,
    pos: u64,
    seek_on_write: bool,
}

impl ScratchFile {
    pub fn open() -> Result<Self> {
        let file = tempfile::tempfile().map_err(|_| EdError::Io("Cannot open temp file"))?;
        Ok(ScratchFile { file, pos: 0, seek_on_write: false })
    }

    /// Replace the backing file with a fresh one (the `e` command discards
    /// the whole session's text).
    pub fn reopen(&mut self) -> Result<()> {
        self.file = tempfile::tempfile().map_err(|_| EdError::Io("Cannot open temp file"))?;
        self.pos = 0;
        self.seek_on_write = false;
        Ok(())
    }

    /// Append one line of text (no newline) and return its offset.
    pub fn append(&mut self, text: &[u8]) -> Result<u64> {
        if self.seek_on_write {
            // out of position
            self.pos = self
                .file
                .seek(SeekFrom::End(0))
                .map_err(|_| EdError::Io("Cannot seek temp file"))?;
            self.seek_on_write = false;
        }
        self.file
            .write_all(text)
            .map_err(|_| EdError::Io("Cannot write temp file"))?;
        let at = self.pos;
        self.pos += text.len() as u64;
        Ok(at)
    }

    /// Read `len` bytes at `pos` into `buf` (replacing its contents).
    pub fn read(&mut self, pos: u64, len: usize, buf: &mut Vec<u8>) -> Result<()> {
        self.seek_on_write = true; // force seek on next write
        if self.pos != pos {
            self.file
                .seek(SeekFrom::Start(pos))
                .map_err(|_| EdError::Io("Cannot seek temp file"))?;
            self.pos = pos;
        }
        buf.clear();
        buf.resize(len, 0);
        self.file
            .read_exact(buf)
            .map_err(|_| EdError::Io("Cannot read temp file"))?;
        self.pos += len as u64;
        Ok(())
    }
}
