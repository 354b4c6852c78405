use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// pread-based reader over one data file.
///
/// Positioned reads leave the file cursor untouched, so a single handle can
/// serve lookups at arbitrary offsets without seeking back and forth.
pub(crate) struct LogReader {
    file: File,
}

impl LogReader {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(false).open(path)?;
        Ok(LogReader { file })
    }

    /// Fills `buf` from the given offset. Offsets are relative to the start
    /// of the file and independent of the current cursor. Hitting end of
    /// file before the buffer is full yields `UnexpectedEof`.
    pub(crate) fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }
}
