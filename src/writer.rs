use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use tracing::debug;

use crate::errors::{Error, Result};
use crate::record;
use crate::{StoreOptions, ACTIVE_FILE_NAME};

/// Owns the single currently-writable data file.
///
/// Appends go through a user-space buffer that is flushed to the kernel on
/// every mutation; durability to physical media is left to the host. The
/// file-end offset is tracked here rather than queried from the handle so
/// that returned offsets are correct regardless of buffered bytes.
pub(crate) struct ActiveLog {
    out: BufWriter<File>,
    active_size: u64,
    key_max_size: usize,
    value_max_size: usize,
}

impl ActiveLog {
    /// Opens the active file in append mode, creating it if absent. An
    /// existing file keeps its contents; `active_size` picks up at its
    /// current length so appended records report true offsets.
    pub(crate) fn open(options: &StoreOptions) -> Result<Self> {
        let path = options.data_path.join(ACTIVE_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let active_size = file.metadata()?.len();
        debug!("opened active data file at {:?}, size {}", path, active_size);
        Ok(ActiveLog {
            out: BufWriter::new(file),
            active_size,
            key_max_size: options.key_max_size,
            value_max_size: options.value_max_size,
        })
    }

    /// Appends a normal record and returns the offset of its flag byte.
    pub(crate) fn put(&mut self, key: &[u8], value: &[u8]) -> Result<u64> {
        self.check_sizes(key, Some(value))?;
        self.append(record::encode_put(key, value))
    }

    /// Appends a tombstone and returns the offset of its flag byte.
    pub(crate) fn delete(&mut self, key: &[u8]) -> Result<u64> {
        self.check_sizes(key, None)?;
        self.append(record::encode_tombstone(key))
    }

    fn append(&mut self, buf: Vec<u8>) -> Result<u64> {
        // captured before the write: this is the record's start offset
        let offset = self.active_size;
        self.out.write_all(&buf)?;
        self.out.flush()?;
        self.active_size += buf.len() as u64;
        Ok(offset)
    }

    fn check_sizes(&self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if key.len() > self.key_max_size {
            return Err(Error::KeyTooBig(key.len(), self.key_max_size));
        }
        if let Some(value) = value {
            if value.len() > self.value_max_size {
                return Err(Error::ValueTooBig(value.len(), self.value_max_size));
            }
        }
        Ok(())
    }

    /// Bytes appended since the file was created or last rotated, plus any
    /// pre-existing content found at open.
    pub(crate) fn size(&self) -> u64 {
        self.active_size
    }

    /// Forces the user-space buffer into the kernel.
    pub(crate) fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Flushes and asks the OS to push the file to physical media.
    pub(crate) fn sync(&mut self) -> Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}
