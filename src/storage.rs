use std::collections::HashMap;
use std::fs;

use tracing::{debug, error};

use crate::errors::{Error, Result};
use crate::keydir::KeyDir;
use crate::reader::LogReader;
use crate::writer::ActiveLog;
use crate::{record, recovery, rotation, DataFileId, StoreOptions};

/// An embedded, single-writer, log-structured key-value store.
///
/// Every mutation appends a record to the active data file and updates the
/// in-memory keydir; reads consult the keydir and perform one positioned
/// read. When a mutation pushes the active file past
/// `StoreOptions::max_file_size`, the store synchronously rotates: the
/// active file is retired, all closed files are compacted into a single
/// generation with a hint file, and the keydir is rebuilt.
///
/// The directory layout is:
///
/// ```text
/// data_path/
/// ├── data.txt            <-- active data file (append-only)
/// ├── data_<ts>.log       <-- closed, immutable data file
/// ├── data_<ts>.hint      <-- hint index for the closed file
/// └── data.txt.lock       <-- advisory lock taken during rotation
/// ```
pub struct Store {
    options: StoreOptions,
    keydir: KeyDir,
    writer: ActiveLog,
}

impl Store {
    /// Opens (creating if necessary) the store in `options.data_path` and
    /// rebuilds the keydir from hint files and the active file. Refuses to
    /// open if any file needed for the rebuild is unreadable or corrupt.
    pub fn open(options: StoreOptions) -> Result<Self> {
        fs::create_dir_all(&options.data_path)?;
        let keydir = recovery::rebuild_keydir(&options.data_path)?;
        let writer = ActiveLog::open(&options)?;
        debug!(
            "store opened at {:?} with {} indexed keys",
            options.data_path,
            keydir.len()
        );
        Ok(Store {
            options,
            keydir,
            writer,
        })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let offset = self.writer.put(key, value)?;
        self.keydir.upsert(key.to_vec(), DataFileId::Active, offset);
        self.maybe_rotate()
    }

    /// Looks the key up and reads its value with a single positioned read.
    /// Returns `KeyNotFound` for unindexed keys and `KeyDeleted` when the
    /// newest record for the key is a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let entry = self.keydir.lookup(key).ok_or(Error::KeyNotFound)?;
        let path = self.options.data_path.join(entry.file.file_name());
        let log = LogReader::open(&path)?;

        let mut header = [0u8; record::HEADER_SIZE];
        log.read_exact_at(&mut header, entry.offset)?;
        match header[0] {
            record::FLAG_TOMBSTONE => Err(Error::KeyDeleted),
            record::FLAG_NORMAL => {
                let key_len =
                    u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as u64;
                let value_len =
                    u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
                let mut value = vec![0u8; value_len];
                log.read_exact_at(&mut value, entry.offset + record::HEADER_SIZE as u64 + key_len)?;
                Ok(value)
            }
            _ => Err(Error::Corrupt("unknown record flag")),
        }
    }

    /// Appends a tombstone for the key. The tombstone's location is indexed
    /// rather than the key removed, so the newest write stays authoritative
    /// until the next rotation compacts the key away; `get` reports the
    /// deletion from the flag byte.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let offset = self.writer.delete(key)?;
        self.keydir.upsert(key.to_vec(), DataFileId::Active, offset);
        self.maybe_rotate()
    }

    /// All live keys, in no particular order. Keys whose newest record is a
    /// tombstone are filtered out by checking the flag byte on disk.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut readers: HashMap<String, LogReader> = HashMap::new();
        let mut keys = Vec::new();
        for key in self.keydir.keys() {
            let Some(entry) = self.keydir.lookup(&key) else {
                continue;
            };
            let file_name = entry.file.file_name();
            if !readers.contains_key(&file_name) {
                let log = LogReader::open(&self.options.data_path.join(&file_name))?;
                readers.insert(file_name.clone(), log);
            }
            let mut flag = [0u8; 1];
            readers[&file_name].read_exact_at(&mut flag, entry.offset)?;
            if flag[0] == record::FLAG_NORMAL {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Flushes the active file and asks the OS to push it to stable media.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.sync()
    }

    /// Flushes the active writer and consumes the store.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()
    }

    fn maybe_rotate(&mut self) -> Result<()> {
        if self.writer.size() > self.options.max_file_size {
            debug!(
                "active file at {} bytes exceeds {}, rotating",
                self.writer.size(),
                self.options.max_file_size
            );
            rotation::rotate(&self.options, &mut self.writer, &mut self.keydir)?;
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            error!("failed to flush active file on drop: {e}");
        }
    }
}
