use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use tracing::{debug, error};

use crate::errors::Result;
use crate::keydir::KeyDir;
use crate::{
    closed_log_name, hint, hint_file_name, parse_closed_log_name, parse_hint_file_name, record,
    DataFileId, ACTIVE_FILE_NAME,
};

/// Reconstructs the keydir for a data directory.
///
/// Hint files are applied oldest to newest so that later generations
/// overwrite earlier ones, each entry bound to the hint's companion data
/// file. A hint whose companion log no longer exists is an orphan and is
/// skipped; orphan logs are left untouched. Afterwards the active file is
/// replayed so mutations that were never rotated survive a restart.
///
/// Any IO failure or corrupt file is fatal here: a store must not open
/// over an index it could not fully rebuild.
pub(crate) fn rebuild_keydir(data_path: &Path) -> Result<KeyDir> {
    let mut keydir = KeyDir::new();

    let mut hint_ids = list_hint_ids(data_path)?;
    hint_ids.sort_unstable();

    for id in hint_ids {
        let hint_path = data_path.join(hint_file_name(id));
        if !data_path.join(closed_log_name(id)).exists() {
            debug!("skipping orphan hint {:?}", hint_path);
            continue;
        }
        for (key, offset) in hint::read_hints(&hint_path)? {
            keydir.upsert(key, DataFileId::Closed(id), offset);
        }
    }

    scan_active_file(data_path, &mut keydir)?;

    debug!("rebuilt keydir with {} entries", keydir.len());
    Ok(keydir)
}

/// Replays the active file sequentially, indexing every record found.
/// Tombstones are indexed too: the newest write stays authoritative over
/// whatever the hints said about the key.
fn scan_active_file(data_path: &Path, keydir: &mut KeyDir) -> Result<()> {
    let path = data_path.join(ACTIVE_FILE_NAME);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut offset = 0u64;
    while let Some(rec) = record::read_record(&mut reader)? {
        keydir.upsert(rec.key().to_vec(), DataFileId::Active, offset);
        offset += rec.encoded_size();
    }
    Ok(())
}

pub(crate) fn list_hint_ids(data_path: &Path) -> Result<Vec<u64>> {
    list_ids(data_path, parse_hint_file_name)
}

pub(crate) fn list_closed_log_ids(data_path: &Path) -> Result<Vec<u64>> {
    list_ids(data_path, parse_closed_log_name)
}

fn list_ids(data_path: &Path, parse: fn(&str) -> Option<&str>) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    for entry in data_path.read_dir()? {
        let entry = entry?;
        // skip non-files
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        match parse(&file_name) {
            Some(raw_id) => match raw_id.parse::<u64>() {
                Ok(id) => ids.push(id),
                Err(err) => {
                    // not fatal, the file simply is not one of ours
                    error!("failed to extract file ID from {file_name}: {err}");
                }
            },
            None => {
                debug!("directory scan ignoring {}", file_name);
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn newer_hints_overwrite_older_ones() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data_1.log"), b"").unwrap();
        fs::write(dir.path().join("data_2.log"), b"").unwrap();
        hint::write_hints(
            &dir.path().join("data_1.hint"),
            vec![(b"a".as_slice(), 0), (b"b".as_slice(), 11)],
        )
        .unwrap();
        hint::write_hints(&dir.path().join("data_2.hint"), vec![(b"a".as_slice(), 5)]).unwrap();

        let keydir = rebuild_keydir(dir.path()).unwrap();
        assert_eq!(keydir.len(), 2);

        let a = keydir.lookup(b"a").unwrap();
        assert_eq!((a.file, a.offset), (DataFileId::Closed(2), 5));
        let b = keydir.lookup(b"b").unwrap();
        assert_eq!((b.file, b.offset), (DataFileId::Closed(1), 11));
    }

    #[test]
    fn orphan_hints_are_skipped() {
        let dir = TempDir::new().unwrap();
        hint::write_hints(&dir.path().join("data_9.hint"), vec![(b"ghost".as_slice(), 0)])
            .unwrap();

        let keydir = rebuild_keydir(dir.path()).unwrap();
        assert!(keydir.is_empty());
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.txt.lock"), b"").unwrap();
        fs::write(dir.path().join("compacted_data.txt"), b"").unwrap();
        fs::write(dir.path().join("data_notanumber.log"), b"").unwrap();
        fs::create_dir(dir.path().join("data_5.log")).unwrap();

        assert!(list_closed_log_ids(dir.path()).unwrap().is_empty());
        assert!(list_hint_ids(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn active_file_records_are_replayed() {
        let dir = TempDir::new().unwrap();
        let mut bytes = record::encode_put(b"a", b"1"); // offset 0, size 11
        bytes.extend_from_slice(&record::encode_put(b"b", b"2")); // offset 11
        bytes.extend_from_slice(&record::encode_tombstone(b"a")); // offset 22
        fs::write(dir.path().join(ACTIVE_FILE_NAME), bytes).unwrap();

        let keydir = rebuild_keydir(dir.path()).unwrap();
        let a = keydir.lookup(b"a").unwrap();
        assert_eq!((a.file, a.offset), (DataFileId::Active, 22));
        let b = keydir.lookup(b"b").unwrap();
        assert_eq!((b.file, b.offset), (DataFileId::Active, 11));
    }

    #[test]
    fn active_file_overrides_hint_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data_1.log"), b"").unwrap();
        hint::write_hints(&dir.path().join("data_1.hint"), vec![(b"k".as_slice(), 3)]).unwrap();
        fs::write(
            dir.path().join(ACTIVE_FILE_NAME),
            record::encode_put(b"k", b"fresh"),
        )
        .unwrap();

        let keydir = rebuild_keydir(dir.path()).unwrap();
        let k = keydir.lookup(b"k").unwrap();
        assert_eq!((k.file, k.offset), (DataFileId::Active, 0));
    }

    #[test]
    fn sub_header_tail_in_the_active_file_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let mut bytes = record::encode_put(b"a", b"1");
        bytes.extend_from_slice(&[0x00, 0x00, 0x00]); // torn write, shorter than a header
        fs::write(dir.path().join(ACTIVE_FILE_NAME), bytes).unwrap();

        let keydir = rebuild_keydir(dir.path()).unwrap();
        assert_eq!(keydir.len(), 1);
        assert_eq!(keydir.lookup(b"a").unwrap().offset, 0);
    }

    #[test]
    fn corrupt_active_tail_refuses_to_open() {
        let dir = TempDir::new().unwrap();
        let mut bytes = record::encode_put(b"a", b"1");
        let mut torn = record::encode_put(b"b", b"payload");
        torn.truncate(torn.len() - 3); // full header, short payload
        bytes.extend_from_slice(&torn);
        fs::write(dir.path().join(ACTIVE_FILE_NAME), bytes).unwrap();

        assert!(matches!(
            rebuild_keydir(dir.path()),
            Err(Error::Corrupt(_))
        ));
    }
}
