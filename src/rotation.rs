use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::keydir::KeyDir;
use crate::writer::ActiveLog;
use crate::{
    closed_log_name, hint, hint_file_name, merge, record, recovery, unix_seconds, StoreOptions,
    ACTIVE_FILE_NAME, LOCK_FILE_NAME, MERGE_FILE_NAME,
};

/// Retires the active file, compacts every closed log into a single
/// generation, writes its hint file, deletes the superseded files and
/// rebuilds the keydir.
///
/// Runs synchronously on the caller's thread under an advisory lock on the
/// data directory; the lock exists to stop a second process instance from
/// rotating the same directory concurrently. The caller's writer is swapped
/// to a fresh active file as soon as the old one is retired, so even when a
/// later step fails the writer stays usable and the error is reported.
pub(crate) fn rotate(
    options: &StoreOptions,
    writer: &mut ActiveLog,
    keydir: &mut KeyDir,
) -> Result<()> {
    writer.flush()?;

    let data_path = &options.data_path;
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(data_path.join(LOCK_FILE_NAME))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| Error::LockContention)?;
    // held until lock_file drops, on every exit path

    let id = next_closed_id(data_path)?;
    let retired = data_path.join(closed_log_name(id));
    fs::rename(data_path.join(ACTIVE_FILE_NAME), &retired)?;
    debug!("retired active file to {:?}", retired);

    *writer = ActiveLog::open(options)?;

    let mut log_ids = recovery::list_closed_log_ids(data_path)?;
    log_ids.sort_unstable_by(|a, b| b.cmp(a));
    let inputs: Vec<PathBuf> = log_ids
        .iter()
        .map(|log_id| data_path.join(closed_log_name(*log_id)))
        .collect();

    let merge_path = data_path.join(MERGE_FILE_NAME);
    merge::merge_files(&inputs, &merge_path)?;
    fs::rename(&merge_path, &retired)?;
    debug!("installed compacted log as {:?}", retired);

    // The merger writes through a buffered stream and never learns the
    // offsets it produced; re-scan the installed file for the
    // authoritative record-start offsets.
    let offsets = scan_record_offsets(&retired)?;
    hint::write_hints(
        &data_path.join(hint_file_name(id)),
        offsets.iter().map(|(key, offset)| (key.as_slice(), *offset)),
    )?;

    for old_id in log_ids {
        if old_id != id {
            fs::remove_file(data_path.join(closed_log_name(old_id)))?;
        }
    }
    for old_id in recovery::list_hint_ids(data_path)? {
        if old_id != id {
            fs::remove_file(data_path.join(hint_file_name(old_id)))?;
        }
    }

    let fresh = recovery::rebuild_keydir(data_path)?;
    keydir.bulk_replace(fresh);
    debug!("rotation complete, closed generation {}", id);
    Ok(())
}

/// Closed-file identifier for the file being retired now. Uses the wall
/// clock in seconds, bumped past any existing identifier so two rotations
/// within one second still produce strictly increasing names.
fn next_closed_id(data_path: &Path) -> Result<u64> {
    let now = unix_seconds();
    Ok(match recovery::list_closed_log_ids(data_path)?.into_iter().max() {
        Some(max) if max >= now => max + 1,
        _ => now,
    })
}

/// Walks a data file sequentially, recording the start offset of every
/// normal record keyed by its key bytes.
fn scan_record_offsets(path: &Path) -> Result<HashMap<Vec<u8>, u64>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut offsets = HashMap::new();
    let mut offset = 0u64;
    loop {
        let Some(header) = record::read_header(&mut reader)? else {
            return Ok(offsets);
        };
        let mut key = vec![0u8; header.key_len as usize];
        reader.read_exact(&mut key).map_err(record::truncated)?;
        if header.flag == record::FLAG_NORMAL {
            offsets.insert(key, offset);
        }
        record::skip_value(&mut reader, header.value_len)?;
        offset += header.record_size();
    }
}
