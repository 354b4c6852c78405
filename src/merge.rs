use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::Result;
use crate::record;

/// Compacts a set of closed data files into a single output.
///
/// `inputs` must be ordered newest to oldest. Each file is scanned
/// sequentially; the surviving record per key is the one from the newest
/// file, and within a file the last occurrence (records later in a file are
/// more recent appends). Keys whose surviving record is a tombstone are
/// dropped, so the output holds exactly one normal record per live key.
///
/// The output is written in full before this returns; on any error the
/// caller must discard it. Callers write to a transient path and rename
/// into place only on success.
pub(crate) fn merge_files(inputs: &[PathBuf], output: &Path) -> Result<()> {
    // key -> (index of the input it was recorded from, value or tombstone)
    let mut latest: HashMap<Vec<u8>, (usize, Option<Vec<u8>>)> = HashMap::new();

    for (file_idx, path) in inputs.iter().enumerate() {
        debug!("merging records from {:?}", path);
        let mut reader = BufReader::new(File::open(path)?);
        loop {
            let Some(header) = record::read_header(&mut reader)? else {
                break;
            };
            let mut key = vec![0u8; header.key_len as usize];
            reader.read_exact(&mut key).map_err(record::truncated)?;

            // already recorded from a newer file: this is an older copy
            if latest.get(&key).is_some_and(|(idx, _)| *idx < file_idx) {
                record::skip_value(&mut reader, header.value_len)?;
                continue;
            }

            if header.flag == record::FLAG_TOMBSTONE {
                latest.insert(key, (file_idx, None));
            } else {
                let mut value = vec![0u8; header.value_len as usize];
                reader.read_exact(&mut value).map_err(record::truncated)?;
                latest.insert(key, (file_idx, Some(value)));
            }
        }
    }

    let live = latest.values().filter(|(_, v)| v.is_some()).count();
    debug!(
        "writing {} live keys of {} seen to {:?}",
        live,
        latest.len(),
        output
    );

    let out_file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(output)?;
    let mut out = BufWriter::new(out_file);
    for (key, (_, value)) in &latest {
        if let Some(value) = value {
            out.write_all(&record::encode_put(key, value))?;
        }
    }
    out.flush()?;
    Ok(())
}
