use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::errors::{Error, Result};

/// Hint file codec.
///
/// A hint file is the compact side-index of a closed data file: one entry
/// per live key, `key_len (4, big-endian) | key | offset (8, big-endian)`,
/// where the offset points at the record's flag byte in the companion data
/// file. Tombstoned keys are never written.

pub(crate) fn write_hints<'a, I>(path: &Path, entries: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a [u8], u64)>,
{
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    let mut out = BufWriter::new(file);
    for (key, offset) in entries {
        out.write_all(&(key.len() as u32).to_be_bytes())?;
        out.write_all(key)?;
        out.write_all(&offset.to_be_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Reads every entry in stored order. A partial trailing entry is corrupt:
/// hint files are written in one shot and never truncated legitimately.
pub(crate) fn read_hints(path: &Path) -> Result<Vec<(Vec<u8>, u64)>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    loop {
        if reader.fill_buf()?.is_empty() {
            return Ok(entries);
        }
        let mut key_len_buf = [0u8; 4];
        reader.read_exact(&mut key_len_buf).map_err(short_entry)?;
        let key_len = u32::from_be_bytes(key_len_buf);

        let mut key = vec![0u8; key_len as usize];
        reader.read_exact(&mut key).map_err(short_entry)?;

        let mut offset_buf = [0u8; 8];
        reader.read_exact(&mut offset_buf).map_err(short_entry)?;
        entries.push((key, u64::from_be_bytes(offset_buf)));
    }
}

fn short_entry(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Corrupt("hint entry truncated")
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn entries_come_back_in_stored_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data_1.hint");

        let entries: Vec<(&[u8], u64)> =
            vec![(b"alpha".as_slice(), 0), (b"b".as_slice(), 23), (b"".as_slice(), 99)];
        write_hints(&path, entries).unwrap();

        let read = read_hints(&path).unwrap();
        assert_eq!(
            read,
            vec![
                (b"alpha".to_vec(), 0),
                (b"b".to_vec(), 23),
                (Vec::new(), 99),
            ]
        );
    }

    #[test]
    fn on_disk_layout_is_len_key_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data_1.hint");
        write_hints(&path, vec![(b"key".as_slice(), 0x0102u64)]).unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), 15);
        assert_eq!(u32::from_be_bytes(data[0..4].try_into().unwrap()), 3);
        assert_eq!(&data[4..7], b"key");
        assert_eq!(u64::from_be_bytes(data[7..15].try_into().unwrap()), 0x0102);
    }

    #[test]
    fn rewrite_truncates_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data_1.hint");
        write_hints(&path, vec![(b"old-key".as_slice(), 7)]).unwrap();
        write_hints(&path, vec![(b"k".as_slice(), 1)]).unwrap();

        assert_eq!(read_hints(&path).unwrap(), vec![(b"k".to_vec(), 1)]);
    }

    #[test]
    fn partial_trailing_entry_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data_1.hint");
        write_hints(&path, vec![(b"key".as_slice(), 42)]).unwrap();

        let mut data = fs::read(&path).unwrap();
        data.truncate(data.len() - 3);
        fs::write(&path, &data).unwrap();

        assert!(matches!(read_hints(&path), Err(Error::Corrupt(_))));
    }
}
