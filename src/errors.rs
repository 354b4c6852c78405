use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The key is absent from the keydir. An expected outcome of `get`,
    /// never a failure of the store itself.
    #[error("key not found")]
    KeyNotFound,

    /// The keydir entry for the key points at a tombstone.
    #[error("key was deleted")]
    KeyDeleted,

    #[error("corrupt record: {0}")]
    Corrupt(&'static str),

    #[error("rotation lock is held by another process")]
    LockContention,

    #[error("key size {0} exceeds the maximum allowed {1}")]
    KeyTooBig(usize, usize),

    #[error("value size {0} exceeds the maximum allowed {1}")]
    ValueTooBig(usize, usize),
}
