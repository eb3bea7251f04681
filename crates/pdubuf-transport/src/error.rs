use std::io;
use std::path::PathBuf;

/// Socket setup failures.
///
/// Send and receive attempts report plain [`io::Error`]s instead, so a
/// would-block result stays distinguishable from a broken connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {path}: {source}")]
    Listen { path: PathBuf, source: io::Error },

    #[error("cannot connect to {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    #[error("accept on {path} failed: {source}")]
    Accept { path: PathBuf, source: io::Error },

    /// Something other than a socket already occupies the path.
    #[error("{path} exists and is not a socket")]
    NotASocket { path: PathBuf },

    /// The path does not fit in `sockaddr_un`.
    #[error("socket path {path} is {len} bytes, limit is {max}")]
    PathTooLong { path: PathBuf, len: usize, max: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
