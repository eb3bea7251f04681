use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// `sun_path` holds 108 bytes on Linux and 104 elsewhere, NUL included.
#[cfg(any(target_os = "linux", target_os = "android"))]
const SUN_PATH_LEN: usize = 108;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SUN_PATH_LEN: usize = 104;

/// Device and inode of the socket file this listener created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    fn of(meta: &std::fs::Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// A listening Unix domain socket bound to a filesystem path.
///
/// Dropping the listener unlinks its socket file, provided the path still
/// names the file it created.
#[derive(Debug)]
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    file: FileId,
}

impl UnixDomainSocket {
    /// Owner read/write only.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Listen at `path` with permission bits `mode`.
    ///
    /// A leftover socket file at `path` is replaced; any other file is
    /// left alone and reported as [`TransportError::NotASocket`].
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref();
        check_path_len(path)?;
        remove_stale(path)?;

        let listen_err = |source: io::Error| TransportError::Listen {
            path: path.to_path_buf(),
            source,
        };
        let listener = UnixListener::bind(path).map_err(listen_err)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(listen_err)?;
        let file = std::fs::symlink_metadata(path)
            .map(|meta| FileId::of(&meta))
            .map_err(listen_err)?;

        info!(?path, mode = format_args!("{mode:o}"), "listening for PDU connections");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            file,
        })
    }

    /// Block until a peer connects.
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _) = self
            .listener
            .accept()
            .map_err(|source| TransportError::Accept {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = ?self.path, "peer connected");
        Ok(IpcStream::from_unix(stream))
    }

    /// Connect to a listener at `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        check_path_len(path)?;
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected");
        Ok(IpcStream::from_unix(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let current = std::fs::symlink_metadata(&self.path).ok();
        match current {
            Some(meta) if meta.file_type().is_socket() && FileId::of(&meta) == self.file => {
                if let Err(err) = std::fs::remove_file(&self.path) {
                    debug!(path = ?self.path, error = %err, "socket file not removed");
                }
            }
            _ => debug!(path = ?self.path, "socket file replaced, leaving it"),
        }
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= SUN_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: SUN_PATH_LEN - 1,
        });
    }
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(TransportError::Listen {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if !meta.file_type().is_socket() {
        return Err(TransportError::NotASocket {
            path: path.to_path_buf(),
        });
    }
    debug!(?path, "replacing stale socket file");
    std::fs::remove_file(path).map_err(|source| TransportError::Listen {
        path: path.to_path_buf(),
        source,
    })
}
