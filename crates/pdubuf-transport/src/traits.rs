use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::ancillary::{recv_with_ancillary, send_with_ancillary, AncillaryData};
use crate::error::Result;

/// The transport interface used by PDU send and receive buffers.
///
/// Both methods perform exactly one attempt. A write never blocks; if the
/// peer cannot take any bytes it fails with [`io::ErrorKind::WouldBlock`].
/// Retrying is the caller's event loop's job.
pub trait PduTransport {
    /// Write as much of `buf` as the transport accepts, attaching
    /// `ancillary` to the first transferred byte.
    fn send_pdu(&mut self, buf: &[u8], ancillary: Option<&AncillaryData>) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes, appending any passed descriptors to
    /// `fds`. Returns 0 at end of stream.
    fn recv_pdu(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize>;
}

impl<T: PduTransport + ?Sized> PduTransport for &mut T {
    fn send_pdu(&mut self, buf: &[u8], ancillary: Option<&AncillaryData>) -> io::Result<usize> {
        (**self).send_pdu(buf, ancillary)
    }

    fn recv_pdu(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
        (**self).recv_pdu(buf, fds)
    }
}

impl PduTransport for UnixStream {
    fn send_pdu(&mut self, buf: &[u8], ancillary: Option<&AncillaryData>) -> io::Result<usize> {
        send_with_ancillary(self.as_raw_fd(), buf, ancillary)
    }

    fn recv_pdu(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
        recv_with_ancillary(self.as_raw_fd(), buf, fds)
    }
}

/// A connected local socket stream carrying PDUs.
pub struct IpcStream {
    inner: UnixStream,
}

impl IpcStream {
    pub(crate) fn from_unix(stream: UnixStream) -> Self {
        Self { inner: stream }
    }

    /// Switch the socket between blocking and non-blocking reads.
    ///
    /// Writes through [`PduTransport`] never block regardless of this mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.inner.set_nonblocking(nonblocking).map_err(Into::into)
    }

    /// Wait until the socket can accept more bytes.
    ///
    /// Returns `false` when `timeout` elapsed first.
    pub fn wait_writable(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.inner.as_raw_fd(),
            events: libc::POLLOUT,
            revents: 0,
        };
        let millis = timeout
            .map(|t| t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int)
            .unwrap_or(-1);
        loop {
            // SAFETY: `pfd` is a valid pollfd for one open descriptor.
            let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }
            return Ok(rc > 0);
        }
    }

    /// Credentials of the connected peer process, where the platform
    /// reports them.
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        peer_credentials(self.inner.as_raw_fd())
    }
}

/// Identity of the process on the other end of a local socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn peer_credentials(fd: RawFd) -> Option<PeerCredentials> {
    // SAFETY: ucred is a plain C struct; all-zero is valid.
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    // SAFETY: `cred` and `len` are writable and sized for SO_PEERCRED.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            std::ptr::addr_of_mut!(cred).cast(),
            &mut len,
        )
    };
    (rc == 0 && len as usize == std::mem::size_of::<libc::ucred>()).then(|| PeerCredentials {
        pid: cred.pid as u32,
        uid: cred.uid,
        gid: cred.gid,
    })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn peer_credentials(_fd: RawFd) -> Option<PeerCredentials> {
    None
}

impl From<UnixStream> for IpcStream {
    fn from(stream: UnixStream) -> Self {
        Self::from_unix(stream)
    }
}

impl AsRawFd for IpcStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl PduTransport for IpcStream {
    fn send_pdu(&mut self, buf: &[u8], ancillary: Option<&AncillaryData>) -> io::Result<usize> {
        self.inner.send_pdu(buf, ancillary)
    }

    fn recv_pdu(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
        self.inner.recv_pdu(buf, fds)
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("fd", &self.inner.as_raw_fd())
            .field("peer", &self.peer_credentials())
            .finish()
    }
}
