//! Ancillary (out-of-band) data carried next to a socket write.
//!
//! Only `SCM_RIGHTS` is supported: a list of file descriptors handed to the
//! peer together with the first byte of a send. The kernel attaches the
//! control message to that byte, so a resumed partial send must not repeat
//! it.

use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use tracing::{debug, trace};

/// Maximum number of descriptors accepted by a single receive call.
pub const MAX_RECV_FDS: usize = 32;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = libc::MSG_DONTWAIT;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

/// Ancillary metadata attached to one transmission.
///
/// Descriptors are borrowed: the caller keeps them open until the send
/// that carries them has transferred its first byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncillaryData {
    /// Descriptors passed with `SCM_RIGHTS`.
    pub fds: Vec<RawFd>,
}

impl AncillaryData {
    /// Ancillary data passing the given descriptors.
    pub fn with_fds(fds: impl Into<Vec<RawFd>>) -> Self {
        Self { fds: fds.into() }
    }

    /// True when there is nothing to attach.
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
}

/// Control buffer aligned for `cmsghdr`.
struct ControlBuf {
    words: Vec<u64>,
    len: usize,
}

impl ControlBuf {
    fn for_fds(count: usize) -> Self {
        let payload = (count * mem::size_of::<RawFd>()) as libc::c_uint;
        // SAFETY: CMSG_SPACE is a pure size computation.
        let len = unsafe { libc::CMSG_SPACE(payload) } as usize;
        Self {
            words: vec![0u64; len.div_ceil(mem::size_of::<u64>())],
            len,
        }
    }

    fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        self.words.as_mut_ptr().cast()
    }
}

/// One `sendmsg` attempt on `fd` without blocking.
pub(crate) fn send_with_ancillary(
    fd: RawFd,
    buf: &[u8],
    ancillary: Option<&AncillaryData>,
) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: buf.as_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };
    // SAFETY: msghdr is a plain C struct for which all-zero is a valid value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1 as _;

    let fds = ancillary.map(|a| a.fds.as_slice()).unwrap_or_default();
    let mut control = None;
    if !fds.is_empty() {
        let cbuf = control.insert(ControlBuf::for_fds(fds.len()));
        msg.msg_control = cbuf.as_mut_ptr();
        msg.msg_controllen = cbuf.len as _;

        let payload = mem::size_of_val(fds);
        // SAFETY: msg_control points at a zeroed, cmsghdr-aligned buffer of
        // CMSG_SPACE(payload) bytes, so the first header and its data area
        // are in bounds for `payload` bytes.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(payload as libc::c_uint) as _;
            std::ptr::copy_nonoverlapping(
                fds.as_ptr().cast::<u8>(),
                libc::CMSG_DATA(cmsg),
                payload,
            );
        }
        trace!(count = fds.len(), "attaching SCM_RIGHTS");
    }

    // SAFETY: `msg` references `iov` and the control buffer, both alive for
    // the duration of the call; `fd` is owned by the caller.
    let rc = unsafe { libc::sendmsg(fd, &msg, SEND_FLAGS) };
    drop(control);
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}

/// One `recvmsg` call on `fd`, collecting passed descriptors into `fds`.
pub(crate) fn recv_with_ancillary(
    fd: RawFd,
    buf: &mut [u8],
    fds: &mut Vec<OwnedFd>,
) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    let mut control = ControlBuf::for_fds(MAX_RECV_FDS);
    // SAFETY: msghdr is a plain C struct for which all-zero is a valid value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1 as _;
    msg.msg_control = control.as_mut_ptr();
    msg.msg_controllen = control.len as _;

    // SAFETY: `msg` references live buffers sized as declared.
    let rc = unsafe { libc::recvmsg(fd, &mut msg, RECV_FLAGS) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut received = Vec::new();
    // SAFETY: the kernel filled msg_control with well-formed headers up to
    // msg_controllen; CMSG_FIRSTHDR/CMSG_NXTHDR stay within that range and
    // each SCM_RIGHTS payload holds `cmsg_len - CMSG_LEN(0)` bytes of fds.
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg).cast::<RawFd>();
                let bytes = (*cmsg).cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                for i in 0..bytes / mem::size_of::<RawFd>() {
                    let raw = data.add(i).read_unaligned();
                    received.push(OwnedFd::from_raw_fd(raw));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        debug!(
            kept = received.len(),
            "ancillary data truncated, closing received descriptors"
        );
        drop(received);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "ancillary data truncated",
        ));
    }

    if !received.is_empty() {
        trace!(count = received.len(), "received SCM_RIGHTS");
    }
    fds.extend(received);
    Ok(rc as usize)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn plain_bytes_without_ancillary() {
        let (left, right) = UnixStream::pair().unwrap();
        let sent = send_with_ancillary(left.as_raw_fd(), b"abc", None).unwrap();
        assert_eq!(sent, 3);

        let mut buf = [0u8; 8];
        let mut fds = Vec::new();
        let n = recv_with_ancillary(right.as_raw_fd(), &mut buf, &mut fds).unwrap();
        assert_eq!(&buf[..n], b"abc");
        assert!(fds.is_empty());
    }

    /// Removes the fixture file even when an assertion fails.
    struct TempPath(std::path::PathBuf);

    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn descriptor_arrives_with_bytes() {
        let path = TempPath(
            std::env::temp_dir().join(format!("pdubuf-anc-{}", std::process::id())),
        );
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path.0)
            .unwrap();
        file.write_all(b"shared").unwrap();

        let (left, right) = UnixStream::pair().unwrap();
        let anc = AncillaryData::with_fds([file.as_raw_fd()]);
        send_with_ancillary(left.as_raw_fd(), b"x", Some(&anc)).unwrap();

        let mut buf = [0u8; 1];
        let mut fds = Vec::new();
        recv_with_ancillary(right.as_raw_fd(), &mut buf, &mut fds).unwrap();
        assert_eq!(fds.len(), 1);

        let mut passed = std::fs::File::from(fds.pop().unwrap());
        passed.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        passed.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "shared");
    }

    #[test]
    fn send_does_not_block_on_full_socket() {
        let (left, _right) = UnixStream::pair().unwrap();
        let chunk = vec![0u8; 64 * 1024];
        let err = loop {
            match send_with_ancillary(left.as_raw_fd(), &chunk, None) {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn empty_ancillary_is_empty() {
        assert!(AncillaryData::default().is_empty());
        assert!(!AncillaryData::with_fds(vec![0]).is_empty());
    }
}
