use std::io::ErrorKind;
use std::os::fd::OwnedFd;

use bytes::Buf;
use pdubuf_transport::PduTransport;
use tracing::{debug, trace};

use crate::error::{PduError, Result};
use crate::pdu::{alloc_zeroed, PduConfig, PduRef, HEADER_SIZE, MAX_PAYLOAD};

/// Accumulates the bytes of one incoming PDU.
///
/// The buffer classifies what it holds; it does not decide when to read.
/// A caller either writes into [`spare_mut`](Self::spare_mut) and reports
/// the count with [`advance`](Self::advance), or lets
/// [`recv_from`](Self::recv_from) do one read on a transport. Either way
/// the declared payload length is checked against the buffer's capacity as
/// soon as the header is complete.
pub struct ReceiveBuffer {
    buf: Box<[u8]>,
    len: usize,
    fds: Vec<OwnedFd>,
}

impl ReceiveBuffer {
    /// Create a buffer for PDUs with up to `max_payload_len` payload bytes.
    pub fn new(max_payload_len: usize) -> Result<Self> {
        if max_payload_len > MAX_PAYLOAD {
            return Err(PduError::PayloadTooLarge {
                size: max_payload_len,
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            buf: alloc_zeroed(HEADER_SIZE + max_payload_len)?,
            len: 0,
            fds: Vec::new(),
        })
    }

    /// Create a buffer sized by `config.max_payload_len`.
    pub fn with_config(config: &PduConfig) -> Result<Self> {
        Self::new(config.max_payload_len)
    }

    /// Total bytes the buffer holds, header included.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes received so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_header(&self) -> bool {
        self.len >= HEADER_SIZE
    }

    /// Payload length announced by the header, once the header is in.
    pub fn declared_len(&self) -> Option<u16> {
        self.has_header()
            .then(|| (&self.buf[2..HEADER_SIZE]).get_u16_ne())
    }

    pub fn has_complete_pdu(&self) -> bool {
        self.declared_len()
            .is_some_and(|declared| self.len >= HEADER_SIZE + declared as usize)
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity()
    }

    /// Bytes still missing: the rest of the header, then the rest of the
    /// payload. Zero once a PDU is complete.
    pub fn wanted(&self) -> usize {
        match self.declared_len() {
            None => HEADER_SIZE - self.len,
            Some(declared) => (HEADER_SIZE + declared as usize).saturating_sub(self.len),
        }
    }

    /// Unfilled storage after the received bytes.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Mark `n` more bytes of [`spare_mut`](Self::spare_mut) as received.
    ///
    /// Fails, leaving the buffer unchanged, when `n` overruns the storage
    /// or the now-complete header declares more payload than fits.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        let spare = self.capacity() - self.len;
        if n > spare {
            return Err(PduError::Capacity {
                offset: self.len,
                width: n,
                capacity: self.capacity(),
            });
        }

        let new_len = self.len + n;
        if new_len >= HEADER_SIZE {
            let declared = (&self.buf[2..HEADER_SIZE]).get_u16_ne() as usize;
            let max = self.capacity() - HEADER_SIZE;
            if declared > max {
                debug!(declared, max, "PDU header declares oversized payload");
                return Err(PduError::PayloadTooLarge {
                    size: declared,
                    max,
                });
            }
        }

        self.len = new_len;
        Ok(())
    }

    /// Perform one read of at most [`wanted`](Self::wanted) bytes.
    ///
    /// Never reads past the current PDU, so the next one stays in the
    /// transport. Would-block and interrupted reads return `Ok(0)`. End of
    /// stream is [`PduError::ConnectionClosed`]. Descriptors passed by the
    /// peer are kept until [`take_fds`](Self::take_fds).
    pub fn recv_from<T: PduTransport + ?Sized>(&mut self, transport: &mut T) -> Result<usize> {
        let wanted = self.wanted();
        if wanted == 0 {
            return Ok(0);
        }

        let window = self.len..self.len + wanted;
        match transport.recv_pdu(&mut self.buf[window], &mut self.fds) {
            Ok(0) => {
                debug!(received = self.len, "connection closed");
                Err(PduError::ConnectionClosed)
            }
            Ok(n) => {
                self.advance(n)?;
                trace!(n, received = self.len, "received PDU bytes");
                Ok(n)
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(err) => Err(PduError::Transport(err)),
        }
    }

    /// The received PDU, once complete.
    pub fn pdu(&self) -> Option<PduRef<'_>> {
        self.has_complete_pdu()
            .then(|| PduRef::from_storage(&self.buf[..self.len]))
    }

    /// Descriptors received alongside the PDU bytes.
    pub fn take_fds(&mut self) -> Vec<OwnedFd> {
        std::mem::take(&mut self.fds)
    }

    /// Forget the received bytes so the buffer can take the next PDU.
    ///
    /// Descriptors not yet taken are closed.
    pub fn clear(&mut self) {
        self.len = 0;
        self.fds.clear();
    }
}

impl std::fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("fds", &self.fds.len())
            .finish()
    }
}
