use std::io::ErrorKind;
use std::os::fd::RawFd;

use bytes::{Buf, BufMut};
use pdubuf_transport::{AncillaryData, PduTransport};
use tracing::{debug, trace};

use crate::error::{PduError, Result};
use crate::pdu::{alloc_zeroed, PduConfig, PduMut, PduRef, HEADER_SIZE, MAX_PAYLOAD};

/// Produces the ancillary data that accompanies a send buffer's PDU.
///
/// Invoked once, on the buffer's first send attempt, with the composed PDU
/// and the buffer's tail region.
pub trait AncillaryBuilder {
    fn build(&mut self, pdu: PduRef<'_>, tail: &[u8]) -> Result<AncillaryData>;
}

impl<F> AncillaryBuilder for F
where
    F: FnMut(PduRef<'_>, &[u8]) -> Result<AncillaryData>,
{
    fn build(&mut self, pdu: PduRef<'_>, tail: &[u8]) -> Result<AncillaryData> {
        self(pdu, tail)
    }
}

/// Passes file descriptors stored in the tail region.
///
/// Tail layout, host byte order: a `u32` count followed by that many
/// descriptors as `i32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FdTail;

impl FdTail {
    /// Tail bytes needed to hold up to `max_fds` descriptors.
    pub const fn tail_len(max_fds: usize) -> usize {
        4 + max_fds * std::mem::size_of::<RawFd>()
    }

    /// Store `fds` in `tail`.
    pub fn store(tail: &mut [u8], fds: &[RawFd]) -> Result<()> {
        let needed = Self::tail_len(fds.len());
        if needed > tail.len() {
            return Err(PduError::Capacity {
                offset: 0,
                width: needed,
                capacity: tail.len(),
            });
        }
        let mut dst = tail;
        dst.put_u32_ne(fds.len() as u32);
        for &fd in fds {
            dst.put_i32_ne(fd);
        }
        Ok(())
    }
}

impl AncillaryBuilder for FdTail {
    fn build(&mut self, _pdu: PduRef<'_>, tail: &[u8]) -> Result<AncillaryData> {
        let mut src = tail;
        if src.remaining() < 4 {
            return Ok(AncillaryData::default());
        }
        let count = src.get_u32_ne() as usize;
        let needed = count.saturating_mul(std::mem::size_of::<RawFd>());
        if src.remaining() < needed {
            return Err(PduError::Truncated {
                needed: 4 + needed,
                available: tail.len(),
            });
        }
        let fds = (0..count).map(|_| src.get_i32_ne()).collect::<Vec<_>>();
        Ok(AncillaryData { fds })
    }
}

/// Where a send buffer is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// No byte sent yet. The PDU may be edited until the first attempt.
    Composing,
    /// Some bytes went out, some remain.
    Sending,
    /// Every PDU byte was transmitted.
    Consumed,
}

/// Holds one outgoing PDU and tracks how much of it has been sent.
///
/// Memory layout: header, payload capacity, then `tail_len` bytes of tail
/// for ancillary-data construction. Only header and valid payload go on
/// the wire; the tail reaches the peer only through whatever the
/// [`AncillaryBuilder`] makes of it.
pub struct SendBuffer {
    buf: Box<[u8]>,
    tail_off: usize,
    sent: usize,
    built: bool,
    build_failed: bool,
    builder: Option<Box<dyn AncillaryBuilder + Send>>,
    ancillary: Option<AncillaryData>,
}

impl SendBuffer {
    /// Create a buffer for up to `max_payload_len` payload bytes plus a
    /// `tail_len`-byte tail, without an ancillary builder.
    pub fn new(max_payload_len: usize, tail_len: usize) -> Result<Self> {
        if max_payload_len > MAX_PAYLOAD {
            return Err(PduError::PayloadTooLarge {
                size: max_payload_len,
                max: MAX_PAYLOAD,
            });
        }
        let tail_off = HEADER_SIZE + max_payload_len;
        let total = tail_off
            .checked_add(tail_len)
            .ok_or(PduError::PayloadTooLarge {
                size: tail_len,
                max: usize::MAX - tail_off,
            })?;
        Ok(Self {
            buf: alloc_zeroed(total)?,
            tail_off,
            sent: 0,
            built: false,
            build_failed: false,
            builder: None,
            ancillary: None,
        })
    }

    /// Like [`new`](Self::new), with `builder` invoked on the first send.
    pub fn with_builder(
        max_payload_len: usize,
        tail_len: usize,
        builder: impl AncillaryBuilder + Send + 'static,
    ) -> Result<Self> {
        let mut wbuf = Self::new(max_payload_len, tail_len)?;
        wbuf.builder = Some(Box::new(builder));
        Ok(wbuf)
    }

    /// Create a buffer sized by `config`.
    pub fn with_config(config: &PduConfig) -> Result<Self> {
        Self::new(config.max_payload_len, config.tail_len)
    }

    /// The PDU being composed.
    ///
    /// Must not be changed once sending started; the send cursor is
    /// relative to the bytes as they were on the first attempt.
    pub fn pdu_mut(&mut self) -> PduMut<'_> {
        debug_assert!(!self.built, "PDU modified after sending started");
        PduMut::from_storage(&mut self.buf[..self.tail_off])
    }

    pub fn pdu(&self) -> PduRef<'_> {
        PduRef::from_storage(&self.buf[..self.tail_off])
    }

    pub fn tail(&self) -> &[u8] {
        &self.buf[self.tail_off..]
    }

    pub fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.tail_off..]
    }

    /// Bytes transmitted so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Wire size of the PDU: header plus valid payload.
    pub fn total(&self) -> usize {
        self.pdu().size()
    }

    pub fn remaining(&self) -> usize {
        self.total().saturating_sub(self.sent)
    }

    pub fn is_consumed(&self) -> bool {
        self.sent >= self.total()
    }

    pub fn state(&self) -> SendState {
        if self.is_consumed() {
            SendState::Consumed
        } else if self.sent > 0 {
            SendState::Sending
        } else {
            SendState::Composing
        }
    }

    /// Make one non-blocking attempt to transmit the unsent bytes.
    ///
    /// The first call runs the ancillary builder, if any. Its result rides
    /// on every attempt until a byte goes out, then is dropped. Returns the
    /// number of bytes transferred, 0 when the transport would block. A
    /// failing transport leaves the buffer unchanged.
    ///
    /// The builder runs at most once. If it fails, its error is returned
    /// and every later call fails with [`PduError::AncillaryUnavailable`]
    /// without touching the transport.
    pub fn send<T: PduTransport + ?Sized>(&mut self, transport: &mut T) -> Result<usize> {
        debug_assert!(!self.is_consumed(), "send on a consumed buffer");
        if self.is_consumed() {
            return Ok(0);
        }

        if !self.built {
            self.built = true;
            if let Some(builder) = self.builder.as_mut() {
                let (head, tail) = self.buf.split_at(self.tail_off);
                match builder.build(PduRef::from_storage(head), tail) {
                    Ok(ancillary) => {
                        trace!(fds = ancillary.fds.len(), "built ancillary data");
                        self.ancillary = (!ancillary.is_empty()).then_some(ancillary);
                    }
                    Err(err) => {
                        debug!(error = %err, "ancillary builder failed");
                        self.build_failed = true;
                        return Err(err);
                    }
                }
            }
        } else if self.build_failed {
            return Err(PduError::AncillaryUnavailable);
        }

        let total = self.total();
        match transport.send_pdu(&self.buf[self.sent..total], self.ancillary.as_ref()) {
            Ok(n) => {
                if n > 0 {
                    self.sent = (self.sent + n).min(total);
                    self.ancillary = None;
                }
                trace!(n, sent = self.sent, total, "sent PDU bytes");
                Ok(n)
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                trace!(sent = self.sent, total, "send would block");
                Ok(0)
            }
            Err(err) => {
                debug!(error = %err, sent = self.sent, "PDU send failed");
                Err(PduError::Transport(err))
            }
        }
    }
}

impl std::fmt::Debug for SendBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendBuffer")
            .field("pdu", &self.pdu())
            .field("tail_len", &self.tail().len())
            .field("sent", &self.sent)
            .field("state", &self.state())
            .field("builder", &self.builder.is_some())
            .finish()
    }
}
