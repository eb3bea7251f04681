use std::collections::VecDeque;

use pdubuf_transport::PduTransport;
use tracing::trace;

use crate::error::Result;
use crate::wbuf::SendBuffer;

/// FIFO of send buffers bound for one transport.
///
/// Buffers go out strictly in push order; a buffer is dropped once all of
/// its bytes were transmitted.
#[derive(Debug, Default)]
pub struct SendQueue {
    pending: VecDeque<SendBuffer>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, wbuf: SendBuffer) {
        self.pending.push_back(wbuf);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn front(&self) -> Option<&SendBuffer> {
        self.pending.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut SendBuffer> {
        self.pending.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<SendBuffer> {
        self.pending.pop_front()
    }

    /// Send as much as the transport takes without blocking.
    ///
    /// Stops at the first attempt that leaves its buffer unfinished. On
    /// error the failing buffer stays at the front. Returns the bytes
    /// written by this call.
    pub fn flush<T: PduTransport + ?Sized>(&mut self, transport: &mut T) -> Result<usize> {
        let mut written = 0;
        while let Some(front) = self.pending.front_mut() {
            if !front.is_consumed() {
                written += front.send(transport)?;
                if !front.is_consumed() {
                    break;
                }
            }
            self.pending.pop_front();
        }
        trace!(written, pending = self.pending.len(), "flushed send queue");
        Ok(written)
    }
}
