use bytes::{Buf, BufMut};
use tracing::warn;

use crate::error::{PduError, Result};

/// PDU header: service (1) + opcode (1) + payload length (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Default maximum payload for buffers built from [`PduConfig::default`].
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_PAYLOAD;

/// Sizing for receive and send buffers.
#[derive(Debug, Clone)]
pub struct PduConfig {
    /// Maximum payload bytes, header excluded. At most [`MAX_PAYLOAD`].
    pub max_payload_len: usize,
    /// Bytes reserved after the PDU in send buffers for ancillary data.
    pub tail_len: usize,
}

impl Default for PduConfig {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD,
            tail_len: 0,
        }
    }
}

fn declared_len(raw: &[u8]) -> u16 {
    (&raw[2..HEADER_SIZE]).get_u16_ne()
}

/// A read-only view of a PDU laid out in memory.
///
/// ```text
/// ┌──────────┬──────────┬──────────────┬─────────────────┐
/// │ Service  │ Opcode   │ Length       │ Payload         │
/// │ (1B)     │ (1B)     │ (2B, host)   │ (Length bytes)  │
/// └──────────┴──────────┴──────────────┴─────────────────┘
/// ```
#[derive(Clone, Copy)]
pub struct PduRef<'a> {
    raw: &'a [u8],
}

impl<'a> PduRef<'a> {
    /// View a complete PDU at the start of `raw`.
    ///
    /// Bytes past the declared payload are ignored.
    pub fn from_bytes(raw: &'a [u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(PduError::Truncated {
                needed: HEADER_SIZE,
                available: raw.len(),
            });
        }
        let needed = HEADER_SIZE + declared_len(raw) as usize;
        if raw.len() < needed {
            return Err(PduError::Truncated {
                needed,
                available: raw.len(),
            });
        }
        Ok(Self::from_storage(raw))
    }

    /// Callers guarantee a header and the declared payload are present.
    pub(crate) fn from_storage(raw: &'a [u8]) -> Self {
        debug_assert!(raw.len() >= HEADER_SIZE + declared_len(raw) as usize);
        Self { raw }
    }

    pub fn service(&self) -> u8 {
        self.raw[0]
    }

    pub fn opcode(&self) -> u8 {
        self.raw[1]
    }

    /// Number of valid payload bytes.
    pub fn len(&self) -> u16 {
        declared_len(self.raw)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total wire size: header plus payload.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.len() as usize
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &'a [u8] {
        &self.raw[HEADER_SIZE..self.size()]
    }

    /// Header and payload exactly as they go on the wire.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.raw[..self.size()]
    }
}

impl std::fmt::Debug for PduRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PduRef")
            .field("service", &self.service())
            .field("opcode", &self.opcode())
            .field("len", &self.len())
            .finish()
    }
}

/// A mutable view of a PDU over a fixed block of memory.
///
/// The block holds the header plus the payload capacity. The declared
/// length never exceeds that capacity.
pub struct PduMut<'a> {
    raw: &'a mut [u8],
}

impl<'a> PduMut<'a> {
    /// View `raw` as a PDU whose payload may grow to `raw.len() - 4` bytes.
    ///
    /// The existing header is kept; call [`PduMut::init`] to start fresh.
    pub fn from_bytes(raw: &'a mut [u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(PduError::Truncated {
                needed: HEADER_SIZE,
                available: raw.len(),
            });
        }
        let needed = HEADER_SIZE + declared_len(raw) as usize;
        if raw.len() < needed {
            return Err(PduError::Truncated {
                needed,
                available: raw.len(),
            });
        }
        Ok(Self { raw })
    }

    pub(crate) fn from_storage(raw: &'a mut [u8]) -> Self {
        debug_assert!(raw.len() >= HEADER_SIZE + declared_len(raw) as usize);
        Self { raw }
    }

    /// Set service and opcode and empty the payload.
    pub fn init(&mut self, service: u8, opcode: u8) {
        self.raw[0] = service;
        self.raw[1] = opcode;
        self.write_len(0);
    }

    pub fn service(&self) -> u8 {
        self.raw[0]
    }

    pub fn opcode(&self) -> u8 {
        self.raw[1]
    }

    pub fn set_service(&mut self, service: u8) {
        self.raw[0] = service;
    }

    pub fn set_opcode(&mut self, opcode: u8) {
        self.raw[1] = opcode;
    }

    pub fn len(&self) -> u16 {
        declared_len(self.raw)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size(&self) -> usize {
        HEADER_SIZE + self.len() as usize
    }

    /// Payload bytes this block can hold.
    pub fn capacity(&self) -> usize {
        (self.raw.len() - HEADER_SIZE).min(MAX_PAYLOAD)
    }

    /// Set the number of valid payload bytes.
    pub fn set_len(&mut self, len: u16) -> Result<()> {
        if len as usize > self.capacity() {
            return Err(PduError::PayloadTooLarge {
                size: len as usize,
                max: self.capacity(),
            });
        }
        self.write_len(len);
        Ok(())
    }

    pub fn payload(&self) -> &[u8] {
        &self.raw[HEADER_SIZE..self.size()]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let end = self.size();
        &mut self.raw[HEADER_SIZE..end]
    }

    /// Reborrow as a read-only view.
    pub fn view(&self) -> PduRef<'_> {
        PduRef::from_storage(self.raw)
    }

    /// The full payload area, valid bytes and spare capacity alike.
    pub(crate) fn payload_area_mut(&mut self) -> &mut [u8] {
        let end = HEADER_SIZE + self.capacity();
        &mut self.raw[HEADER_SIZE..end]
    }

    fn write_len(&mut self, len: u16) {
        (&mut self.raw[2..HEADER_SIZE]).put_u16_ne(len);
    }
}

impl std::fmt::Debug for PduMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.view(), f)
    }
}

/// Allocate a zero-filled block, reporting exhaustion instead of aborting.
pub(crate) fn alloc_zeroed(len: usize) -> Result<Box<[u8]>> {
    let mut block = Vec::new();
    block.try_reserve_exact(len).map_err(|err| {
        warn!(len, "buffer allocation failed");
        PduError::Alloc(err)
    })?;
    block.resize(len, 0);
    Ok(block.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_sets_header_and_empties_payload() {
        let mut block = [0xFFu8; 8];
        block[2..4].copy_from_slice(&0u16.to_ne_bytes());
        let mut pdu = PduMut::from_bytes(&mut block).unwrap();
        pdu.init(1, 2);

        assert_eq!(pdu.service(), 1);
        assert_eq!(pdu.opcode(), 2);
        assert_eq!(pdu.len(), 0);
        assert_eq!(pdu.size(), HEADER_SIZE);
        assert_eq!(pdu.capacity(), 4);
    }

    #[test]
    fn length_field_is_host_endian() {
        let mut block = [0u8; 16];
        let mut pdu = PduMut::from_bytes(&mut block).unwrap();
        pdu.init(7, 9);
        pdu.set_len(3).unwrap();
        assert_eq!(&block[..4], &[7, 9, 3u16.to_ne_bytes()[0], 3u16.to_ne_bytes()[1]]);
    }

    #[test]
    fn set_len_respects_capacity() {
        let mut block = [0u8; 6];
        let mut pdu = PduMut::from_bytes(&mut block).unwrap();
        assert!(pdu.set_len(2).is_ok());
        assert!(matches!(
            pdu.set_len(3),
            Err(PduError::PayloadTooLarge { size: 3, max: 2 })
        ));
        assert_eq!(pdu.len(), 2);
    }

    #[test]
    fn pdu_ref_rejects_short_blocks() {
        assert!(matches!(
            PduRef::from_bytes(&[1, 2]),
            Err(PduError::Truncated { needed: 4, .. })
        ));

        let mut raw = vec![1, 2];
        raw.extend_from_slice(&5u16.to_ne_bytes());
        raw.extend_from_slice(b"abc");
        assert!(matches!(
            PduRef::from_bytes(&raw),
            Err(PduError::Truncated {
                needed: 9,
                available: 7
            })
        ));
    }

    #[test]
    fn pdu_ref_exposes_payload_and_wire_bytes() {
        let mut raw = vec![3, 4];
        raw.extend_from_slice(&2u16.to_ne_bytes());
        raw.extend_from_slice(b"hi-trailing");

        let pdu = PduRef::from_bytes(&raw).unwrap();
        assert_eq!(pdu.service(), 3);
        assert_eq!(pdu.opcode(), 4);
        assert_eq!(pdu.payload(), b"hi");
        assert_eq!(pdu.as_bytes().len(), 6);
        assert_eq!(pdu.size(), 6);
    }

    #[test]
    fn capacity_is_capped_by_length_field() {
        let mut block = vec![0u8; HEADER_SIZE + MAX_PAYLOAD + 10];
        let pdu = PduMut::from_bytes(&mut block).unwrap();
        assert_eq!(pdu.capacity(), MAX_PAYLOAD);
    }

    #[test]
    fn zeroed_allocation() {
        let block = alloc_zeroed(32).unwrap();
        assert_eq!(block.len(), 32);
        assert!(block.iter().all(|&b| b == 0));
    }
}
