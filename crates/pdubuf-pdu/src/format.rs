//! Descriptor-driven marshalling of typed fields into a PDU payload.
//!
//! A descriptor is a string with one character per field:
//!
//! | tag | field                                   | width            |
//! |-----|-----------------------------------------|------------------|
//! | `c` / `C` | `i8` / `u8`                       | 1                |
//! | `s` / `S` | `i16` / `u16`                     | 2                |
//! | `i` / `I` | `i32` / `u32`                     | 4                |
//! | `l` / `L` | `i64` / `u64`                     | 8                |
//! | `m`       | raw bytes into a caller buffer    | caller-supplied  |
//! | `M`       | raw bytes into a new `Vec<u8>`    | caller-supplied  |
//! | `0`       | NUL-terminated bytes              | up to the NUL    |
//!
//! Integers use host byte order. Encoding takes one [`Arg`] per tag,
//! decoding one [`Slot`] per tag.
//!
//! Decoding is all-or-nothing: every field is checked and every allocation
//! made before any slot is written, so a failed call leaves all slots as
//! they were and frees whatever it allocated.
//!
//! ```
//! use pdubuf_pdu::{append, read_at, PduMut, Slot};
//!
//! let mut block = [0u8; 32];
//! let mut pdu = PduMut::from_bytes(&mut block).unwrap();
//! pdu.init(1, 2);
//! append(&mut pdu, "CI", &[5u8.into(), 1000u32.into()]).unwrap();
//! assert_eq!(pdu.len(), 5);
//!
//! let (mut small, mut big) = (0u8, 0u32);
//! let end = read_at(&pdu.view(), 0, "CI", &mut [Slot::from(&mut small), Slot::from(&mut big)]).unwrap();
//! assert_eq!((small, big, end), (5, 1000, 5));
//! ```

use std::ffi::{CStr, CString};
use std::ops::Range;

use bytes::{Buf, BufMut};
use tracing::{debug, warn};

use crate::error::{FormatError, PduError, Result};
use crate::pdu::{PduMut, PduRef, MAX_PAYLOAD};

/// One field type of a format descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// `m`: raw bytes, caller-owned buffer.
    Mem,
    /// `M`: raw bytes, buffer allocated on decode.
    MemAlloc,
    /// `0`: NUL-terminated bytes, allocated on decode.
    CStr,
}

impl Tag {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'c' => Tag::I8,
            'C' => Tag::U8,
            's' => Tag::I16,
            'S' => Tag::U16,
            'i' => Tag::I32,
            'I' => Tag::U32,
            'l' => Tag::I64,
            'L' => Tag::U64,
            'm' => Tag::Mem,
            'M' => Tag::MemAlloc,
            '0' => Tag::CStr,
            _ => return None,
        })
    }

    pub fn as_char(self) -> char {
        match self {
            Tag::I8 => 'c',
            Tag::U8 => 'C',
            Tag::I16 => 's',
            Tag::U16 => 'S',
            Tag::I32 => 'i',
            Tag::U32 => 'I',
            Tag::I64 => 'l',
            Tag::U64 => 'L',
            Tag::Mem => 'm',
            Tag::MemAlloc => 'M',
            Tag::CStr => '0',
        }
    }

    /// Parse a whole descriptor.
    pub fn parse_all(fmt: &str) -> Result<Vec<Self>> {
        fmt.chars()
            .map(|c| {
                Tag::from_char(c).ok_or_else(|| {
                    debug!(tag = ?c, "invalid format character");
                    PduError::Format(FormatError::UnknownTag(c))
                })
            })
            .collect()
    }

    /// Width of integer fields; `None` for variable-length ones.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Tag::I8 | Tag::U8 => Some(1),
            Tag::I16 | Tag::U16 => Some(2),
            Tag::I32 | Tag::U32 => Some(4),
            Tag::I64 | Tag::U64 => Some(8),
            Tag::Mem | Tag::MemAlloc | Tag::CStr => None,
        }
    }
}

/// An encode input.
///
/// Integers of any width convert into [`Arg::Int`] and are narrowed to the
/// tagged width when written. Byte slices serve `m`, `M` and `0`; for `0`
/// the slice must contain a NUL, and everything up to and including the
/// first one is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    Int(i128),
    Bytes(&'a [u8]),
}

macro_rules! arg_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg<'_> {
            fn from(v: $t) -> Self {
                Arg::Int(v as i128)
            }
        })*
    };
}

arg_from_int!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(v: &'a [u8]) -> Self {
        Arg::Bytes(v)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Arg<'a> {
    fn from(v: &'a [u8; N]) -> Self {
        Arg::Bytes(v)
    }
}

impl<'a> From<&'a CStr> for Arg<'a> {
    fn from(v: &'a CStr) -> Self {
        Arg::Bytes(v.to_bytes_with_nul())
    }
}

/// A decode destination.
#[derive(Debug)]
pub enum Slot<'a> {
    I8(&'a mut i8),
    U8(&'a mut u8),
    I16(&'a mut i16),
    U16(&'a mut u16),
    I32(&'a mut i32),
    U32(&'a mut u32),
    I64(&'a mut i64),
    U64(&'a mut u64),
    /// `m`: fill the caller's buffer; its length is the field width.
    Mem(&'a mut [u8]),
    /// `M`: allocate `len` bytes and store them in `out`.
    Alloc { len: usize, out: &'a mut Vec<u8> },
    /// `0`: allocate the string, terminator included.
    CStr(&'a mut Option<CString>),
}

impl<'a> Slot<'a> {
    /// Slot for an `M` field of `len` bytes.
    pub fn alloc(len: usize, out: &'a mut Vec<u8>) -> Self {
        Slot::Alloc { len, out }
    }

    fn tag(&self) -> Tag {
        match self {
            Slot::I8(_) => Tag::I8,
            Slot::U8(_) => Tag::U8,
            Slot::I16(_) => Tag::I16,
            Slot::U16(_) => Tag::U16,
            Slot::I32(_) => Tag::I32,
            Slot::U32(_) => Tag::U32,
            Slot::I64(_) => Tag::I64,
            Slot::U64(_) => Tag::U64,
            Slot::Mem(_) => Tag::Mem,
            Slot::Alloc { .. } => Tag::MemAlloc,
            Slot::CStr(_) => Tag::CStr,
        }
    }
}

macro_rules! slot_from_int {
    ($($t:ty => $variant:ident),*) => {
        $(impl<'a> From<&'a mut $t> for Slot<'a> {
            fn from(v: &'a mut $t) -> Self {
                Slot::$variant(v)
            }
        })*
    };
}

slot_from_int!(i8 => I8, u8 => U8, i16 => I16, u16 => U16, i32 => I32, u32 => U32, i64 => I64, u64 => U64);

impl<'a> From<&'a mut [u8]> for Slot<'a> {
    fn from(v: &'a mut [u8]) -> Self {
        Slot::Mem(v)
    }
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for Slot<'a> {
    fn from(v: &'a mut [u8; N]) -> Self {
        Slot::Mem(v)
    }
}

impl<'a> From<&'a mut Option<CString>> for Slot<'a> {
    fn from(v: &'a mut Option<CString>) -> Self {
        Slot::CStr(v)
    }
}

/// A decoded field waiting to be written to its slot.
enum Staged {
    Copy(Range<usize>),
    Owned(Vec<u8>),
    Str(CString),
}

fn check_count(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(FormatError::Count { expected, got }.into());
    }
    Ok(())
}

fn alloc_copy(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes.len()).map_err(|err| {
        warn!(len = bytes.len(), "field allocation failed");
        PduError::Alloc(err)
    })?;
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Decode the fields named by `fmt` from `pdu`'s payload, starting at
/// `offset`, into `slots`.
///
/// Returns the offset just past the last field.
pub fn read_at(pdu: &PduRef<'_>, offset: usize, fmt: &str, slots: &mut [Slot<'_>]) -> Result<usize> {
    let tags = Tag::parse_all(fmt)?;
    check_count(tags.len(), slots.len())?;

    let payload = pdu.payload();
    let mut staged = Vec::with_capacity(tags.len());
    let mut off = offset;

    for (index, (&tag, slot)) in tags.iter().zip(slots.iter()).enumerate() {
        if slot.tag() != tag {
            return Err(FormatError::Mismatch {
                index,
                tag: tag.as_char(),
            }
            .into());
        }

        let width = match slot {
            Slot::Mem(buf) => buf.len(),
            Slot::Alloc { len, .. } => *len,
            Slot::CStr(_) => {
                let rest = payload.get(off..).unwrap_or_default();
                match rest.iter().position(|&b| b == 0) {
                    Some(nul) => nul + 1,
                    None => {
                        debug!(offset = off, "string not terminated");
                        return Err(FormatError::Unterminated { offset: off }.into());
                    }
                }
            }
            _ => tag.fixed_width().unwrap_or_default(),
        };

        let end = match off.checked_add(width) {
            Some(end) if end <= payload.len() => end,
            _ => {
                debug!(offset = off, width, len = payload.len(), "PDU overflow");
                return Err(PduError::Overflow {
                    offset: off,
                    width,
                    len: payload.len(),
                });
            }
        };

        staged.push(match tag {
            Tag::MemAlloc => Staged::Owned(alloc_copy(&payload[off..end])?),
            Tag::CStr => {
                let bytes = alloc_copy(&payload[off..end])?;
                let s = CString::from_vec_with_nul(bytes)
                    .map_err(|_| FormatError::Unterminated { offset: off })?;
                Staged::Str(s)
            }
            _ => Staged::Copy(off..end),
        });
        off = end;
    }

    for (slot, field) in slots.iter_mut().zip(staged) {
        match (slot, field) {
            (Slot::Alloc { out, .. }, Staged::Owned(bytes)) => **out = bytes,
            (Slot::CStr(out), Staged::Str(s)) => **out = Some(s),
            (slot, Staged::Copy(range)) => {
                let mut src = &payload[range];
                match slot {
                    Slot::I8(v) => **v = src.get_i8(),
                    Slot::U8(v) => **v = src.get_u8(),
                    Slot::I16(v) => **v = src.get_i16_ne(),
                    Slot::U16(v) => **v = src.get_u16_ne(),
                    Slot::I32(v) => **v = src.get_i32_ne(),
                    Slot::U32(v) => **v = src.get_u32_ne(),
                    Slot::I64(v) => **v = src.get_i64_ne(),
                    Slot::U64(v) => **v = src.get_u64_ne(),
                    Slot::Mem(buf) => buf.copy_from_slice(src),
                    Slot::Alloc { .. } | Slot::CStr(_) => {}
                }
            }
            _ => {}
        }
    }

    Ok(off)
}

/// Encode `args` as the fields named by `fmt` into `pdu`'s payload at
/// `offset`.
///
/// Does not change the PDU's length; see [`append`]. Fails with
/// [`PduError::Capacity`] rather than write past the payload capacity.
/// Fields before a failing one may already have been written.
pub fn write_at(pdu: &mut PduMut<'_>, offset: usize, fmt: &str, args: &[Arg<'_>]) -> Result<usize> {
    let tags = Tag::parse_all(fmt)?;
    check_count(tags.len(), args.len())?;

    let area = pdu.payload_area_mut();
    let capacity = area.len();
    let mut off = offset;

    for (index, (&tag, arg)) in tags.iter().zip(args).enumerate() {
        let mismatch = || -> PduError {
            FormatError::Mismatch {
                index,
                tag: tag.as_char(),
            }
            .into()
        };

        let src: Option<&[u8]> = match (tag, *arg) {
            (Tag::Mem | Tag::MemAlloc, Arg::Bytes(bytes)) => Some(bytes),
            (Tag::CStr, Arg::Bytes(bytes)) => match bytes.iter().position(|&b| b == 0) {
                Some(nul) => Some(&bytes[..=nul]),
                None => {
                    debug!(index, "string argument not terminated");
                    return Err(FormatError::Unterminated { offset: off }.into());
                }
            },
            (_, Arg::Int(_)) if tag.fixed_width().is_some() => None,
            _ => return Err(mismatch()),
        };

        let width = src.map_or_else(|| tag.fixed_width().unwrap_or_default(), <[u8]>::len);
        let end = match off.checked_add(width) {
            Some(end) if end <= capacity => end,
            _ => {
                debug!(offset = off, width, capacity, "PDU capacity exceeded");
                return Err(PduError::Capacity {
                    offset: off,
                    width,
                    capacity,
                });
            }
        };

        let mut dst = &mut area[off..end];
        match (src, *arg) {
            (Some(bytes), _) => dst.copy_from_slice(bytes),
            (None, Arg::Int(v)) => match tag {
                Tag::I8 => dst.put_i8(v as i8),
                Tag::U8 => dst.put_u8(v as u8),
                Tag::I16 => dst.put_i16_ne(v as i16),
                Tag::U16 => dst.put_u16_ne(v as u16),
                Tag::I32 => dst.put_i32_ne(v as i32),
                Tag::U32 => dst.put_u32_ne(v as u32),
                Tag::I64 => dst.put_i64_ne(v as i64),
                Tag::U64 => dst.put_u64_ne(v as u64),
                Tag::Mem | Tag::MemAlloc | Tag::CStr => return Err(mismatch()),
            },
            (None, Arg::Bytes(_)) => return Err(mismatch()),
        }
        off = end;
    }

    Ok(off)
}

/// Encode `args` after the current payload and grow the PDU's length to
/// cover them.
///
/// The length only changes when every field was written.
pub fn append(pdu: &mut PduMut<'_>, fmt: &str, args: &[Arg<'_>]) -> Result<usize> {
    let start = pdu.len() as usize;
    let end = write_at(pdu, start, fmt, args)?;
    let len = u16::try_from(end).map_err(|_| PduError::Capacity {
        offset: start,
        width: end - start,
        capacity: MAX_PAYLOAD,
    })?;
    pdu.set_len(len)?;
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::HEADER_SIZE;

    fn block(payload_cap: usize) -> Vec<u8> {
        vec![0u8; HEADER_SIZE + payload_cap]
    }

    fn wire_with(payload: &[u8]) -> Vec<u8> {
        let mut raw = block(payload.len());
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        append(&mut pdu, "m", &[Arg::Bytes(payload)]).unwrap();
        raw
    }

    #[test]
    fn scenario_append_and_read_back() {
        let mut raw = block(64);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(1, 2);

        let end = append(&mut pdu, "CI", &[5.into(), 1000.into()]).unwrap();
        assert_eq!(end, 5);
        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.size(), 9);

        let (mut c, mut i) = (0u8, 0u32);
        let off = read_at(&pdu.view(), 0, "CI", &mut [(&mut c).into(), (&mut i).into()]).unwrap();
        assert_eq!((c, i, off), (5, 1000, 5));
        assert_eq!(pdu.service(), 1);
        assert_eq!(pdu.opcode(), 2);
    }

    macro_rules! roundtrip_edges {
        ($name:ident, $t:ty, $fmt:literal) => {
            #[test]
            fn $name() {
                let values = [<$t>::MIN, <$t>::MIN + 1, 0 as $t, 1 as $t, <$t>::MAX - 1, <$t>::MAX];
                let mut raw = block(16);
                for value in values {
                    let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
                    pdu.init(0, 0);
                    let end = append(&mut pdu, $fmt, &[value.into()]).unwrap();
                    assert_eq!(end, std::mem::size_of::<$t>());

                    let mut out: $t = Default::default();
                    read_at(&pdu.view(), 0, $fmt, &mut [(&mut out).into()]).unwrap();
                    assert_eq!(out, value);
                }
            }
        };
    }

    roundtrip_edges!(roundtrip_i8, i8, "c");
    roundtrip_edges!(roundtrip_u8, u8, "C");
    roundtrip_edges!(roundtrip_i16, i16, "s");
    roundtrip_edges!(roundtrip_u16, u16, "S");
    roundtrip_edges!(roundtrip_i32, i32, "i");
    roundtrip_edges!(roundtrip_u32, u32, "I");
    roundtrip_edges!(roundtrip_i64, i64, "l");
    roundtrip_edges!(roundtrip_u64, u64, "L");

    #[test]
    fn integers_narrow_to_tag_width() {
        let mut raw = block(8);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        append(&mut pdu, "Cs", &[0x1FFu32.into(), (-1i64).into()]).unwrap();

        let (mut c, mut s) = (0u8, 0i16);
        read_at(&pdu.view(), 0, "Cs", &mut [(&mut c).into(), (&mut s).into()]).unwrap();
        assert_eq!(c, 0xFF);
        assert_eq!(s, -1);
    }

    #[test]
    fn signed_and_unsigned_share_bits() {
        let mut raw = block(8);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        append(&mut pdu, "i", &[(-2i32).into()]).unwrap();

        let mut u = 0u32;
        read_at(&pdu.view(), 0, "I", &mut [(&mut u).into()]).unwrap();
        assert_eq!(u, 0xFFFF_FFFE);
    }

    #[test]
    fn append_accumulates_widths() {
        let mut raw = block(64);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(3, 4);

        assert_eq!(append(&mut pdu, "C", &[7.into()]).unwrap(), 1);
        assert_eq!(pdu.len(), 1);
        assert_eq!(append(&mut pdu, "I", &[42.into()]).unwrap(), 5);
        assert_eq!(pdu.len(), 5);
        assert_eq!(append(&mut pdu, "0", &[b"hello\0".into()]).unwrap(), 11);
        assert_eq!(pdu.len(), 11);

        let (mut c, mut i, mut s) = (0u8, 0u32, None);
        let end = read_at(
            &pdu.view(),
            0,
            "CI0",
            &mut [(&mut c).into(), (&mut i).into(), (&mut s).into()],
        )
        .unwrap();
        assert_eq!(end, 11);
        assert_eq!((c, i), (7, 42));
        assert_eq!(s.unwrap().as_bytes(), b"hello");
    }

    #[test]
    fn overflow_detected_without_touching_destination() {
        for len in 0..8usize {
            let wire = wire_with(&vec![0xAB; len]);
            let pdu = PduRef::from_bytes(&wire).unwrap();
            for offset in 0..10usize {
                if offset + 4 <= len {
                    continue;
                }
                let mut out = 0x1234_5678u32;
                let err = read_at(&pdu, offset, "I", &mut [(&mut out).into()]).unwrap_err();
                assert!(matches!(err, PduError::Overflow { .. }), "len={len} offset={offset}");
                assert_eq!(out, 0x1234_5678);
            }
        }
    }

    #[test]
    fn failed_decode_leaves_earlier_slots_untouched() {
        let wire = wire_with(&[1, 2, 3, 4, 5]);
        let pdu = PduRef::from_bytes(&wire).unwrap();

        let (mut a, mut b, mut owned) = (0u8, 0u64, vec![9u8]);
        let err = read_at(
            &pdu,
            0,
            "CML",
            &mut [(&mut a).into(), Slot::alloc(2, &mut owned), (&mut b).into()],
        )
        .unwrap_err();
        assert!(matches!(err, PduError::Overflow { offset: 3, width: 8, len: 5 }));
        assert_eq!(a, 0);
        assert_eq!(owned, vec![9u8]);
        assert_eq!(b, 0);
    }

    #[test]
    fn terminator_scan() {
        let wire = wire_with(b"ab\0cd");
        let pdu = PduRef::from_bytes(&wire).unwrap();

        let mut s = None;
        assert_eq!(read_at(&pdu, 0, "0", &mut [(&mut s).into()]).unwrap(), 3);
        assert_eq!(s.as_ref().unwrap().as_bytes_with_nul().len(), 3);

        let mut s = None;
        let err = read_at(&pdu, 3, "0", &mut [(&mut s).into()]).unwrap_err();
        assert!(matches!(
            err,
            PduError::Format(FormatError::Unterminated { offset: 3 })
        ));
        assert!(s.is_none());

        let mut s = None;
        let err = read_at(&pdu, 40, "0", &mut [(&mut s).into()]).unwrap_err();
        assert!(matches!(err, PduError::Format(FormatError::Unterminated { .. })));
    }

    #[test]
    fn terminator_at_offset_yields_empty_string() {
        let wire = wire_with(b"x\0");
        let pdu = PduRef::from_bytes(&wire).unwrap();
        let mut s = None;
        assert_eq!(read_at(&pdu, 1, "0", &mut [(&mut s).into()]).unwrap(), 2);
        assert_eq!(s.unwrap().as_bytes_with_nul(), b"\0");
    }

    #[test]
    fn raw_memory_fields() {
        let mut raw = block(32);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        append(&mut pdu, "mM", &[b"abc".into(), b"defg".into()]).unwrap();
        assert_eq!(pdu.len(), 7);

        let mut fixed = [0u8; 3];
        let mut owned = Vec::new();
        let end = read_at(
            &pdu.view(),
            0,
            "mM",
            &mut [(&mut fixed).into(), Slot::alloc(4, &mut owned)],
        )
        .unwrap();
        assert_eq!(end, 7);
        assert_eq!(&fixed, b"abc");
        assert_eq!(owned, b"defg");
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut raw = block(8);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        let err = append(&mut pdu, "Cx", &[1.into(), 2.into()]).unwrap_err();
        assert!(matches!(err, PduError::Format(FormatError::UnknownTag('x'))));
        assert_eq!(pdu.len(), 0);

        let mut v = 0u8;
        let err = read_at(&pdu.view(), 0, "?", &mut [(&mut v).into()]).unwrap_err();
        assert!(matches!(err, PduError::Format(FormatError::UnknownTag('?'))));
    }

    #[test]
    fn argument_mismatch_and_count() {
        let mut raw = block(8);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);

        let err = append(&mut pdu, "I", &[b"nope".into()]).unwrap_err();
        assert!(matches!(
            err,
            PduError::Format(FormatError::Mismatch { index: 0, tag: 'I' })
        ));

        let err = append(&mut pdu, "CC", &[1.into()]).unwrap_err();
        assert!(matches!(
            err,
            PduError::Format(FormatError::Count {
                expected: 2,
                got: 1
            })
        ));

        let mut wide = 0u32;
        let err = read_at(&pdu.view(), 0, "C", &mut [(&mut wide).into()]).unwrap_err();
        assert!(matches!(err, PduError::Format(FormatError::Mismatch { .. })));
    }

    #[test]
    fn encode_is_bounds_checked() {
        let mut raw = block(6);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);

        append(&mut pdu, "I", &[1.into()]).unwrap();
        let err = append(&mut pdu, "I", &[2.into()]).unwrap_err();
        assert!(matches!(
            err,
            PduError::Capacity {
                offset: 4,
                width: 4,
                capacity: 6
            }
        ));
        assert_eq!(pdu.len(), 4);

        let err = write_at(&mut pdu, usize::MAX, "C", &[1.into()]).unwrap_err();
        assert!(matches!(err, PduError::Capacity { .. }));
    }

    #[test]
    fn unterminated_string_argument_rejected() {
        let mut raw = block(16);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        let err = append(&mut pdu, "0", &[b"abc".into()]).unwrap_err();
        assert!(matches!(err, PduError::Format(FormatError::Unterminated { .. })));
        assert_eq!(pdu.len(), 0);
    }

    #[test]
    fn string_argument_stops_at_first_nul() {
        let mut raw = block(16);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        let s = CString::new("hey").unwrap();
        assert_eq!(append(&mut pdu, "0", &[s.as_c_str().into()]).unwrap(), 4);
        assert_eq!(append(&mut pdu, "0", &[b"a\0b\0".into()]).unwrap(), 6);
        assert_eq!(pdu.payload(), b"hey\0a\0");
    }

    #[test]
    fn write_at_does_not_touch_length() {
        let mut raw = block(16);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        append(&mut pdu, "S", &[0u16.into()]).unwrap();

        assert_eq!(write_at(&mut pdu, 0, "S", &[0xBEEFu16.into()]).unwrap(), 2);
        assert_eq!(pdu.len(), 2);

        let mut v = 0u16;
        read_at(&pdu.view(), 0, "S", &mut [(&mut v).into()]).unwrap();
        assert_eq!(v, 0xBEEF);
    }

    #[test]
    fn empty_descriptor_is_a_no_op() {
        let mut raw = block(4);
        let mut pdu = PduMut::from_bytes(&mut raw).unwrap();
        pdu.init(0, 0);
        assert_eq!(append(&mut pdu, "", &[]).unwrap(), 0);
        assert_eq!(read_at(&pdu.view(), 0, "", &mut []).unwrap(), 0);
    }

    #[test]
    fn tag_characters_roundtrip() {
        for c in "cCsSiIlLmM0".chars() {
            assert_eq!(Tag::from_char(c).unwrap().as_char(), c);
        }
        assert!(Tag::from_char('z').is_none());
    }
}
