//! Conversions between command-line text and descriptor fields.

use std::ffi::CString;

use pdubuf_pdu::{read_at, Arg, PduRef, Slot, Tag};
use serde_json::{json, Value};

use crate::exit::{pdu_error, CliError, CliResult};

/// An owned encode argument parsed from `--arg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedArg {
    Int(i128),
    Bytes(Vec<u8>),
}

impl OwnedArg {
    pub fn as_arg(&self) -> Arg<'_> {
        match self {
            OwnedArg::Int(v) => Arg::Int(*v),
            OwnedArg::Bytes(b) => Arg::Bytes(b),
        }
    }
}

/// Parse one `--arg` per descriptor tag.
///
/// Integers accept decimal or `0x` hex, optionally negative. `m` and `M`
/// take the text's bytes, or hex digits after a `hex:` prefix. `0` takes
/// the text and appends the terminator.
pub fn parse_args(fmt: &str, raw: &[String]) -> CliResult<Vec<OwnedArg>> {
    let tags = Tag::parse_all(fmt).map_err(|err| pdu_error("invalid --fmt", err))?;
    if tags.len() != raw.len() {
        return Err(CliError::usage(format!(
            "--fmt {fmt:?} needs {} --arg values, got {}",
            tags.len(),
            raw.len()
        )));
    }

    tags.iter()
        .zip(raw)
        .map(|(&tag, text)| match tag {
            Tag::Mem | Tag::MemAlloc => parse_bytes(text).map(OwnedArg::Bytes),
            Tag::CStr => {
                if text.contains('\0') {
                    return Err(CliError::usage("string arguments must not contain NUL"));
                }
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                Ok(OwnedArg::Bytes(bytes))
            }
            _ => parse_int(text).map(OwnedArg::Int),
        })
        .collect()
}

fn parse_int(text: &str) -> CliResult<i128> {
    let invalid = || CliError::usage(format!("invalid integer argument: {text:?}"));
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (radix, digits) = match rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        Some(hex) => (16, hex),
        None => (10, rest),
    };
    if !digits.starts_with(|c: char| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    // Parse as u128 so the magnitude of i128::MIN fits.
    let magnitude = u128::from_str_radix(digits, radix).map_err(|_| invalid())?;
    if negative {
        0i128.checked_sub_unsigned(magnitude).ok_or_else(invalid)
    } else {
        i128::try_from(magnitude).map_err(|_| invalid())
    }
}

fn parse_bytes(text: &str) -> CliResult<Vec<u8>> {
    let Some(hex) = text.strip_prefix("hex:") else {
        return Ok(text.as_bytes().to_vec());
    };
    if hex.len() % 2 != 0 {
        return Err(CliError::usage(format!("odd number of hex digits: {text:?}")));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::usage(format!("invalid hex bytes: {text:?}")))
        })
        .collect()
}

/// Decode storage for one tag.
enum Field {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Mem(Vec<u8>),
    Alloc(usize, Vec<u8>),
    Str(Option<CString>),
}

impl Field {
    fn slot(&mut self) -> Slot<'_> {
        match self {
            Field::I8(v) => Slot::from(v),
            Field::U8(v) => Slot::from(v),
            Field::I16(v) => Slot::from(v),
            Field::U16(v) => Slot::from(v),
            Field::I32(v) => Slot::from(v),
            Field::U32(v) => Slot::from(v),
            Field::I64(v) => Slot::from(v),
            Field::U64(v) => Slot::from(v),
            Field::Mem(buf) => Slot::from(buf.as_mut_slice()),
            Field::Alloc(len, out) => Slot::alloc(*len, out),
            Field::Str(out) => Slot::from(out),
        }
    }

    fn into_json(self) -> Value {
        match self {
            Field::I8(v) => json!(v),
            Field::U8(v) => json!(v),
            Field::I16(v) => json!(v),
            Field::U16(v) => json!(v),
            Field::I32(v) => json!(v),
            Field::U32(v) => json!(v),
            Field::I64(v) => json!(v),
            Field::U64(v) => json!(v),
            Field::Mem(bytes) | Field::Alloc(_, bytes) => json!(bytes_text(&bytes)),
            Field::Str(s) => match s {
                Some(s) => json!(s.to_string_lossy()),
                None => Value::Null,
            },
        }
    }
}

/// Decode `pdu`'s payload from offset 0 with `fmt`.
///
/// `m` and `M` fields take their widths from `mem_lens`, in order.
/// Returns the decoded values and the offset after the last field.
pub fn decode(pdu: &PduRef<'_>, fmt: &str, mem_lens: &[usize]) -> CliResult<(Vec<Value>, usize)> {
    let tags = Tag::parse_all(fmt).map_err(|err| pdu_error("invalid --fmt", err))?;
    let mut lens = mem_lens.iter().copied();
    let mut fields = tags
        .iter()
        .map(|tag| -> CliResult<Field> {
            Ok(match tag {
                Tag::I8 => Field::I8(0),
                Tag::U8 => Field::U8(0),
                Tag::I16 => Field::I16(0),
                Tag::U16 => Field::U16(0),
                Tag::I32 => Field::I32(0),
                Tag::U32 => Field::U32(0),
                Tag::I64 => Field::I64(0),
                Tag::U64 => Field::U64(0),
                Tag::Mem => Field::Mem(vec![0; next_len(&mut lens)?]),
                Tag::MemAlloc => Field::Alloc(next_len(&mut lens)?, Vec::new()),
                Tag::CStr => Field::Str(None),
            })
        })
        .collect::<CliResult<Vec<_>>>()?;
    if lens.next().is_some() {
        return Err(CliError::usage("more --mem-len values than m/M fields"));
    }

    let end = {
        let mut slots = fields.iter_mut().map(Field::slot).collect::<Vec<_>>();
        read_at(pdu, 0, fmt, &mut slots).map_err(|err| pdu_error("decode failed", err))?
    };
    Ok((fields.into_iter().map(Field::into_json).collect(), end))
}

fn next_len(lens: &mut impl Iterator<Item = usize>) -> CliResult<usize> {
    lens.next()
        .ok_or_else(|| CliError::usage("every m/M field needs a --mem-len value"))
}

/// UTF-8 text as-is, anything else as lowercase hex.
pub fn bytes_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => hex(bytes),
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use pdubuf_pdu::{append, PduMut};

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_each_kind_of_argument() {
        let args = parse_args("cIm0", &strings(&["-3", "0x10", "hex:00ff", "hi"])).unwrap();
        assert_eq!(
            args,
            vec![
                OwnedArg::Int(-3),
                OwnedArg::Int(16),
                OwnedArg::Bytes(vec![0x00, 0xff]),
                OwnedArg::Bytes(b"hi\0".to_vec()),
            ]
        );
    }

    #[test]
    fn integer_signs_and_limits() {
        let parse = |text: &str| parse_args("L", &strings(&[text]));
        assert_eq!(
            parse(&i128::MIN.to_string()).unwrap(),
            vec![OwnedArg::Int(i128::MIN)]
        );
        assert_eq!(parse("-0x10").unwrap(), vec![OwnedArg::Int(-16)]);
        for bad in [
            "--170141183460469231731687303715884105728",
            "-170141183460469231731687303715884105729",
            "170141183460469231731687303715884105728",
            "--5",
            "-+5",
            "+5",
            "0x-5",
            "0x+5",
            "-",
            "0x",
        ] {
            let err = parse(bad).unwrap_err();
            assert_eq!(err.code, crate::exit::USAGE, "{bad}");
        }
    }

    #[test]
    fn argument_count_must_match() {
        let err = parse_args("CC", &strings(&["1"])).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn rejects_bad_text() {
        assert!(parse_args("I", &strings(&["twelve"])).is_err());
        assert!(parse_args("m", &strings(&["hex:abc"])).is_err());
        assert!(parse_args("m", &strings(&["hex:zz"])).is_err());
        assert_eq!(
            parse_args("x", &strings(&["1"])).unwrap_err().code,
            crate::exit::DATA_INVALID
        );
    }

    #[test]
    fn decodes_into_json_values() {
        let mut block = [0u8; 64];
        let mut pdu = PduMut::from_bytes(&mut block).unwrap();
        pdu.init(1, 1);
        let args = parse_args("sLM0", &strings(&["-2", "77", "abc", "name"])).unwrap();
        let args = args.iter().map(OwnedArg::as_arg).collect::<Vec<_>>();
        append(&mut pdu, "sLM0", &args).unwrap();

        let (values, end) = decode(&pdu.view(), "sLM0", &[3]).unwrap();
        assert_eq!(values, vec![json!(-2), json!(77u64), json!("abc"), json!("name")]);
        assert_eq!(end, 2 + 8 + 3 + 5);
    }

    #[test]
    fn decode_requires_mem_lengths() {
        let mut block = [0u8; 8];
        let mut pdu = PduMut::from_bytes(&mut block).unwrap();
        pdu.init(0, 0);
        assert!(decode(&pdu.view(), "m", &[]).is_err());
        assert!(decode(&pdu.view(), "C", &[1]).is_err());
    }

    #[test]
    fn binary_bytes_render_as_hex() {
        assert_eq!(bytes_text(b"ok"), "ok");
        assert_eq!(bytes_text(&[0xff, 0x01]), "ff01");
    }
}
