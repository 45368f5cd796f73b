//! # Embedded Documents
//!
//! A document on the wire is a little-endian `int32` total length (including the
//! prefix itself) followed by a sequence of typed elements and a single zero byte:
//!
//! ```text
//! [length(4)] { [type(1)] [name\0] [value] }* [0x00]
//! ```
//!
//! [`DocumentView`] is a zero-copy window onto one such document. Its interior is
//! opaque to the framing layer; [`DocumentView::validate`] walks the element
//! structure when deep validation is switched on.

use std::fmt;

use byteorder::LittleEndian;

use super::packed::read_at;
use crate::error::{constants, ProtocolError, Result};

/// Smallest possible document: a length prefix and the terminator.
pub const MIN_DOCUMENT_SIZE: usize = 5;

/// Nesting limit for the structural walk.
pub const MAX_NESTING_DEPTH: usize = 100;

const OBJECT_ID_LEN: usize = 12;

/// Borrowed, length-checked document bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentView<'a> {
    bytes: &'a [u8],
}

impl<'a> DocumentView<'a> {
    /// Wrap `bytes` after checking that the length prefix describes exactly this slice.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let declared = read_at::<i32, LittleEndian>(bytes, 0).ok_or_else(|| {
            ProtocolError::truncated(constants::CTX_DOCUMENT_PREFIX, 4, bytes.len())
        })?;

        if declared < MIN_DOCUMENT_SIZE as i32 || declared as usize != bytes.len() {
            return Err(ProtocolError::InvalidDocumentSize(i64::from(declared)));
        }
        Ok(Self { bytes })
    }

    /// Wrap bytes whose prefix the caller has already checked against the slice.
    pub(crate) fn from_checked(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Total size including the length prefix.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a document with no elements.
    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= MIN_DOCUMENT_SIZE
    }

    /// Walk every element and check it fits its container.
    pub fn validate(&self) -> Result<()> {
        validate_document(self.bytes, 0, 0)
    }
}

impl fmt::Debug for DocumentView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentView")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Element type tags.
mod tag {
    pub const DOUBLE: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const DOCUMENT: u8 = 0x03;
    pub const ARRAY: u8 = 0x04;
    pub const BINARY: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const OBJECT_ID: u8 = 0x07;
    pub const BOOL: u8 = 0x08;
    pub const DATE: u8 = 0x09;
    pub const NULL: u8 = 0x0A;
    pub const REGEX: u8 = 0x0B;
    pub const DB_POINTER: u8 = 0x0C;
    pub const CODE: u8 = 0x0D;
    pub const SYMBOL: u8 = 0x0E;
    pub const CODE_WITH_SCOPE: u8 = 0x0F;
    pub const INT32: u8 = 0x10;
    pub const TIMESTAMP: u8 = 0x11;
    pub const INT64: u8 = 0x12;
    pub const DECIMAL128: u8 = 0x13;
    pub const MIN_KEY: u8 = 0xFF;
    pub const MAX_KEY: u8 = 0x7F;
}

/// `base` is the offset of `doc` inside the outermost document, for error reporting.
fn validate_document(doc: &[u8], base: usize, depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ProtocolError::malformed(base, "nesting too deep"));
    }

    let declared = read_i32(doc, 0, base)?;
    if declared < MIN_DOCUMENT_SIZE as i32 || declared as usize != doc.len() {
        return Err(ProtocolError::malformed(
            base,
            format!("document length {declared} does not match its container"),
        ));
    }

    // The last byte is the terminator; elements live in [4, end)
    let end = doc.len() - 1;
    if doc[end] != 0 {
        return Err(ProtocolError::malformed(
            base + end,
            constants::ERR_MISSING_TERMINATOR,
        ));
    }

    let mut pos = 4;
    while pos < end {
        let element_type = doc[pos];
        pos += 1;
        pos = skip_cstring(&doc[..end], pos, base, constants::ERR_UNTERMINATED_KEY)?;
        pos = skip_value(&doc[..end], element_type, pos, base, depth)?;
    }

    if pos != end {
        return Err(ProtocolError::malformed(base + pos, constants::ERR_ELEMENT_OVERRUN));
    }
    Ok(())
}

/// Returns the position just past the value of an element of `element_type` at `pos`.
fn skip_value(body: &[u8], element_type: u8, pos: usize, base: usize, depth: usize) -> Result<usize> {
    let fixed = |width: usize| advance(body, pos, width, base);

    match element_type {
        tag::DOUBLE | tag::DATE | tag::TIMESTAMP | tag::INT64 => fixed(8),
        tag::INT32 => fixed(4),
        tag::DECIMAL128 => fixed(16),
        tag::OBJECT_ID => fixed(OBJECT_ID_LEN),
        tag::UNDEFINED | tag::NULL | tag::MIN_KEY | tag::MAX_KEY => Ok(pos),
        tag::BOOL => {
            let next = fixed(1)?;
            match body[pos] {
                0 | 1 => Ok(next),
                other => Err(ProtocolError::malformed(
                    base + pos,
                    format!("invalid boolean byte {other:#04x}"),
                )),
            }
        }
        tag::STRING | tag::CODE | tag::SYMBOL => skip_string(body, pos, base),
        tag::DOCUMENT | tag::ARRAY => skip_embedded(body, pos, base, depth),
        tag::BINARY => {
            let len = read_i32(body, pos, base)?;
            if len < 0 {
                return Err(ProtocolError::malformed(base + pos, "negative binary length"));
            }
            // length prefix, subtype byte, payload
            advance(body, pos, 4 + 1 + len as usize, base)
        }
        tag::REGEX => {
            let next = skip_cstring(body, pos, base, "regex pattern is not terminated")?;
            skip_cstring(body, next, base, "regex options are not terminated")
        }
        tag::DB_POINTER => {
            let next = skip_string(body, pos, base)?;
            advance(body, next, OBJECT_ID_LEN, base)
        }
        tag::CODE_WITH_SCOPE => {
            let total = read_i32(body, pos, base)?;
            let end = advance(body, pos, total.max(0) as usize, base)?;
            let code_end = skip_string(&body[..end], pos + 4, base)?;
            let scope_end = skip_embedded(&body[..end], code_end, base, depth)?;
            if scope_end != end {
                return Err(ProtocolError::malformed(
                    base + pos,
                    "code-with-scope length does not match its contents",
                ));
            }
            Ok(end)
        }
        other => Err(ProtocolError::malformed(
            base + pos,
            format!("unknown element type {other:#04x}"),
        )),
    }
}

fn skip_embedded(body: &[u8], pos: usize, base: usize, depth: usize) -> Result<usize> {
    let len = read_i32(body, pos, base)?;
    if len < MIN_DOCUMENT_SIZE as i32 {
        return Err(ProtocolError::malformed(
            base + pos,
            format!("embedded document length {len} is too small"),
        ));
    }
    let end = advance(body, pos, len as usize, base)?;
    validate_document(&body[pos..end], base + pos, depth + 1)?;
    Ok(end)
}

fn skip_string(body: &[u8], pos: usize, base: usize) -> Result<usize> {
    let len = read_i32(body, pos, base)?;
    if len < 1 {
        return Err(ProtocolError::malformed(base + pos, constants::ERR_BAD_STRING));
    }
    let end = advance(body, pos + 4, len as usize, base)?;
    if body[end - 1] != 0 {
        return Err(ProtocolError::malformed(base + pos, constants::ERR_BAD_STRING));
    }
    Ok(end)
}

fn skip_cstring(body: &[u8], pos: usize, base: usize, reason: &str) -> Result<usize> {
    body.get(pos..)
        .and_then(|rest| rest.iter().position(|&b| b == 0))
        .map(|nul| pos + nul + 1)
        .ok_or_else(|| ProtocolError::malformed(base + pos, reason))
}

fn advance(body: &[u8], pos: usize, width: usize, base: usize) -> Result<usize> {
    match pos.checked_add(width) {
        Some(next) if next <= body.len() => Ok(next),
        _ => Err(ProtocolError::malformed(base + pos, constants::ERR_ELEMENT_OVERRUN)),
    }
}

fn read_i32(body: &[u8], pos: usize, base: usize) -> Result<i32> {
    read_at::<i32, LittleEndian>(body, pos)
        .ok_or_else(|| ProtocolError::malformed(base + pos, constants::ERR_ELEMENT_OVERRUN))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[u8] = &[];

    /// Minimal encoder for test documents.
    fn doc(elements: &[(u8, &str, &[u8])]) -> Vec<u8> {
        let mut out = vec![0u8; 4];
        for (t, name, value) in elements {
            out.push(*t);
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.extend_from_slice(value);
        }
        out.push(0);
        let len = out.len() as i32;
        out[..4].copy_from_slice(&len.to_le_bytes());
        out
    }

    fn string_value(s: &str) -> Vec<u8> {
        let mut v = ((s.len() + 1) as i32).to_le_bytes().to_vec();
        v.extend_from_slice(s.as_bytes());
        v.push(0);
        v
    }

    #[test]
    fn test_empty_document() {
        let bytes = doc(&[]);
        assert_eq!(bytes, vec![5, 0, 0, 0, 0]);
        let view = DocumentView::new(&bytes).unwrap();
        assert!(view.is_empty());
        view.validate().unwrap();
    }

    #[test]
    fn test_new_rejects_prefix_mismatch() {
        let mut bytes = doc(&[]);
        bytes.push(0);
        assert!(matches!(
            DocumentView::new(&bytes),
            Err(ProtocolError::InvalidDocumentSize(5))
        ));
        assert!(DocumentView::new(&[3, 0]).is_err());
    }

    #[test]
    fn test_validates_scalar_elements() {
        let s = string_value("hello");
        let nested = doc(&[(tag::INT32, "n", &7i32.to_le_bytes()[..])]);
        let bytes = doc(&[
            (tag::DOUBLE, "d", &1.5f64.to_le_bytes()[..]),
            (tag::STRING, "s", &s[..]),
            (tag::DOCUMENT, "o", &nested[..]),
            (tag::ARRAY, "a", &nested[..]),
            (tag::OBJECT_ID, "_id", &[0xAB; 12][..]),
            (tag::BOOL, "b", &[1][..]),
            (tag::NULL, "z", NONE),
            (tag::INT64, "l", &9i64.to_le_bytes()[..]),
            (tag::BINARY, "bin", &[2, 0, 0, 0, 0, 0xDE, 0xAD][..]),
            (tag::REGEX, "re", &b"^a\0i\0"[..]),
            (tag::MAX_KEY, "max", NONE),
        ]);
        DocumentView::new(&bytes).unwrap().validate().unwrap();
    }

    #[test]
    fn test_code_with_scope() {
        let code = string_value("x");
        let scope = doc(&[]);
        let total = (4 + code.len() + scope.len()) as i32;
        let mut value = total.to_le_bytes().to_vec();
        value.extend_from_slice(&code);
        value.extend_from_slice(&scope);
        let bytes = doc(&[(tag::CODE_WITH_SCOPE, "c", &value[..])]);
        DocumentView::new(&bytes).unwrap().validate().unwrap();
    }

    #[test]
    fn test_rejects_missing_terminator() {
        let mut bytes = doc(&[(tag::INT32, "n", &7i32.to_le_bytes()[..])]);
        let last = bytes.len() - 1;
        bytes[last] = 1;
        let err = DocumentView::new(&bytes).unwrap().validate().unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedDocument { .. }));
    }

    #[test]
    fn test_rejects_overrunning_string() {
        let mut s = string_value("hi");
        s[0] = 50;
        let bytes = doc(&[(tag::STRING, "s", &s[..])]);
        assert!(DocumentView::new(&bytes).unwrap().validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_type_and_bad_bool() {
        let bytes = doc(&[(0x42, "x", NONE)]);
        assert!(DocumentView::new(&bytes).unwrap().validate().is_err());

        let bytes = doc(&[(tag::BOOL, "b", &[7][..])]);
        assert!(DocumentView::new(&bytes).unwrap().validate().is_err());
    }

    #[test]
    fn test_rejects_nested_length_lie() {
        let mut nested = doc(&[(tag::INT32, "n", &7i32.to_le_bytes()[..])]);
        nested[0] = 200;
        let bytes = doc(&[(tag::DOCUMENT, "o", &nested[..])]);
        assert!(DocumentView::new(&bytes).unwrap().validate().is_err());
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let mut inner = doc(&[]);
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            inner = doc(&[(tag::DOCUMENT, "o", &inner[..])]);
        }
        let err = DocumentView::new(&inner).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }
}
