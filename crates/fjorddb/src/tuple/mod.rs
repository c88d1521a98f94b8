//! Order-preserving tuple codec.
//!
//! Tuples are the only key representation the layer writes. The encoding is
//! prefix-free and byte-lexicographic: for any two tuples `a < b` under
//! element-wise ordering, `pack(a) < pack(b)` under byte ordering, and no
//! packed tuple is a prefix of another packed tuple of equal arity position.

use std::cmp::Ordering;
use thiserror::Error as ThisError;

///
/// TupleError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum TupleError {
    #[error("unsigned value {value} exceeds i64::MAX and cannot be tuple-encoded")]
    Overflow { value: u64 },

    #[error("unsupported element type code: 0x{code:02x} at offset {offset}")]
    UnsupportedType { code: u8, offset: usize },

    #[error("packed tuple truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("invalid utf-8 in packed string at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

///
/// TupleElement
///
/// Storage-normalized scalar carried in packed keys. The variant tags below
/// are the on-disk type codes; they define cross-type ordering and must not
/// be reordered.
///

#[derive(Clone, Debug, PartialEq)]
pub enum TupleElement {
    Null,
    Bytes(Vec<u8>),
    String(String),
    Nested(Vec<TupleElement>),
    Int(i64),
    Double(f64),
    Bool(bool),
    Uuid([u8; 16]),
    /// Unix timestamp in microseconds; encodes directly, ordered.
    Timestamp(i64),
    /// Host-KV commit versionstamp: 10 transaction bytes + 2 user bytes.
    Versionstamp([u8; 12]),
}

// ── Type codes (DO NOT reorder) ──────────────────────────────────────
const NULL_CODE: u8 = 0x00;
const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const NESTED_CODE: u8 = 0x05;
// Integers occupy 0x0c..=0x1c with 0x14 = zero; the code encodes the
// sign and minimal byte length so ordering falls out of the byte compare.
const INT_ZERO_CODE: u8 = 0x14;
const DOUBLE_CODE: u8 = 0x21;
const FALSE_CODE: u8 = 0x26;
const TRUE_CODE: u8 = 0x27;
const UUID_CODE: u8 = 0x30;
const TIMESTAMP_CODE: u8 = 0x32;
const VERSIONSTAMP_CODE: u8 = 0x33;

const ESCAPE: u8 = 0xff;
const TERMINATOR: u8 = 0x00;

impl Eq for TupleElement {}

impl PartialOrd for TupleElement {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TupleElement {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => std::cmp::Ordering::Equal,
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Nested(a), Self::Nested(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Versionstamp(a), Self::Versionstamp(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl TupleElement {
    /// Widen an unsigned value, rejecting anything past `i64::MAX`.
    pub fn from_u64(value: u64) -> Result<Self, TupleError> {
        i64::try_from(value)
            .map(Self::Int)
            .map_err(|_| TupleError::Overflow { value })
    }

    const fn type_rank(&self) -> u8 {
        match self {
            Self::Null => NULL_CODE,
            Self::Bytes(_) => BYTES_CODE,
            Self::String(_) => STRING_CODE,
            Self::Nested(_) => NESTED_CODE,
            Self::Int(_) => INT_ZERO_CODE,
            Self::Double(_) => DOUBLE_CODE,
            Self::Bool(false) => FALSE_CODE,
            Self::Bool(true) => TRUE_CODE,
            Self::Uuid(_) => UUID_CODE,
            Self::Timestamp(_) => TIMESTAMP_CODE,
            Self::Versionstamp(_) => VERSIONSTAMP_CODE,
        }
    }
}

///
/// Tuple
///

#[derive(Clone, Debug, Default, derive_more::Deref, derive_more::DerefMut, PartialEq)]
pub struct Tuple(pub Vec<TupleElement>);

impl Tuple {
    #[must_use]
    pub fn new(elements: Vec<TupleElement>) -> Self {
        Self(elements)
    }

    #[must_use]
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 9);
        for element in &self.0 {
            encode_element(element, &mut out, false);
        }
        out
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self, TupleError> {
        let mut elements = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (element, next) = decode_element(bytes, offset, false)?;
            elements.push(element);
            offset = next;
        }
        Ok(Self(elements))
    }

    /// Lexicographic element-wise comparison; mirrors packed byte order.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let cmp = element_cmp(a, b);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl From<Vec<TupleElement>> for Tuple {
    fn from(elements: Vec<TupleElement>) -> Self {
        Self(elements)
    }
}

fn element_cmp(a: &TupleElement, b: &TupleElement) -> Ordering {
    use TupleElement as E;
    let rank = a.type_rank().cmp(&b.type_rank());
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (E::Null, E::Null) => Ordering::Equal,
        (E::Bytes(x), E::Bytes(y)) => x.cmp(y),
        (E::String(x), E::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (E::Nested(x), E::Nested(y)) => Tuple(x.clone()).canonical_cmp(&Tuple(y.clone())),
        (E::Int(x), E::Int(y)) => x.cmp(y),
        (E::Double(x), E::Double(y)) => double_sort_bits(*x).cmp(&double_sort_bits(*y)),
        (E::Bool(x), E::Bool(y)) => x.cmp(y),
        (E::Uuid(x), E::Uuid(y)) => x.cmp(y),
        (E::Timestamp(x), E::Timestamp(y)) => x.cmp(y),
        (E::Versionstamp(x), E::Versionstamp(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn encode_element(element: &TupleElement, out: &mut Vec<u8>, nested: bool) {
    match element {
        TupleElement::Null => {
            out.push(NULL_CODE);
            // Inside a nested tuple, a bare 0x00 would read as the nested
            // terminator; escape it.
            if nested {
                out.push(ESCAPE);
            }
        }
        TupleElement::Bytes(bytes) => {
            out.push(BYTES_CODE);
            encode_escaped(bytes, out);
        }
        TupleElement::String(text) => {
            out.push(STRING_CODE);
            encode_escaped(text.as_bytes(), out);
        }
        TupleElement::Nested(elements) => {
            out.push(NESTED_CODE);
            for element in elements {
                encode_element(element, out, true);
            }
            out.push(TERMINATOR);
        }
        TupleElement::Int(value) => encode_int(*value, out),
        TupleElement::Double(value) => {
            out.push(DOUBLE_CODE);
            out.extend_from_slice(&double_sort_bits(*value).to_be_bytes());
        }
        TupleElement::Bool(value) => {
            out.push(if *value { TRUE_CODE } else { FALSE_CODE });
        }
        TupleElement::Uuid(bytes) => {
            out.push(UUID_CODE);
            out.extend_from_slice(bytes);
        }
        TupleElement::Timestamp(micros) => {
            out.push(TIMESTAMP_CODE);
            out.extend_from_slice(&int_sort_bits(*micros).to_be_bytes());
        }
        TupleElement::Versionstamp(bytes) => {
            out.push(VERSIONSTAMP_CODE);
            out.extend_from_slice(bytes);
        }
    }
}

fn encode_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &byte in bytes {
        out.push(byte);
        if byte == TERMINATOR {
            out.push(ESCAPE);
        }
    }
    out.push(TERMINATOR);
}

/// Variable-length signed integer: code 0x14 ± length, then big-endian
/// magnitude bytes (one's-complemented for negatives).
fn encode_int(value: i64, out: &mut Vec<u8>) {
    match value.cmp(&0) {
        Ordering::Equal => out.push(INT_ZERO_CODE),
        Ordering::Greater => {
            let magnitude = value.unsigned_abs();
            let len = minimal_len(magnitude);
            out.push(INT_ZERO_CODE + len);
            out.extend_from_slice(&magnitude.to_be_bytes()[8 - len as usize..]);
        }
        Ordering::Less => {
            let magnitude = value.unsigned_abs();
            let len = minimal_len(magnitude);
            out.push(INT_ZERO_CODE - len);
            let max = max_for_len(len);
            out.extend_from_slice(&(max - magnitude).to_be_bytes()[8 - len as usize..]);
        }
    }
}

const fn minimal_len(magnitude: u64) -> u8 {
    let len = (71 - magnitude.leading_zeros() as u8) / 8;
    if len < 1 {
        1
    } else {
        len
    }
}

const fn max_for_len(len: u8) -> u64 {
    if len >= 8 {
        u64::MAX
    } else {
        (1u64 << (len as u32 * 8)) - 1
    }
}

/// IEEE-754 bits transformed so the byte order matches numeric order:
/// negative values flip entirely, positives flip the sign bit.
fn double_sort_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & (1 << 63) == 0 {
        bits | (1 << 63)
    } else {
        !bits
    }
}

fn double_from_sort_bits(bits: u64) -> f64 {
    if bits & (1 << 63) != 0 {
        f64::from_bits(bits & !(1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

#[expect(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
const fn int_sort_bits(value: i64) -> u64 {
    (value as u64) ^ (1 << 63)
}

#[expect(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
const fn int_from_sort_bits(bits: u64) -> i64 {
    (bits ^ (1 << 63)) as i64
}

fn decode_element(
    bytes: &[u8],
    offset: usize,
    nested: bool,
) -> Result<(TupleElement, usize), TupleError> {
    let code = *bytes
        .get(offset)
        .ok_or(TupleError::Truncated { offset })?;
    let payload = offset + 1;

    match code {
        NULL_CODE => {
            if nested {
                // Consume the escape byte that distinguishes a nested null
                // from the nested terminator.
                match bytes.get(payload) {
                    Some(&ESCAPE) => Ok((TupleElement::Null, payload + 1)),
                    _ => Err(TupleError::Truncated { offset: payload }),
                }
            } else {
                Ok((TupleElement::Null, payload))
            }
        }
        BYTES_CODE => {
            let (raw, next) = decode_escaped(bytes, payload)?;
            Ok((TupleElement::Bytes(raw), next))
        }
        STRING_CODE => {
            let (raw, next) = decode_escaped(bytes, payload)?;
            let text = String::from_utf8(raw)
                .map_err(|_| TupleError::InvalidUtf8 { offset: payload })?;
            Ok((TupleElement::String(text), next))
        }
        NESTED_CODE => {
            let mut elements = Vec::new();
            let mut cursor = payload;
            loop {
                match bytes.get(cursor) {
                    None => return Err(TupleError::Truncated { offset: cursor }),
                    Some(&TERMINATOR) if bytes.get(cursor + 1) != Some(&ESCAPE) => {
                        return Ok((TupleElement::Nested(elements), cursor + 1));
                    }
                    Some(_) => {
                        let (element, next) = decode_element(bytes, cursor, true)?;
                        elements.push(element);
                        cursor = next;
                    }
                }
            }
        }
        code if (INT_ZERO_CODE - 8..=INT_ZERO_CODE + 8).contains(&code) => {
            decode_int(bytes, offset, code)
        }
        DOUBLE_CODE => {
            let raw = fixed_slice::<8>(bytes, payload)?;
            Ok((
                TupleElement::Double(double_from_sort_bits(u64::from_be_bytes(raw))),
                payload + 8,
            ))
        }
        FALSE_CODE => Ok((TupleElement::Bool(false), payload)),
        TRUE_CODE => Ok((TupleElement::Bool(true), payload)),
        UUID_CODE => {
            let raw = fixed_slice::<16>(bytes, payload)?;
            Ok((TupleElement::Uuid(raw), payload + 16))
        }
        TIMESTAMP_CODE => {
            let raw = fixed_slice::<8>(bytes, payload)?;
            Ok((
                TupleElement::Timestamp(int_from_sort_bits(u64::from_be_bytes(raw))),
                payload + 8,
            ))
        }
        VERSIONSTAMP_CODE => {
            let raw = fixed_slice::<12>(bytes, payload)?;
            Ok((TupleElement::Versionstamp(raw), payload + 12))
        }
        code => Err(TupleError::UnsupportedType { code, offset }),
    }
}

fn decode_int(bytes: &[u8], offset: usize, code: u8) -> Result<(TupleElement, usize), TupleError> {
    let payload = offset + 1;
    if code == INT_ZERO_CODE {
        return Ok((TupleElement::Int(0), payload));
    }

    let positive = code > INT_ZERO_CODE;
    let len = usize::from(code.abs_diff(INT_ZERO_CODE));
    let end = payload + len;
    let raw = bytes
        .get(payload..end)
        .ok_or(TupleError::Truncated { offset: payload })?;

    let mut magnitude = [0u8; 8];
    magnitude[8 - len..].copy_from_slice(raw);
    let magnitude = u64::from_be_bytes(magnitude);

    let value = if positive {
        i64::try_from(magnitude).map_err(|_| TupleError::Overflow { value: magnitude })?
    } else {
        #[expect(clippy::cast_possible_truncation)]
        let restored = max_for_len(len as u8) - magnitude;
        if restored == i64::MAX.unsigned_abs() + 1 {
            i64::MIN
        } else {
            i64::try_from(restored)
                .map(|v| -v)
                .map_err(|_| TupleError::Overflow { value: restored })?
        }
    };

    Ok((TupleElement::Int(value), end))
}

fn fixed_slice<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], TupleError> {
    let raw = bytes
        .get(offset..offset + N)
        .ok_or(TupleError::Truncated { offset })?;
    let mut out = [0u8; N];
    out.copy_from_slice(raw);
    Ok(out)
}

fn decode_escaped(bytes: &[u8], mut offset: usize) -> Result<(Vec<u8>, usize), TupleError> {
    let mut out = Vec::new();
    loop {
        match bytes.get(offset) {
            None => return Err(TupleError::Truncated { offset }),
            Some(&TERMINATOR) => {
                if bytes.get(offset + 1) == Some(&ESCAPE) {
                    out.push(TERMINATOR);
                    offset += 2;
                } else {
                    return Ok((out, offset + 1));
                }
            }
            Some(&byte) => {
                out.push(byte);
                offset += 1;
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{Tuple, TupleElement, TupleError};
    use proptest::prelude::*;

    fn roundtrip(elements: Vec<TupleElement>) -> Vec<TupleElement> {
        let packed = Tuple::new(elements).pack();
        Tuple::unpack(&packed).expect("unpack").0
    }

    #[test]
    fn scalar_round_trips() {
        let elements = vec![
            TupleElement::Null,
            TupleElement::Bytes(vec![0, 1, 0xff, 0]),
            TupleElement::String("fjord\u{0}dal".into()),
            TupleElement::Int(-40_000),
            TupleElement::Int(0),
            TupleElement::Int(i64::MAX),
            TupleElement::Int(i64::MIN),
            TupleElement::Double(-1.5),
            TupleElement::Bool(true),
            TupleElement::Uuid([7; 16]),
            TupleElement::Timestamp(1_700_000_000_000_000),
            TupleElement::Versionstamp([3; 12]),
        ];
        assert_eq!(roundtrip(elements.clone()), elements);
    }

    #[test]
    fn nested_round_trips() {
        let elements = vec![TupleElement::Nested(vec![
            TupleElement::Null,
            TupleElement::String("inner".into()),
            TupleElement::Nested(vec![TupleElement::Int(3)]),
        ])];
        assert_eq!(roundtrip(elements.clone()), elements);
    }

    #[test]
    fn unsigned_overflow_is_explicit() {
        let err = TupleElement::from_u64(u64::MAX).expect_err("overflow");
        assert_eq!(
            err,
            TupleError::Overflow { value: u64::MAX }
        );
        assert!(TupleElement::from_u64(i64::MAX as u64).is_ok());
    }

    #[test]
    fn truncated_input_fails() {
        let packed = Tuple::new(vec![TupleElement::Uuid([9; 16])]).pack();
        let err = Tuple::unpack(&packed[..10]).expect_err("truncated");
        assert!(matches!(err, TupleError::Truncated { .. }));
    }

    #[test]
    fn unknown_type_code_fails() {
        let err = Tuple::unpack(&[0x7f]).expect_err("unknown code");
        assert_eq!(
            err,
            TupleError::UnsupportedType {
                code: 0x7f,
                offset: 0
            }
        );
    }

    #[test]
    fn int_order_matches_byte_order() {
        let values = [
            i64::MIN,
            -65_536,
            -256,
            -255,
            -1,
            0,
            1,
            255,
            256,
            65_535,
            i64::MAX,
        ];
        let packed: Vec<Vec<u8>> = values
            .iter()
            .map(|v| Tuple::new(vec![TupleElement::Int(*v)]).pack())
            .collect();
        for pair in packed.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }

    proptest! {
        #[test]
        fn prop_int_round_trip(value in any::<i64>()) {
            let out = roundtrip(vec![TupleElement::Int(value)]);
            prop_assert_eq!(out, vec![TupleElement::Int(value)]);
        }

        #[test]
        fn prop_pack_order_matches_element_order(a in any::<i64>(), b in any::<i64>()) {
            let pa = Tuple::new(vec![TupleElement::Int(a)]).pack();
            let pb = Tuple::new(vec![TupleElement::Int(b)]).pack();
            prop_assert_eq!(pa.cmp(&pb), a.cmp(&b));
        }

        #[test]
        fn prop_string_round_trip(text in ".{0,64}") {
            let out = roundtrip(vec![TupleElement::String(text.clone())]);
            prop_assert_eq!(out, vec![TupleElement::String(text)]);
        }

        #[test]
        fn prop_bytes_order_matches(a in proptest::collection::vec(any::<u8>(), 0..32),
                                    b in proptest::collection::vec(any::<u8>(), 0..32)) {
            let pa = Tuple::new(vec![TupleElement::Bytes(a.clone())]).pack();
            let pb = Tuple::new(vec![TupleElement::Bytes(b.clone())]).pack();
            prop_assert_eq!(pa.cmp(&pb), a.cmp(&b));
        }
    }
}
