use crate::{
    index::IndexEntry,
    record::FieldValue,
    tuple::{Tuple, TupleElement},
};

const MAX_PRECISION: u8 = 31;

/// Morton cell for a `(lat, lon)` pair: each coordinate quantized to
/// `precision` bits over its legal range, then bit-interleaved. Nearby
/// points share cell prefixes, so radius queries scan covering prefixes
/// and filter.
#[must_use]
pub(super) fn morton_cell(lat: f64, lon: f64, precision: u8) -> i64 {
    let precision = precision.clamp(1, MAX_PRECISION);
    let lat_q = quantize(lat, -90.0, 90.0, precision);
    let lon_q = quantize(lon, -180.0, 180.0, precision);
    interleave(lat_q, lon_q, precision)
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize(value: f64, min: f64, max: f64, precision: u8) -> u32 {
    let cells = f64::from(1u32 << precision);
    let clamped = value.clamp(min, max);
    let scaled = ((clamped - min) / (max - min) * cells).floor();
    (scaled as u32).min((1u32 << precision) - 1)
}

#[expect(clippy::cast_possible_wrap)]
fn interleave(a: u32, b: u32, precision: u8) -> i64 {
    let mut out: u64 = 0;
    for bit in (0..u64::from(precision)).rev() {
        out = (out << 1) | u64::from((a >> bit) & 1);
        out = (out << 1) | u64::from((b >> bit) & 1);
    }
    out as i64
}

pub(super) fn cell_entries(values: &[FieldValue], id: &Tuple, precision: u8) -> Vec<IndexEntry> {
    let (Some(lat), Some(lon)) = (
        values.first().and_then(FieldValue::as_f64),
        values.get(1).and_then(FieldValue::as_f64),
    ) else {
        return Vec::new();
    };

    let mut elements = Vec::with_capacity(1 + id.0.len());
    elements.push(TupleElement::Int(morton_cell(lat, lon, precision)));
    elements.extend(id.0.iter().cloned());
    vec![IndexEntry::bare(Tuple::new(elements))]
}

///
/// TESTS
///
