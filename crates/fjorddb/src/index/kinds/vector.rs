use crate::record::FieldValue;

///
/// VectorMetric
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VectorMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl VectorMetric {
    /// Similarity score where greater is closer for both metrics, so top-K
    /// selection reads the same regardless of metric.
    #[must_use]
    pub fn score(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
            Self::Euclidean => {
                let squared: f64 = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum();
                -squared.sqrt()
            }
        }
    }
}

/// Flat storage layout: little-endian f64s, concatenated.
pub(super) fn encode_vector(value: Option<&FieldValue>) -> Vec<u8> {
    let Some(FieldValue::Array(items)) = value else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(items.len() * 8);
    for item in items {
        out.extend_from_slice(&item.as_f64().unwrap_or(0.0).to_le_bytes());
    }
    out
}

#[must_use]
pub fn decode_vector(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{VectorMetric, decode_vector, encode_vector};
    use crate::record::FieldValue;

    #[test]
    fn vector_bytes_round_trip() {
        let value = FieldValue::Array(vec![
            FieldValue::Double(1.0),
            FieldValue::Double(-2.5),
            FieldValue::Int(3),
        ]);
        let bytes = encode_vector(Some(&value));
        assert_eq!(decode_vector(&bytes), vec![1.0, -2.5, 3.0]);
    }

    #[test]
    fn cosine_prefers_aligned_vectors() {
        let metric = VectorMetric::Cosine;
        let query = [1.0, 0.0];
        assert!(metric.score(&query, &[2.0, 0.0]) > metric.score(&query, &[0.0, 1.0]));
    }

    #[test]
    fn euclidean_prefers_closer_vectors() {
        let metric = VectorMetric::Euclidean;
        let query = [0.0, 0.0];
        assert!(metric.score(&query, &[1.0, 0.0]) > metric.score(&query, &[5.0, 0.0]));
    }
}
