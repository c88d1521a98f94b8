use crate::tuple::{Tuple, TupleElement, TupleError};

///
/// Subspace
///
/// A key prefix under which related keys live. All layer keys are built by
/// packing a tuple under some subspace; unpacking strips the prefix back off.
///

#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    #[must_use]
    pub const fn new(prefix: Vec<u8>) -> Self {
        Self { prefix }
    }

    #[must_use]
    pub fn all() -> Self {
        Self { prefix: Vec::new() }
    }

    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Child subspace extended by one packed tuple.
    #[must_use]
    pub fn subspace(&self, tuple: &Tuple) -> Self {
        let mut prefix = self.prefix.clone();
        prefix.extend_from_slice(&tuple.pack());
        Self { prefix }
    }

    /// Convenience child keyed by a single element.
    #[must_use]
    pub fn child(&self, element: TupleElement) -> Self {
        self.subspace(&Tuple::new(vec![element]))
    }

    #[must_use]
    pub fn pack(&self, tuple: &Tuple) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&tuple.pack());
        key
    }

    pub fn unpack(&self, key: &[u8]) -> Result<Tuple, TupleError> {
        let rest = key
            .strip_prefix(self.prefix.as_slice())
            .ok_or(TupleError::Truncated { offset: 0 })?;
        Tuple::unpack(rest)
    }

    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Byte range covering every key packed under this subspace.
    ///
    /// Packed tuples always begin with a type code < 0xff, so
    /// `prefix .. prefix+0xff` is exact.
    #[must_use]
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let begin = self.prefix.clone();
        let mut end = self.prefix.clone();
        end.push(0xff);
        (begin, end)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::Subspace;
    use crate::tuple::{Tuple, TupleElement};

    #[test]
    fn pack_unpack_round_trip() {
        let space = Subspace::new(vec![0x15, 0x01]);
        let tuple = Tuple::new(vec![
            TupleElement::String("items".into()),
            TupleElement::Int(42),
        ]);

        let key = space.pack(&tuple);
        assert!(space.contains(&key));
        assert_eq!(space.unpack(&key).expect("unpack"), tuple);
    }

    #[test]
    fn range_covers_children_only() {
        let space = Subspace::new(vec![0x15]);
        let (begin, end) = space.range();
        let inside = space.pack(&Tuple::new(vec![TupleElement::Int(7)]));
        let outside = vec![0x16, 0x00];

        assert!(begin <= inside && inside < end);
        assert!(outside >= end);
    }

    #[test]
    fn unpack_rejects_foreign_prefix() {
        let space = Subspace::new(vec![0x15]);
        assert!(space.unpack(&[0x20, 0x14]).is_err());
    }
}
