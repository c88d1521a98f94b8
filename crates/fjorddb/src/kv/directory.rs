use crate::{
    kv::{KvError, KvTransaction, Subspace},
    tuple::{Tuple, TupleElement},
};

/// Reserved first byte for all directory-managed prefixes. Keys outside the
/// directory tree never start with it.
const DIRECTORY_ROOT: u8 = 0xfe;

///
/// DirectoryLayer
///
/// Hierarchical directory facility: maps a path of string segments to a
/// stable subspace prefix. Prefixes are derived deterministically from the
/// path tuple, so `open` needs no allocation transaction and two processes
/// always agree on the mapping.
///

#[derive(Clone, Debug, Default)]
pub struct DirectoryLayer;

impl DirectoryLayer {
    #[must_use]
    pub fn open(path: &[&str]) -> Subspace {
        let tuple = Tuple::new(
            path.iter()
                .map(|segment| TupleElement::String((*segment).to_string()))
                .collect(),
        );
        let mut prefix = vec![DIRECTORY_ROOT];
        prefix.extend_from_slice(&tuple.pack());
        Subspace::new(prefix)
    }

    /// Remove a directory and everything beneath it.
    pub fn remove(txn: &dyn KvTransaction, path: &[&str]) -> Result<(), KvError> {
        let (begin, end) = Self::open(path).range();
        txn.clear_range(&begin, &end);
        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::DirectoryLayer;

    #[test]
    fn nested_paths_nest_prefixes() {
        let parent = DirectoryLayer::open(&["app", "employees"]);
        let distinct = DirectoryLayer::open(&["app", "orders"]);

        assert_ne!(parent.prefix(), distinct.prefix());
        // Sibling directories must not contain one another.
        assert!(!parent.contains(distinct.prefix()));
        assert!(!distinct.contains(parent.prefix()));
    }

    #[test]
    fn open_is_deterministic() {
        let a = DirectoryLayer::open(&["app", "employees"]);
        let b = DirectoryLayer::open(&["app", "employees"]);
        assert_eq!(a, b);
    }
}
