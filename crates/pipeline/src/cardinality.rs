use std::collections::{BTreeMap, HashMap};

/// Size concept used by stage logging.
///
/// Values without a meaningful size keep the default and are logged without
/// an item count.
pub trait Cardinality {
    fn cardinality(&self) -> Option<usize> {
        None
    }
}

impl<T> Cardinality for Vec<T> {
    fn cardinality(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<K, V, S> Cardinality for HashMap<K, V, S> {
    fn cardinality(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<K, V> Cardinality for BTreeMap<K, V> {
    fn cardinality(&self) -> Option<usize> {
        Some(self.len())
    }
}
