//! Shader permutation tables
//!
//! A [`PermutationTable`] maps every value of a key enum to a compiled
//! resource. Tables are filled once at startup and refuse to build unless
//! every key produced a value.

use std::marker::PhantomData;

/// A finite key space for shader permutations.
pub trait Permutation: Copy + std::fmt::Debug {
    /// Number of distinct keys.
    const COUNT: usize;

    /// Dense index in `0..COUNT`.
    fn index(self) -> usize;

    /// Every key, in index order.
    fn all() -> Vec<Self>;
}

/// Error returned when a table is missing entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("permutation table incomplete: built {built} of {expected} variants")]
pub struct IncompleteTable {
    pub built: usize,
    pub expected: usize,
}

/// Lookup table from permutation key to compiled variant.
pub struct PermutationTable<K: Permutation, V> {
    entries: Vec<V>,
    _key: PhantomData<K>,
}

impl<K: Permutation, V> PermutationTable<K, V> {
    /// Build one value per key with `f`.
    pub fn build<E>(mut f: impl FnMut(K) -> Result<V, E>) -> Result<Self, E>
    where
        E: From<IncompleteTable>,
    {
        let keys = K::all();
        let mut entries = Vec::with_capacity(K::COUNT);
        for (i, key) in keys.into_iter().enumerate() {
            debug_assert_eq!(key.index(), i, "{key:?} out of index order");
            entries.push(f(key)?);
        }

        if entries.len() != K::COUNT {
            return Err(IncompleteTable {
                built: entries.len(),
                expected: K::COUNT,
            }
            .into());
        }

        Ok(Self {
            entries,
            _key: PhantomData,
        })
    }

    /// Get the variant for `key`.
    pub fn get(&self, key: K) -> &V {
        &self.entries[key.index()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
