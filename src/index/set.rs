//! Module implement set indices as maps with a zero-sized value.

use crate::{
    index::{Iter, Key, Map},
    store::{Store, Transaction},
    Address, IndexHash, Result,
};

/// A persistent trie of keys without values; the interned-string
/// indices are sets of [crate::istring::IndirectString].
pub struct Set<K, H> {
    map: Map<K, (), H>,
}

impl<K, H> Set<K, H>
where
    H: Default,
{
    pub fn new(writable: bool) -> Set<K, H> {
        Set { map: Map::new(writable) }
    }

    pub fn open(db: &Store, record_addr: Address, writable: bool) -> Result<Set<K, H>> {
        Ok(Set { map: Map::open(db, record_addr, writable)? })
    }
}

impl<K, H> Set<K, H> {
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.map.is_dirty()
    }

    #[inline]
    pub fn root(&self) -> &crate::index::IndexPointer<K> {
        self.map.root()
    }
}

impl<K, H> Set<K, H>
where
    K: Key,
    H: IndexHash<K>,
{
    /// Insert `key` if not already present. Returns the address of its
    /// leaf record and whether an insert took place.
    pub fn insert(&mut self, txn: &mut Transaction, key: K) -> Result<(Address, bool)> {
        self.map.insert(txn, key, ())
    }

    pub fn find(&self, db: &Store, key: &K) -> Result<Option<Address>> {
        self.map.find(db, key)
    }

    pub fn load_leaf(&self, db: &Store, addr: Address) -> Result<K> {
        Ok(self.map.load_leaf(db, addr)?.0)
    }

    pub fn iter<'a>(&'a self, db: &'a Store) -> Iter<'a, K> {
        self.map.iter(db)
    }

    pub fn diff(&self, db: &Store, old_revision: u64) -> Result<Vec<Address>> {
        self.map.diff(db, old_revision)
    }

    pub fn flush(&mut self, txn: &mut Transaction, generation: u64) -> Result<Address> {
        self.map.flush(txn, generation)
    }
}

#[cfg(test)]
#[path = "set_test.rs"]
mod set_test;
