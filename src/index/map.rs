//! Module implement the copy-on-write trie behind every index.

use std::{convert::TryInto, marker};

use crate::{
    index::{
        depth_is_internal, diff, hash_slice, load_node, pointer::IndexPointer,
        InternalNode, Key, LinearNode, Value, HASH_INDEX_BITS,
    },
    store::{Store, Transaction},
    Address, Error, IndexHash, Result,
};

// Persisted per-index record: entry count, generation flushed at, and
// the encoded root pointer word.
const RECORD_SIZE: u64 = 24;

/// A persistent hash-array-mapped-trie from `K` to `V`, hashed by `H`.
///
/// A map value is a view of one index at one revision. Obtain handles
/// through the store's typed accessors, for example
/// [Store::write_index][crate::store::Store]. Insertions require an
/// open [Transaction]; lookups can run against any revision.
pub struct Map<K, V, H> {
    root: IndexPointer<K>,
    len: u64,
    dirty: bool,
    // False when the owning store view is pinned to an old revision;
    // writes through such a view are refused.
    writable: bool,
    hasher: H,

    _val: marker::PhantomData<V>,
}

impl<K, V, H> Map<K, V, H>
where
    H: Default,
{
    /// A fresh, empty index.
    pub fn new(writable: bool) -> Map<K, V, H> {
        Map {
            root: IndexPointer::Null,
            len: 0,
            dirty: false,
            writable,
            hasher: H::default(),
            _val: marker::PhantomData,
        }
    }

    /// Load the index whose record was flushed at `record_addr`.
    pub fn open(db: &Store, record_addr: Address, writable: bool) -> Result<Map<K, V, H>> {
        let view = db.getro(record_addr, RECORD_SIZE)?;
        let len = u64::from_le_bytes(view[0..8].try_into().unwrap());
        let word = u64::from_le_bytes(view[16..24].try_into().unwrap());
        Ok(Map {
            root: IndexPointer::decode_word(word),
            len,
            dirty: false,
            writable,
            hasher: H::default(),
            _val: marker::PhantomData,
        })
    }
}

impl<K, V, H> Map<K, V, H> {
    /// Number of entries in this index.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if this index holds changes the next commit must flush.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The root pointer, for diffing and debugging.
    #[inline]
    pub fn root(&self) -> &IndexPointer<K> {
        &self.root
    }
}

impl<K, V, H> Map<K, V, H>
where
    K: Key,
    V: Value,
    H: IndexHash<K>,
{
    /// Insert `key`. Returns the address of the leaf record and whether
    /// an insert took place; an already-present key keeps its original
    /// value and its original leaf address.
    pub fn insert(
        &mut self,
        txn: &mut Transaction,
        key: K,
        value: V,
    ) -> Result<(Address, bool)> {
        self.insert_leaf(txn, key, value, false)
    }

    /// Insert `key`, overwriting the value if the key is already
    /// present. Returns `(leaf address, inserted)`; `inserted` is false
    /// when an existing entry was re-assigned.
    pub fn insert_or_assign(
        &mut self,
        txn: &mut Transaction,
        key: K,
        value: V,
    ) -> Result<(Address, bool)> {
        self.insert_leaf(txn, key, value, true)
    }

    fn insert_leaf(
        &mut self,
        txn: &mut Transaction,
        key: K,
        value: V,
        assign: bool,
    ) -> Result<(Address, bool)> {
        if !self.writable {
            return err_at!(IndexNotLatestRevision, msg: "write through old revision");
        }

        let hash = self.hasher.hash(txn.db(), &key)?;
        let leaf = {
            let mut buf = vec![];
            key.encode(&mut buf)?;
            value.encode(&mut buf)?;
            buf
        };

        let (addr, inserted, assigned) = insert_at(
            &self.hasher,
            txn,
            &mut self.root,
            &key,
            hash,
            0,
            &leaf,
            K::align(),
            assign,
        )?;
        if inserted {
            self.len += 1;
        }
        if inserted || assigned {
            self.dirty = true;
        }
        Ok((addr, inserted))
    }

    /// Find the leaf record for `key`. Returns its address, or `None`
    /// when the key is absent.
    pub fn find(&self, db: &Store, key: &K) -> Result<Option<Address>> {
        let hash = self.hasher.hash(db, key)?;
        find_at(db, &self.root, key, hash, 0)
    }

    /// Find `key` and decode its value.
    pub fn get(&self, db: &Store, key: &K) -> Result<Option<V>> {
        match self.find(db, key)? {
            Some(addr) => {
                let (_, consumed) = K::decode(db, addr)?;
                let (value, _) = V::decode(db, addr.checked_add(consumed)?)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Decode the leaf record at `addr` into its key and value.
    pub fn load_leaf(&self, db: &Store, addr: Address) -> Result<(K, V)> {
        let (key, consumed) = K::decode(db, addr)?;
        let (value, _) = V::decode(db, addr.checked_add(consumed)?)?;
        Ok((key, value))
    }

    /// Unordered iteration over all leaf addresses at this revision,
    /// including entries of the open transaction.
    pub fn iter<'a>(&'a self, db: &'a Store) -> Iter<'a, K> {
        Iter { db, stack: vec![(Frame::Child(&self.root), 0)], done: false }
    }

    /// Addresses of the leaves added after `old_revision`; see
    /// [crate::index] for how address-threshold pruning makes this
    /// proportional to the change.
    pub fn diff(&self, db: &Store, old_revision: u64) -> Result<Vec<Address>> {
        diff::diff(db, &self.root, old_revision)
    }

    /// Serialize every heap-resident node reachable from the root into
    /// the arena and write this index's record; returns the record
    /// address, or null for an empty index. Afterwards the in-memory
    /// trie holds only store pointers.
    pub fn flush(&mut self, txn: &mut Transaction, generation: u64) -> Result<Address> {
        if !self.writable {
            return err_at!(IndexNotLatestRevision, msg: "flush through old revision");
        }
        self.dirty = false;
        if self.root.is_null() {
            return Ok(Address::NULL);
        }

        let word = flush_node(txn, &mut self.root, 0)?;
        let mut buf = Vec::with_capacity(RECORD_SIZE as usize);
        buf.extend_from_slice(&self.len.to_le_bytes());
        buf.extend_from_slice(&generation.to_le_bytes());
        buf.extend_from_slice(&word.to_le_bytes());
        txn.alloc_bytes(&buf, 8)
    }
}

// Key of a leaf pointer; linear scans and split points need it.
fn leaf_key<K: Key>(db: &Store, leaf: &IndexPointer<K>) -> Result<K> {
    match leaf {
        IndexPointer::HeapLeaf { key, .. } => Ok(key.clone()),
        IndexPointer::StoreLeaf(addr) => Ok(K::decode(db, *addr)?.0),
        _ => err_at!(Fatal, msg: "not a leaf pointer"),
    }
}

#[allow(clippy::too_many_arguments)]
fn insert_at<K, H>(
    hasher: &H,
    txn: &mut Transaction,
    node: &mut IndexPointer<K>,
    key: &K,
    hash: u64,
    shifts: u32,
    leaf: &[u8],
    align: u64,
    assign: bool,
) -> Result<(Address, bool, bool)>
where
    K: Key,
    H: IndexHash<K>,
{
    match node {
        IndexPointer::Null => {
            let addr = txn.alloc_bytes(leaf, align)?;
            *node = IndexPointer::HeapLeaf { addr, key: key.clone() };
            Ok((addr, true, false))
        }

        IndexPointer::HeapLeaf { .. } | IndexPointer::StoreLeaf(_) => {
            let old_key = leaf_key(txn.db(), node)?;
            if key.eq_key(txn.db(), &old_key)? {
                if assign {
                    let addr = txn.alloc_bytes(leaf, align)?;
                    *node = IndexPointer::HeapLeaf { addr, key: key.clone() };
                    return Ok((addr, false, true));
                }
                let addr = match node.to_addr() {
                    Some(addr) => addr,
                    None => err_at!(Fatal, msg: "leaf without address")?,
                };
                return Ok((addr, false, false));
            }

            // Two distinct keys at one slot: push the displaced leaf
            // down until their hashes diverge or the hash runs out.
            let old_hash = hasher.hash(txn.db(), &old_key)?;
            let addr = txn.alloc_bytes(leaf, align)?;
            let displaced = node.take();
            let fresh = IndexPointer::HeapLeaf { addr, key: key.clone() };
            *node = split_leaves(displaced, old_hash, fresh, hash, shifts);
            Ok((addr, true, false))
        }

        IndexPointer::HeapInternal(intern) => {
            let slot = hash_slice(hash, shifts);
            if intern.has(slot) {
                let child = match intern.child_mut(slot) {
                    Some(child) => child,
                    None => unreachable!(),
                };
                insert_at(
                    hasher,
                    txn,
                    child,
                    key,
                    hash,
                    shifts + HASH_INDEX_BITS,
                    leaf,
                    align,
                    assign,
                )
            } else {
                let addr = txn.alloc_bytes(leaf, align)?;
                let fresh = IndexPointer::HeapLeaf { addr, key: key.clone() };
                intern.set_child(slot, fresh);
                Ok((addr, true, false))
            }
        }

        IndexPointer::HeapLinear(linear) => {
            for child in linear.children.iter_mut() {
                let child_key = leaf_key(txn.db(), child)?;
                if key.eq_key(txn.db(), &child_key)? {
                    if assign {
                        let addr = txn.alloc_bytes(leaf, align)?;
                        *child = IndexPointer::HeapLeaf { addr, key: key.clone() };
                        return Ok((addr, false, true));
                    }
                    let addr = match child.to_addr() {
                        Some(addr) => addr,
                        None => err_at!(Fatal, msg: "leaf without address")?,
                    };
                    return Ok((addr, false, false));
                }
            }
            let addr = txn.alloc_bytes(leaf, align)?;
            linear.children.push(IndexPointer::HeapLeaf { addr, key: key.clone() });
            Ok((addr, true, false))
        }

        IndexPointer::StoreNode(addr) => {
            // Copy-on-write: bring the node onto the heap, then insert
            // into the copy. Untouched siblings keep their addresses.
            let addr = *addr;
            *node = load_node(txn.db(), addr, shifts)?;
            insert_at(hasher, txn, node, key, hash, shifts, leaf, align, assign)
        }
    }
}

fn split_leaves<K>(
    a: IndexPointer<K>,
    a_hash: u64,
    b: IndexPointer<K>,
    b_hash: u64,
    shifts: u32,
) -> IndexPointer<K> {
    if !depth_is_internal(shifts) {
        return IndexPointer::HeapLinear(Box::new(LinearNode::with_children(a, b)));
    }
    let a_slot = hash_slice(a_hash, shifts);
    let b_slot = hash_slice(b_hash, shifts);
    if a_slot == b_slot {
        let child = split_leaves(a, a_hash, b, b_hash, shifts + HASH_INDEX_BITS);
        IndexPointer::HeapInternal(Box::new(InternalNode::with_child(a_slot, child)))
    } else {
        let node = InternalNode::with_children(a_slot, a, b_slot, b);
        IndexPointer::HeapInternal(Box::new(node))
    }
}

fn find_at<K: Key>(
    db: &Store,
    node: &IndexPointer<K>,
    key: &K,
    hash: u64,
    shifts: u32,
) -> Result<Option<Address>> {
    match node {
        IndexPointer::Null => Ok(None),
        IndexPointer::HeapLeaf { addr, key: leaf_key } => {
            if key.eq_key(db, leaf_key)? {
                Ok(Some(*addr))
            } else {
                Ok(None)
            }
        }
        IndexPointer::StoreLeaf(addr) => {
            let leaf_key = K::decode(db, *addr)?.0;
            if key.eq_key(db, &leaf_key)? {
                Ok(Some(*addr))
            } else {
                Ok(None)
            }
        }
        IndexPointer::HeapInternal(intern) => match intern.child(hash_slice(hash, shifts)) {
            Some(child) => find_at(db, child, key, hash, shifts + HASH_INDEX_BITS),
            None => Ok(None),
        },
        IndexPointer::HeapLinear(linear) => {
            for child in linear.children.iter() {
                let child_key = leaf_key(db, child)?;
                if key.eq_key(db, &child_key)? {
                    return Ok(child.to_addr());
                }
            }
            Ok(None)
        }
        IndexPointer::StoreNode(addr) => {
            let node = load_node(db, *addr, shifts)?;
            find_at(db, &node, key, hash, shifts)
        }
    }
}

// Depth-first flush of the heap portion, children before parents;
// returns the node's pointer word.
fn flush_node<K>(
    txn: &mut Transaction,
    node: &mut IndexPointer<K>,
    shifts: u32,
) -> Result<u64> {
    let (flushed, word) = match node {
        IndexPointer::Null => return Ok(0),
        IndexPointer::StoreLeaf(_) | IndexPointer::StoreNode(_) => {
            return node.encode_word()
        }
        IndexPointer::HeapLeaf { addr, .. } => {
            let addr = *addr;
            (IndexPointer::StoreLeaf(addr), addr.to_u64())
        }
        IndexPointer::HeapInternal(intern) => {
            let mut buf = Vec::with_capacity(8 + intern.children.len() * 8);
            buf.extend_from_slice(&intern.bitmap.to_le_bytes());
            for child in intern.children.iter_mut() {
                let word = flush_node(txn, child, shifts + HASH_INDEX_BITS)?;
                buf.extend_from_slice(&word.to_le_bytes());
            }
            let addr = txn.alloc_bytes(&buf, 8)?;
            (IndexPointer::StoreNode(addr), addr.to_u64() | crate::index::BRANCH_BIT)
        }
        IndexPointer::HeapLinear(linear) => {
            let mut buf = Vec::with_capacity(8 + linear.children.len() * 8);
            buf.extend_from_slice(&(linear.children.len() as u64).to_le_bytes());
            for child in linear.children.iter_mut() {
                let word = flush_node(txn, child, shifts + HASH_INDEX_BITS)?;
                buf.extend_from_slice(&word.to_le_bytes());
            }
            let addr = txn.alloc_bytes(&buf, 8)?;
            (IndexPointer::StoreNode(addr), addr.to_u64() | crate::index::BRANCH_BIT)
        }
    };
    *node = flushed;
    Ok(word)
}

enum Frame<'a, K> {
    Child(&'a IndexPointer<K>),
    Owned(IndexPointer<K>),
}

/// Unordered iterator over the leaf addresses of one index. Walking
/// into the store may fault pages but never mutates the database view.
pub struct Iter<'a, K> {
    db: &'a Store,
    stack: Vec<(Frame<'a, K>, u32)>,
    done: bool,
}

impl<'a, K: Key> Iter<'a, K> {
    // Decode the store branch at `addr` and queue its children, which
    // are store forms by construction.
    fn push_store(&mut self, addr: Address, shifts: u32) -> Result<()> {
        let children = match load_node::<K>(self.db, addr, shifts)? {
            IndexPointer::HeapInternal(intern) => intern.children,
            IndexPointer::HeapLinear(linear) => linear.children,
            _ => unreachable!(),
        };
        for child in children {
            self.stack.push((Frame::Owned(child), shifts + HASH_INDEX_BITS));
        }
        Ok(())
    }
}

impl<'a, K: Key> Iterator for Iter<'a, K> {
    type Item = Result<Address>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while let Some((frame, shifts)) = self.stack.pop() {
            let store_branch = match frame {
                Frame::Child(node) => match node {
                    IndexPointer::Null => continue,
                    IndexPointer::HeapLeaf { addr, .. } => return Some(Ok(*addr)),
                    IndexPointer::StoreLeaf(addr) => return Some(Ok(*addr)),
                    IndexPointer::HeapInternal(intern) => {
                        for child in intern.children.iter() {
                            self.stack
                                .push((Frame::Child(child), shifts + HASH_INDEX_BITS));
                        }
                        continue;
                    }
                    IndexPointer::HeapLinear(linear) => {
                        for child in linear.children.iter() {
                            self.stack
                                .push((Frame::Child(child), shifts + HASH_INDEX_BITS));
                        }
                        continue;
                    }
                    IndexPointer::StoreNode(addr) => *addr,
                },
                Frame::Owned(node) => match node {
                    IndexPointer::Null => continue,
                    IndexPointer::StoreLeaf(addr) => return Some(Ok(addr)),
                    IndexPointer::StoreNode(addr) => addr,
                    // Decoded store nodes never hold heap children.
                    _ => unreachable!(),
                },
            };
            if let Err(err) = self.push_store(store_branch, shifts) {
                self.done = true;
                return Some(Err(err));
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod map_test;
