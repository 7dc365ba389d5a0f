//! Module implement persistent hash-array-mapped-trie indices.
//!
//! A single trie, [Map], serves both maps and sets, a [Set] is a map
//! whose value type is zero-sized. The 64-bit key digest is consumed
//! six bits at a time giving a fan-out of 64; once the digest is
//! exhausted colliding keys spill into flat _linear_ nodes.
//!
//! While a transaction is open, modified nodes live on the heap and are
//! mutated in place; everything else stays behind store addresses. At
//! commit the heap portion is serialized bottom-up into the arena,
//! [Map::flush], after which the in-memory trie holds only store
//! pointers. Unmodified subtrees keep the store address they had in the
//! previous revision, which is what makes [Map::diff] cheap: subtrees
//! whose address predates the old revision cannot contain newer
//! entries and are pruned unvisited.
//!
//! Iteration order over a trie is undefined, callers must not rely on
//! it.

use std::convert::TryInto;

use crate::{store::Store, Address, Error, Extent, Result};

mod diff;
mod map;
mod node;
mod pointer;
pub mod registry;
mod set;

pub use map::{Iter, Map};
pub use pointer::IndexPointer;
pub use registry::{
    Compilation, CompilationIndex, DebugLineHeaderIndex, Digest, Fragment,
    FragmentIndex, IndexKind, NameIndex, PathIndex, WriteIndex,
};
pub use set::Set;

pub(crate) use node::{load_node, InternalNode, LinearNode};

/// Number of hash bits consumed per trie level.
pub const HASH_INDEX_BITS: u32 = 6;

/// Fan-out of an internal node.
pub const FANOUT: usize = 1 << HASH_INDEX_BITS;

// Deepest shift count at which hash bits remain; past this, linear
// nodes hold all colliding keys.
pub(crate) const MAX_HASH_SHIFTS: u32 = 60;

// Persisted pointer words tag branch nodes in their top bit; leaf
// addresses are stored untagged.
pub(crate) const BRANCH_BIT: u64 = 1 << 63;

#[inline]
pub(crate) fn depth_is_internal(shifts: u32) -> bool {
    shifts <= MAX_HASH_SHIFTS
}

#[inline]
pub(crate) fn hash_slice(hash: u64, shifts: u32) -> usize {
    ((hash >> shifts) & 0x3F) as usize
}

/// Types usable as index keys. Keys serialize into the leading bytes of
/// a leaf record; equality may need to resolve content behind a store
/// address, hence the `db` parameter.
pub trait Key: Clone {
    /// Append the serialized form of this key to `buf`.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a key from the leaf record at `addr`. Returns the key and
    /// the number of bytes consumed.
    fn decode(db: &Store, addr: Address) -> Result<(Self, u64)>;

    /// Content equality between two keys of the same store.
    fn eq_key(&self, db: &Store, other: &Self) -> Result<bool>;

    /// Alignment of the leaf record in the arena.
    fn align() -> u64 {
        8
    }
}

/// Types usable as index values, serialized into a leaf record directly
/// behind their key.
pub trait Value: Clone {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a value at `addr`. Returns the value and the number of
    /// bytes consumed.
    fn decode(db: &Store, addr: Address) -> Result<(Self, u64)>;
}

impl Key for String {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&(self.len() as u64).to_le_bytes());
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }

    fn decode(db: &Store, addr: Address) -> Result<(String, u64)> {
        let len = db.read_u64(addr)?;
        let view = db.getro(addr.checked_add(8)?, len)?;
        let key = err_at!(FailConvert, std::str::from_utf8(&view))?.to_string();
        Ok((key, 8 + len))
    }

    fn eq_key(&self, _db: &Store, other: &Self) -> Result<bool> {
        Ok(self == other)
    }
}

// Set indices carry no value bytes at all.
impl Value for () {
    fn encode(&self, _buf: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn decode(_db: &Store, _addr: Address) -> Result<((), u64)> {
        Ok(((), 0))
    }
}

impl<T> Value for Extent<T> {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.addr.to_u64().to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        Ok(())
    }

    fn decode(db: &Store, addr: Address) -> Result<(Extent<T>, u64)> {
        let view = db.getro(addr, 16)?;
        let a = u64::from_le_bytes(view[0..8].try_into().unwrap());
        let size = u64::from_le_bytes(view[8..16].try_into().unwrap());
        let val = Extent::new(crate::TypedAddress::new(Address::new(a)), size);
        Ok((val, 16))
    }
}
