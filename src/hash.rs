//! Module implement 64-bit hashing for index keys.
//!
//! The trie layout on disk is a function of the key digest, so hash
//! functions here must be stable across processes and architectures.

use crate::{index::Digest, store::Store, Result};

/// Hash functor for index keys, produces the 64-bit digest consumed by
/// the trie six bits at a time.
///
/// Resolving a key may involve reading the store, keys like interned
/// strings hash by content that can live behind a store address.
pub trait IndexHash<K: ?Sized> {
    fn hash(&self, db: &Store, key: &K) -> Result<u64>;
}

/// Type uses google's city hash to convert byte-content keys into
/// ``u64``. Refer [cityhash_rs] for details.
#[derive(Clone, Copy, Default)]
pub struct CityHash;

impl CityHash {
    pub fn new() -> CityHash {
        CityHash
    }

    #[inline]
    pub fn hash_bytes(bytes: &[u8]) -> u64 {
        let digest = cityhash_rs::cityhash_110_128(bytes);
        ((digest >> 64) as u64) ^ ((digest & 0xFFFFFFFFFFFFFFFF) as u64)
    }
}

impl IndexHash<str> for CityHash {
    fn hash(&self, _db: &Store, key: &str) -> Result<u64> {
        Ok(CityHash::hash_bytes(key.as_bytes()))
    }
}

impl IndexHash<String> for CityHash {
    fn hash(&self, _db: &Store, key: &String) -> Result<u64> {
        Ok(CityHash::hash_bytes(key.as_bytes()))
    }
}

/// Hash functor for 128-bit content digests. The digest is already
/// uniformly distributed, its high half is digest enough.
#[derive(Clone, Copy, Default)]
pub struct DigestHash;

impl DigestHash {
    pub fn new() -> DigestHash {
        DigestHash
    }
}

impl IndexHash<Digest> for DigestHash {
    fn hash(&self, _db: &Store, key: &Digest) -> Result<u64> {
        Ok(key.high64())
    }
}
