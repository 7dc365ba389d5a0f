//! Module implement the fixed registry of persisted indices.
//!
//! Every trailer carries one record slot per [IndexKind]. The store
//! lazily loads each index from the current trailer on first access
//! and caches the handle; at commit the transaction flushes every
//! loaded index that was modified and patches its slot.

use std::{cell::RefCell, convert::TryInto, fmt, rc::Rc, result};

use crate::{
    hash::{CityHash, DigestHash},
    index::{Key, Map, Set},
    istring::IndirectString,
    store::Store,
    Address, Extent, Result,
};

/// The kinds of index persisted in every trailer, in slot order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum IndexKind {
    /// Interned names, a set of indirect strings.
    Name = 0,
    /// Interned file paths, a set of indirect strings.
    Path = 1,
    /// Machine-code fragments by content digest.
    Fragment = 2,
    /// Compilation records by content digest.
    Compilation = 3,
    /// Debug line headers by content digest.
    DebugLineHeader = 4,
    /// Free-form key/value storage for tooling.
    Write = 5,
}

impl IndexKind {
    pub fn all() -> [IndexKind; 6] {
        [
            IndexKind::Name,
            IndexKind::Path,
            IndexKind::Fragment,
            IndexKind::Compilation,
            IndexKind::DebugLineHeader,
            IndexKind::Write,
        ]
    }
}

/// 128-bit content digest keying the artifact indices. The payload
/// encoders compute it; this package only stores and compares it.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Digest(pub u128);

impl Digest {
    #[inline]
    pub fn high64(&self) -> u64 {
        (self.0 >> 64) as u64
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{:032x}", self.0)
    }
}

impl Key for Digest {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.0.to_le_bytes());
        Ok(())
    }

    fn decode(db: &Store, addr: Address) -> Result<(Digest, u64)> {
        let view = db.getro(addr, 16)?;
        let val = u128::from_le_bytes(view[0..16].try_into().unwrap());
        Ok((Digest(val), 16))
    }

    fn eq_key(&self, _db: &Store, other: &Self) -> Result<bool> {
        Ok(self == other)
    }
}

/// Opaque marker for machine-code fragment payloads; their schema
/// belongs to the payload encoders.
pub struct Fragment;

/// Opaque marker for compilation-record payloads.
pub struct Compilation;

pub type NameIndex = Set<IndirectString, CityHash>;
pub type PathIndex = Set<IndirectString, CityHash>;
pub type FragmentIndex = Map<Digest, Extent<Fragment>, DigestHash>;
pub type CompilationIndex = Map<Digest, Extent<Compilation>, DigestHash>;
pub type DebugLineHeaderIndex = Map<Digest, Extent<u8>, DigestHash>;
pub type WriteIndex = Map<String, Extent<u8>, CityHash>;

// Per-handle cache of loaded index objects, reset whenever the view
// moves to a different revision.
#[derive(Clone, Default)]
pub struct IndexCache {
    pub(crate) name: Option<Rc<RefCell<NameIndex>>>,
    pub(crate) path: Option<Rc<RefCell<PathIndex>>>,
    pub(crate) fragment: Option<Rc<RefCell<FragmentIndex>>>,
    pub(crate) compilation: Option<Rc<RefCell<CompilationIndex>>>,
    pub(crate) debug_line_header: Option<Rc<RefCell<DebugLineHeaderIndex>>>,
    pub(crate) write: Option<Rc<RefCell<WriteIndex>>>,
}

impl IndexCache {
    pub(crate) fn reset(&mut self) {
        *self = IndexCache::default();
    }
}

macro_rules! index_accessor {
    ($(#[$attr:meta])* $fn_name:ident, $field:ident, $kind:ident, $typ:ty) => {
        $(#[$attr])*
        pub fn $fn_name(&self, create: bool) -> Result<Option<Rc<RefCell<$typ>>>> {
            {
                let cache = self.index_cache().borrow();
                if let Some(ix) = &cache.$field {
                    return Ok(Some(Rc::clone(ix)));
                }
            }

            let record = self.current_trailer()?.index_records[IndexKind::$kind as usize];
            let writable = !self.is_pinned();
            let ix = if record.is_null() {
                if !create {
                    return Ok(None);
                }
                <$typ>::new(writable)
            } else {
                <$typ>::open(self, record, writable)?
            };

            let ix = Rc::new(RefCell::new(ix));
            self.index_cache().borrow_mut().$field = Some(Rc::clone(&ix));
            Ok(Some(ix))
        }
    };
}

impl Store {
    index_accessor!(
        /// The interned-name index, loading it from the viewed revision
        /// on first access. With `create` false an absent index yields
        /// `None` instead of an empty one.
        name_index, name, Name, NameIndex
    );
    index_accessor!(
        /// The interned-path index; see [Store::name_index].
        path_index, path, Path, PathIndex
    );
    index_accessor!(
        /// Fragment digests to payload extents; see [Store::name_index].
        fragment_index, fragment, Fragment, FragmentIndex
    );
    index_accessor!(
        /// Compilation digests to payload extents; see [Store::name_index].
        compilation_index, compilation, Compilation, CompilationIndex
    );
    index_accessor!(
        /// Debug-line-header digests to raw extents; see [Store::name_index].
        debug_line_header_index, debug_line_header, DebugLineHeader, DebugLineHeaderIndex
    );
    index_accessor!(
        /// Free-form string keys to raw extents; see [Store::name_index].
        write_index, write, Write, WriteIndex
    );
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
