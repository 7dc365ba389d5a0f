//! Module implement interned strings and their two-phase adder.
//!
//! Interning wants two things that pull in opposite directions: every
//! string needs a stable address the index can compare by at insertion
//! time, and the bodies of a batch of strings should land contiguously
//! in the arena. The two-phase protocol gets both. Inserting into the
//! set writes only an 8-byte pointer slot per new string, the slot's
//! low bit set to mark the body as pending; [StringAdder::flush] then
//! writes all bodies back to back and patches the slots. Callers must
//! flush the adder before committing the transaction.
//!
//! Store-resident bodies are 2-byte aligned, which is what frees the
//! low bit of the slot word for the pending marker.

use std::{cell::RefCell, fmt, ops, rc::Rc, result};

use crate::{
    hash::{CityHash, IndexHash},
    index::{registry::NameIndex, Key},
    store::{Store, Transaction},
    Address, Error, Result, TypedAddress,
};

// Low bit of a slot word; set while the body is still on the heap.
const IN_HEAP_MASK: u64 = 0x1;

/// A reference to an interned string in one of three states: in-memory
/// text that has not been inserted yet, an arena slot whose body is
/// still pending, or a fully interned store address.
///
/// Within one store, interned strings are unique, so two fully
/// interned strings are equal iff their body addresses are equal.
#[derive(Clone)]
pub enum IndirectString {
    /// Text not yet added to an index.
    Heap(Rc<str>),
    /// Pointer slot written by an index insertion; the body is written
    /// and the slot patched when the adder flushes.
    HeapSlot { slot: Address, body: Rc<str> },
    /// Address of a store-resident, 2-byte aligned body record.
    Store(Address),
}

/// Resolved string content; borrows in-memory text, owns a copy of
/// store-resident bodies.
pub enum StrView<'a> {
    Borrowed(&'a str),
    Owned(String),
}

impl<'a> ops::Deref for StrView<'a> {
    type Target = str;

    fn deref(&self) -> &str {
        match self {
            StrView::Borrowed(s) => s,
            StrView::Owned(s) => s,
        }
    }
}

impl IndirectString {
    pub fn from_text(text: &str) -> IndirectString {
        IndirectString::Heap(Rc::from(text))
    }

    /// True once the body is interned in the arena.
    pub fn is_in_store(&self) -> bool {
        matches!(self, IndirectString::Store(_))
    }

    /// Read the indirect string whose pointer slot is at `addr`.
    /// Reading a slot whose body was never flushed is refused.
    pub fn read(db: &Store, addr: TypedAddress<IndirectString>) -> Result<IndirectString> {
        let word = db.read_u64(addr.to_address())?;
        if word & IN_HEAP_MASK != 0 {
            return err_at!(BadAddress, msg: "string body still on heap, slot {}", addr.to_u64());
        }
        Ok(IndirectString::Store(Address::new(word)))
    }

    /// Resolve to the string content.
    pub fn as_str_view(&self, db: &Store) -> Result<StrView> {
        match self {
            IndirectString::Heap(body) => Ok(StrView::Borrowed(body)),
            IndirectString::HeapSlot { body, .. } => Ok(StrView::Borrowed(body)),
            IndirectString::Store(addr) => Ok(StrView::Owned(read_body(db, *addr)?)),
        }
    }

    pub fn to_text(&self, db: &Store) -> Result<String> {
        Ok(self.as_str_view(db)?.to_string())
    }
}

impl fmt::Debug for IndirectString {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            IndirectString::Heap(body) => write!(f, "IndirectString::Heap({:?})", body),
            IndirectString::HeapSlot { slot, body } => {
                write!(f, "IndirectString::HeapSlot({}, {:?})", slot, body)
            }
            IndirectString::Store(addr) => write!(f, "IndirectString::Store({})", addr),
        }
    }
}

// Body record: u64 length followed by the bytes.
fn read_body(db: &Store, addr: Address) -> Result<String> {
    let len = db.read_u64(addr)?;
    let view = db.getro(addr.checked_add(8)?, len)?;
    Ok(err_at!(FailConvert, std::str::from_utf8(&view))?.to_string())
}

impl Key for IndirectString {
    /// The serialized form is the 8-byte slot word; the body is written
    /// separately by the adder.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let word = match self {
            IndirectString::Heap(_) | IndirectString::HeapSlot { .. } => IN_HEAP_MASK,
            IndirectString::Store(addr) => addr.to_u64(),
        };
        buf.extend_from_slice(&word.to_le_bytes());
        Ok(())
    }

    fn decode(db: &Store, addr: Address) -> Result<(IndirectString, u64)> {
        let val = IndirectString::read(db, TypedAddress::new(addr))?;
        Ok((val, 8))
    }

    fn eq_key(&self, db: &Store, other: &Self) -> Result<bool> {
        match (self, other) {
            // All store-resident strings are unique, comparing the
            // body addresses suffices.
            (IndirectString::Store(a), IndirectString::Store(b)) => Ok(a == b),
            _ => {
                let (a, b) = (self.as_str_view(db)?, other.as_str_view(db)?);
                Ok(*a == *b)
            }
        }
    }
}

impl IndexHash<IndirectString> for CityHash {
    fn hash(&self, db: &Store, key: &IndirectString) -> Result<u64> {
        Ok(CityHash::hash_bytes(key.as_str_view(db)?.as_bytes()))
    }
}

/// Helper handling the two-phase addition of strings to an interning
/// index; see the module documentation.
#[derive(Default)]
pub struct StringAdder {
    // Slots waiting for their body, each a `HeapSlot`.
    pending: Vec<IndirectString>,
}

impl StringAdder {
    pub fn new() -> StringAdder {
        StringAdder { pending: vec![] }
    }

    /// `expected` is the anticipated number of strings to be added.
    pub fn with_capacity(expected: usize) -> StringAdder {
        StringAdder { pending: Vec::with_capacity(expected) }
    }

    /// Add `text` to an interning index. Returns the address of its
    /// pointer slot and whether the string was new. New strings are
    /// remembered for [StringAdder::flush].
    pub fn add(
        &mut self,
        txn: &mut Transaction,
        index: &Rc<RefCell<NameIndex>>,
        text: &str,
    ) -> Result<(Address, bool)> {
        let body: Rc<str> = Rc::from(text);
        let key = IndirectString::Heap(Rc::clone(&body));
        let (slot, inserted) = index.borrow_mut().insert(txn, key)?;
        if inserted {
            self.pending.push(IndirectString::HeapSlot { slot, body });
        }
        Ok((slot, inserted))
    }

    /// Write the body of every string added since the last flush and
    /// patch its pointer slot. Must run before the transaction commits.
    pub fn flush(&mut self, txn: &mut Transaction) -> Result<()> {
        for pending in self.pending.drain(..) {
            match pending {
                IndirectString::HeapSlot { slot, body } => {
                    let mut buf = Vec::with_capacity(8 + body.len());
                    buf.extend_from_slice(&(body.len() as u64).to_le_bytes());
                    buf.extend_from_slice(body.as_bytes());
                    let addr = txn.alloc_bytes(&buf, 2)?;
                    debug_assert!(addr.to_u64() & IN_HEAP_MASK == 0);

                    let mut view = txn.getrw(slot, 8)?;
                    view.copy_from_slice(&addr.to_u64().to_le_bytes());
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }
}

/// Read the string whose pointer slot is at `addr`, following the slot
/// to the interned body.
pub fn get_string_view(db: &Store, addr: TypedAddress<IndirectString>) -> Result<String> {
    IndirectString::read(db, addr)?.to_text(db)
}
