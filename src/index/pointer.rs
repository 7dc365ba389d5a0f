//! Module implement the tagged pointer connecting trie nodes.

use std::mem;

use crate::{
    index::{InternalNode, LinearNode, BRANCH_BIT},
    Address, Error, Result,
};

/// Reference to a trie node, distinguishing heap-resident from
/// store-resident and leaf from branch.
///
/// Heap variants exist only while the owning transaction is open; the
/// persisted forms are `StoreLeaf` and `StoreNode`. A heap leaf carries
/// its decoded key so that comparisons during the transaction never
/// re-read leaf bytes that may still be getting patched, along with the
/// arena address its record was written to.
pub enum IndexPointer<K> {
    Null,
    HeapInternal(Box<InternalNode<K>>),
    HeapLinear(Box<LinearNode<K>>),
    HeapLeaf { addr: Address, key: K },
    /// Internal or linear node in the store; which of the two is a
    /// function of the depth it is found at.
    StoreNode(Address),
    StoreLeaf(Address),
}

impl<K> IndexPointer<K> {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, IndexPointer::Null)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, IndexPointer::HeapLeaf { .. } | IndexPointer::StoreLeaf(_))
    }

    #[inline]
    pub fn is_heap(&self) -> bool {
        matches!(
            self,
            IndexPointer::HeapInternal(_)
                | IndexPointer::HeapLinear(_)
                | IndexPointer::HeapLeaf { .. }
        )
    }

    pub fn take(&mut self) -> IndexPointer<K> {
        mem::replace(self, IndexPointer::Null)
    }

    /// Serialize into a pointer word. Only store forms and null can be
    /// persisted; flushing converts heap forms first.
    pub fn encode_word(&self) -> Result<u64> {
        match self {
            IndexPointer::Null => Ok(0),
            IndexPointer::StoreLeaf(addr) => Ok(addr.to_u64()),
            IndexPointer::StoreNode(addr) => Ok(addr.to_u64() | BRANCH_BIT),
            _ => err_at!(Fatal, msg: "cannot persist heap pointer"),
        }
    }

    pub fn decode_word(word: u64) -> IndexPointer<K> {
        if word == 0 {
            IndexPointer::Null
        } else if (word & BRANCH_BIT) != 0 {
            IndexPointer::StoreNode(Address::new(word & !BRANCH_BIT))
        } else {
            IndexPointer::StoreLeaf(Address::new(word))
        }
    }

    /// Address of the referent, for store forms and heap leaves.
    pub fn to_addr(&self) -> Option<Address> {
        match self {
            IndexPointer::StoreLeaf(addr) | IndexPointer::StoreNode(addr) => Some(*addr),
            IndexPointer::HeapLeaf { addr, .. } => Some(*addr),
            _ => None,
        }
    }
}
