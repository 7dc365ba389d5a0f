//! Module implement the two branch-node shapes of the trie.

use std::convert::TryInto;

use crate::{
    index::{depth_is_internal, IndexPointer, FANOUT},
    store::Store,
    Address, Error, Result,
};

/// Branch node holding up to 64 children, one per 6-bit hash slice. The
/// bitmap records which slots are populated; the children vector is
/// kept dense, child of slot `s` lives at the rank of `s` among the set
/// bits.
///
/// Store form: `u64` bitmap followed by `popcount(bitmap)` pointer
/// words.
pub struct InternalNode<K> {
    pub bitmap: u64,
    pub children: Vec<IndexPointer<K>>,
}

impl<K> InternalNode<K> {
    /// Node with a single populated slot.
    pub fn with_child(slot: usize, child: IndexPointer<K>) -> InternalNode<K> {
        InternalNode { bitmap: 1 << slot, children: vec![child] }
    }

    /// Node with two populated slots; `a_slot` and `b_slot` must
    /// differ.
    pub fn with_children(
        a_slot: usize,
        a: IndexPointer<K>,
        b_slot: usize,
        b: IndexPointer<K>,
    ) -> InternalNode<K> {
        debug_assert!(a_slot != b_slot);
        let bitmap = (1_u64 << a_slot) | (1 << b_slot);
        let children = if a_slot < b_slot { vec![a, b] } else { vec![b, a] };
        InternalNode { bitmap, children }
    }

    #[inline]
    pub fn has(&self, slot: usize) -> bool {
        (self.bitmap >> slot) & 1 == 1
    }

    // Rank of `slot` among the populated slots.
    #[inline]
    fn rank(&self, slot: usize) -> usize {
        (self.bitmap & ((1_u64 << slot) - 1)).count_ones() as usize
    }

    pub fn child(&self, slot: usize) -> Option<&IndexPointer<K>> {
        if self.has(slot) {
            Some(&self.children[self.rank(slot)])
        } else {
            None
        }
    }

    pub fn child_mut(&mut self, slot: usize) -> Option<&mut IndexPointer<K>> {
        if self.has(slot) {
            let at = self.rank(slot);
            Some(&mut self.children[at])
        } else {
            None
        }
    }

    /// Populate an empty slot.
    pub fn set_child(&mut self, slot: usize, child: IndexPointer<K>) {
        debug_assert!(!self.has(slot));
        let at = self.rank(slot);
        self.bitmap |= 1 << slot;
        self.children.insert(at, child);
    }

    pub fn decode(db: &Store, addr: Address) -> Result<InternalNode<K>> {
        let bitmap = db.read_u64(addr)?;
        let n = bitmap.count_ones() as u64;
        if n == 0 || n as usize > FANOUT {
            err_at!(FooterCorrupt, msg: "bad internal node bitmap {:x}", bitmap)?
        }
        let view = db.getro(addr.checked_add(8)?, n * 8)?;
        let mut children = Vec::with_capacity(n as usize);
        for i in 0..n as usize {
            let word = u64::from_le_bytes(view[i * 8..i * 8 + 8].try_into().unwrap());
            children.push(IndexPointer::decode_word(word));
        }
        Ok(InternalNode { bitmap, children })
    }
}

/// Branch node used once the hash is exhausted: a flat array of leaves
/// with equal 64-bit digests.
///
/// Store form: `u64` child count followed by that many pointer words.
pub struct LinearNode<K> {
    pub children: Vec<IndexPointer<K>>,
}

impl<K> LinearNode<K> {
    pub fn with_children(a: IndexPointer<K>, b: IndexPointer<K>) -> LinearNode<K> {
        LinearNode { children: vec![a, b] }
    }

    pub fn decode(db: &Store, addr: Address) -> Result<LinearNode<K>> {
        let n = db.read_u64(addr)?;
        let view = db.getro(addr.checked_add(8)?, n * 8)?;
        let mut children = Vec::with_capacity(n as usize);
        for i in 0..n as usize {
            let word = u64::from_le_bytes(view[i * 8..i * 8 + 8].try_into().unwrap());
            children.push(IndexPointer::decode_word(word));
        }
        Ok(LinearNode { children })
    }
}

/// Load the branch node at `addr` onto the heap; the shape is inferred
/// from the depth it was reached at. Children stay behind their store
/// pointers, this is the copy-on-write step of an insertion path.
pub fn load_node<K>(db: &Store, addr: Address, shifts: u32) -> Result<IndexPointer<K>> {
    if depth_is_internal(shifts) {
        Ok(IndexPointer::HeapInternal(Box::new(InternalNode::decode(db, addr)?)))
    } else {
        Ok(IndexPointer::HeapLinear(Box::new(LinearNode::decode(db, addr)?)))
    }
}
