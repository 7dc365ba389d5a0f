//! Module implement revision-to-revision index diffing.

use crate::{
    index::{load_node, IndexPointer, HASH_INDEX_BITS},
    store::{Store, TRAILER_SIZE},
    Address, Result,
};

/// Addresses of the leaves present in the trie under `root` that were
/// allocated after `old_revision`. An `old_revision` at or beyond the
/// current revision yields nothing.
///
/// Addresses below the threshold, one byte past the old revision's
/// trailer, were written before that revision was published; structural
/// sharing guarantees untouched subtrees keep such addresses, so whole
/// subtrees below the threshold are pruned unvisited. Every node and
/// leaf at or above it was (re)written by a newer revision.
pub(crate) fn diff<K>(
    db: &Store,
    root: &IndexPointer<K>,
    old_revision: u64,
) -> Result<Vec<Address>> {
    let current = db.get_current_revision()?;
    if old_revision >= current {
        return Ok(vec![]);
    }

    let (pos, _) = db.revision_trailer(old_revision)?;
    let threshold = pos.to_u64() + TRAILER_SIZE;

    let mut out = vec![];
    visit(db, root, 0, threshold, &mut out)?;
    Ok(out)
}

fn visit<K>(
    db: &Store,
    node: &IndexPointer<K>,
    shifts: u32,
    threshold: u64,
    out: &mut Vec<Address>,
) -> Result<()> {
    match node {
        IndexPointer::Null => Ok(()),
        // Heap pointers belong to the open transaction, always new.
        IndexPointer::HeapLeaf { addr, .. } => {
            out.push(*addr);
            Ok(())
        }
        IndexPointer::StoreLeaf(addr) => {
            if addr.to_u64() >= threshold {
                out.push(*addr);
            }
            Ok(())
        }
        IndexPointer::HeapInternal(intern) => {
            for child in intern.children.iter() {
                visit(db, child, shifts + HASH_INDEX_BITS, threshold, out)?;
            }
            Ok(())
        }
        IndexPointer::HeapLinear(linear) => {
            for child in linear.children.iter() {
                visit(db, child, shifts + HASH_INDEX_BITS, threshold, out)?;
            }
            Ok(())
        }
        IndexPointer::StoreNode(addr) => {
            if addr.to_u64() < threshold {
                return Ok(()); // subtree predates the old revision
            }
            let node = load_node::<K>(db, *addr, shifts)?;
            match &node {
                IndexPointer::HeapInternal(intern) => {
                    for child in intern.children.iter() {
                        visit(db, child, shifts + HASH_INDEX_BITS, threshold, out)?;
                    }
                }
                IndexPointer::HeapLinear(linear) => {
                    for child in linear.children.iter() {
                        visit(db, child, shifts + HASH_INDEX_BITS, threshold, out)?;
                    }
                }
                _ => unreachable!(),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "diff_test.rs"]
mod diff_test;
