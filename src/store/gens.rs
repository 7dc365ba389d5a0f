//! Module implement iteration over the revision chain.

use crate::{
    store::{layout::Trailer, Store},
    Result, TypedAddress,
};

/// Forward-only iterator walking the trailer chain from a revision back
/// to revision zero. Every trailer is re-validated as the chain is
/// followed; a violation surfaces as `FooterCorrupt`.
pub struct GenerationIter<'a> {
    db: &'a Store,
    pos: TypedAddress<Trailer>,
    done: bool,
}

impl<'a> GenerationIter<'a> {
    pub(crate) fn new(db: &'a Store, pos: TypedAddress<Trailer>) -> GenerationIter<'a> {
        GenerationIter { db, pos, done: false }
    }
}

impl<'a> Iterator for GenerationIter<'a> {
    type Item = Result<(TypedAddress<Trailer>, Trailer)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos.is_null() {
            return None;
        }
        match Trailer::validate(self.db, self.pos) {
            Ok(Some(trailer)) => {
                let pos = self.pos;
                self.pos = trailer.prev_generation;
                Some(Ok((pos, trailer)))
            }
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
#[path = "gens_test.rs"]
mod gens_test;
