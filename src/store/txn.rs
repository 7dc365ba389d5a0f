//! Module implement write transactions over a store.

use fs2::FileExt;
use log::debug;

use std::{fs, path};

use crate::{
    index::registry::IndexKind,
    store::{
        layout::{Trailer, NUM_INDICES, TRAILER_SIZE},
        regions::{View, ViewMut},
        AccessMode, Store,
    },
    Address, Error, Result,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    // No bytes allocated yet; commit is a no-op.
    Open,
    // At least one allocation.
    Active,
    Committed,
    RolledBack,
}

/// A write transaction. At most one transaction can be open per store
/// file at a time, across threads and across processes; [Transaction::begin]
/// blocks on an exclusive file lock until it is the writer.
///
/// Dropping an uncommitted transaction rolls it back.
pub struct Transaction<'a> {
    db: &'a Store,
    // Exclusive lock on a private descriptor; released on drop.
    _lock: fs::File,
    // First address allocated by this transaction, null while `Open`.
    first: Address,
    // Bytes allocated so far, alignment padding included.
    size: u64,
    state: State,
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        match self.state {
            State::Open | State::Active => {
                self.rollback().ok();
            }
            State::Committed | State::RolledBack => (),
        }
    }
}

impl<'a> Transaction<'a> {
    /// Begin a transaction. Blocks until the writer lock is acquired,
    /// then syncs `db` to the head revision.
    pub fn begin(db: &'a Store) -> Result<Transaction<'a>> {
        if db.as_config().access_mode == AccessMode::ReadOnly {
            return err_at!(ReadOnlyStore, msg: "begin on read-only store");
        }

        let lock = {
            let loc = db.to_location();
            let mut opts = fs::OpenOptions::new();
            let fd = err_at!(IOError, opts.read(true).open(path::Path::new(&loc)))?;
            err_at!(IOError, fd.lock_exclusive(), "writer lock {:?}", loc)?;
            fd
        };

        db.sync()?;

        Ok(Transaction {
            db,
            _lock: lock,
            first: Address::NULL,
            size: 0,
            state: State::Open,
        })
    }

    #[inline]
    pub fn db(&self) -> &Store {
        self.db
    }

    /// True if this transaction has allocated bytes that are neither
    /// committed nor rolled back.
    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Allocate `size` bytes at `align` boundary. The bytes are
    /// uninitialized and writable through [Transaction::getrw].
    pub fn allocate(&mut self, size: u64, align: u64) -> Result<Address> {
        match self.state {
            State::Open | State::Active => (),
            State::Committed | State::RolledBack => {
                err_at!(CannotAllocateAfterCommit, msg: "state {:?}", self.state)?
            }
        }

        let old = self.db.watermark();
        let addr = self.db.allocate(size, align)?;
        if self.first.is_null() {
            self.first = addr;
            self.state = State::Active;
        }
        // Account the actual number of bytes consumed, which may exceed
        // `size` by the alignment padding.
        self.size += self.db.watermark() - old;
        Ok(addr)
    }

    /// Convenience: allocate aligned space for `data` and copy it in.
    pub fn alloc_bytes(&mut self, data: &[u8], align: u64) -> Result<Address> {
        let addr = self.allocate(data.len() as u64, align)?;
        let mut view = self.getrw(addr, data.len() as u64)?;
        view.copy_from_slice(data);
        Ok(addr)
    }

    /// Read-only view, may reach any committed byte as well as this
    /// transaction's own bytes.
    pub fn getro(&self, addr: Address, size: u64) -> Result<View> {
        self.db.getro(addr, size)
    }

    /// Writable view over bytes this transaction allocated. Requests
    /// outside `[first, first+size)` are refused.
    pub fn getrw(&mut self, addr: Address, size: u64) -> Result<ViewMut> {
        if self.state != State::Active {
            return err_at!(WriteOutsideTransaction, msg: "state {:?}", self.state);
        }
        let (a, end) = (addr.to_u64(), addr.checked_add(size)?.to_u64());
        let (first, limit) = (self.first.to_u64(), self.first.to_u64() + self.size);
        if a < first || end > limit {
            return err_at!(
                WriteOutsideTransaction,
                msg: "{}+{} outside [{}, {})", a, size, first, limit
            );
        }
        self.db.getrw_raw(addr, size, true)
    }

    /// Commit, making this transaction's bytes a new revision. The
    /// returned generation number identifies it. Committing a
    /// transaction that allocated nothing is a no-op.
    pub fn commit(&mut self) -> Result<u64> {
        match self.state {
            State::Active => (),
            State::Open => {
                self.state = State::Committed;
                return self.db.get_current_revision();
            }
            State::Committed | State::RolledBack => {
                err_at!(Fatal, msg: "commit on closed transaction {:?}", self.state)?
            }
        }

        let prev_pos = self.db.footer_pos();
        let prev = self.db.current_trailer()?;
        let generation = prev.generation + 1;

        // Flush modified indices first; flushing allocates and writes
        // more bytes, all of which must precede the trailer.
        let mut locations = prev.index_records;
        self.flush_indices(&mut locations, generation)?;

        let trailer_addr = self.allocate(TRAILER_SIZE, 8)?;
        let trailer = Trailer {
            generation,
            // The revision's size does not include the trailer itself.
            size: self.size - TRAILER_SIZE,
            time: crate::store::time_to_ms()?,
            prev_generation: prev_pos,
            index_records: locations,
        };
        {
            let mut view = self.getrw(trailer_addr, TRAILER_SIZE)?;
            view.copy_from_slice(&trailer.encode());
        }

        // The linearisation point: a release-store of the trailer
        // address into the header's footer_pos word.
        self.db.publish(trailer_addr, self.first)?;
        self.db.protect(self.first, trailer_addr.to_u64() + TRAILER_SIZE)?;

        self.state = State::Committed;
        debug!(
            target: "aodb",
            "committed revision {}, {} bytes at {}",
            generation,
            trailer.size,
            self.first
        );
        Ok(generation)
    }

    /// Discard this transaction. The arena high-water mark snaps back
    /// to the previous revision; the file stays physically extended and
    /// the space is reused by the next transaction.
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            State::Open | State::Active => {
                self.db.rollback_watermark();
                // In-memory index state may reference rolled-back bytes.
                self.db.index_cache().borrow_mut().reset();
                self.state = State::RolledBack;
                debug!(target: "aodb", "rolled back {} bytes", self.size);
                Ok(())
            }
            State::Committed | State::RolledBack => Ok(()),
        }
    }

    // Write out any indices that have been modified; the unmodified
    // ones keep pointing at their previous incarnation.
    fn flush_indices(
        &mut self,
        locations: &mut [Address; NUM_INDICES],
        generation: u64,
    ) -> Result<()> {
        let snapshot = self.db.index_cache().borrow().clone();

        if let Some(ix) = snapshot.name {
            let mut ix = ix.borrow_mut();
            if ix.is_dirty() {
                locations[IndexKind::Name as usize] = ix.flush(self, generation)?;
            }
        }
        if let Some(ix) = snapshot.path {
            let mut ix = ix.borrow_mut();
            if ix.is_dirty() {
                locations[IndexKind::Path as usize] = ix.flush(self, generation)?;
            }
        }
        if let Some(ix) = snapshot.fragment {
            let mut ix = ix.borrow_mut();
            if ix.is_dirty() {
                locations[IndexKind::Fragment as usize] = ix.flush(self, generation)?;
            }
        }
        if let Some(ix) = snapshot.compilation {
            let mut ix = ix.borrow_mut();
            if ix.is_dirty() {
                locations[IndexKind::Compilation as usize] = ix.flush(self, generation)?;
            }
        }
        if let Some(ix) = snapshot.debug_line_header {
            let mut ix = ix.borrow_mut();
            if ix.is_dirty() {
                locations[IndexKind::DebugLineHeader as usize] =
                    ix.flush(self, generation)?;
            }
        }
        if let Some(ix) = snapshot.write {
            let mut ix = ix.borrow_mut();
            if ix.is_dirty() {
                locations[IndexKind::Write as usize] = ix.flush(self, generation)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "txn_test.rs"]
mod txn_test;
