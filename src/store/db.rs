//! Module implement the database handle over a store file.

use log::debug;
use uuid::Uuid;

use std::{
    cell::{Cell, RefCell},
    ffi, fs, mem, path,
};

use crate::{
    index::registry::IndexCache,
    store::{
        gens::GenerationIter,
        layout::{Header, Trailer, HEADER_SIZE, TRAILER_SIZE},
        regions::{Regions, View, ViewMut},
        AccessMode, Config,
    },
    Address, Error, Result, TypedAddress,
};

/// Handle over a single store file.
///
/// A `Store` value is a _view_ onto the file at one revision, normally
/// the head. It must not be shared between threads; concurrent readers
/// each open their own handle on the same path and cooperate through
/// the shared file pages. [Store::sync] moves the view to the current
/// head, [Store::sync_to] pins it to an older revision for time-travel
/// reads.
pub struct Store {
    config: Config,
    loc: ffi::OsString,
    header: Header,
    regions: RefCell<Regions>,
    // Trailer address of the revision this handle is viewing.
    head: Cell<u64>,
    // End of the addressable arena; advances as the open transaction
    // allocates, snaps back to the committed end on rollback.
    wm: Cell<u64>,
    pinned: Cell<bool>,
    indices: RefCell<IndexCache>,
}

impl Store {
    /// Create a fresh store file under `config.dir`, removing any stale
    /// file of the same name. The new store is at revision zero.
    pub fn create(config: Config) -> Result<Store> {
        if config.access_mode == AccessMode::ReadOnly {
            return err_at!(ReadOnlyStore, msg: "create requires read-write access");
        }

        let loc = config.to_location();
        let file = {
            let os_file = path::Path::new(&loc);
            fs::remove_file(os_file).ok(); // NOTE: ignore remove errors.
            match os_file.parent() {
                Some(parent) => err_at!(IOError, fs::create_dir_all(parent))?,
                None => err_at!(InvalidFile, msg: "{:?}", loc)?,
            };
            let mut opts = fs::OpenOptions::new();
            err_at!(IOError, opts.read(true).write(true).create_new(true).open(os_file))?
        };

        let regions = Regions::new(file, config.region_size, true)?;
        let header = Header::new(*Uuid::new_v4().as_bytes());

        let val = Store {
            config,
            loc: loc.clone(),
            header,
            regions: RefCell::new(regions),
            head: Cell::new(HEADER_SIZE),
            wm: Cell::new(HEADER_SIZE + TRAILER_SIZE),
            pinned: Cell::new(false),
            indices: RefCell::new(IndexCache::default()),
        };

        val.regions.borrow_mut().grow(HEADER_SIZE + TRAILER_SIZE)?;
        {
            let mut view = val.getrw_raw(Address::NULL, HEADER_SIZE, false)?;
            view.copy_from_slice(&val.header.encode());
        }
        {
            let trailer = Trailer::initial(crate::store::time_to_ms()?);
            let mut view =
                val.getrw_raw(Address::new(HEADER_SIZE), TRAILER_SIZE, false)?;
            view.copy_from_slice(&trailer.encode());
        }
        {
            let regions = val.regions.borrow();
            regions.flush(0, HEADER_SIZE + TRAILER_SIZE)?;
            regions.set_footer_pos(HEADER_SIZE);
            regions.flush(0, HEADER_SIZE)?;
        }

        debug!(
            target: "aodb",
            "created store {:?} uuid {}",
            val.loc,
            Uuid::from_bytes(val.header.uuid)
        );
        Ok(val)
    }

    /// Open an existing store file, validating the header and the
    /// current revision's trailer.
    pub fn open(config: Config) -> Result<Store> {
        let loc = config.to_location();
        let writable = config.access_mode == AccessMode::ReadWrite;
        let file = {
            let mut opts = fs::OpenOptions::new();
            opts.read(true).write(writable);
            err_at!(IOError, opts.open(path::Path::new(&loc)), "open {:?}", loc)?
        };

        let regions = Regions::new(file, config.region_size, writable)?;
        if regions.len() < HEADER_SIZE + TRAILER_SIZE {
            err_at!(InvalidFile, msg: "file too small {}", regions.len())?
        }

        let header = Header::decode(&regions.view(0, HEADER_SIZE)?)?;
        let len = regions.len();

        let val = Store {
            config,
            loc: loc.clone(),
            header,
            regions: RefCell::new(regions),
            head: Cell::new(0),
            wm: Cell::new(len),
            pinned: Cell::new(false),
            indices: RefCell::new(IndexCache::default()),
        };
        val.sync()?;

        debug!(
            target: "aodb",
            "opened store {:?} at revision {}",
            val.loc,
            val.get_current_revision()?
        );
        Ok(val)
    }

    /// Move this handle's view to the head revision. Returns the head
    /// generation number. Must not be called while a transaction on
    /// this handle is open.
    pub fn sync(&self) -> Result<u64> {
        self.regions.borrow_mut().refresh()?;
        let pos = {
            let regions = self.regions.borrow();
            let pos = regions.footer_pos();
            self.wm.set(regions.len()); // widen for validation reads
            pos
        };
        let trailer = match Trailer::validate(self, TypedAddress::new(Address::new(pos)))? {
            Some(trailer) => trailer,
            None => err_at!(FooterCorrupt, msg: "null footer_pos")?,
        };

        if self.head.get() != pos {
            self.indices.borrow_mut().reset();
        }
        self.head.set(pos);
        self.wm.set(pos + TRAILER_SIZE);
        self.pinned.set(false);
        Ok(trailer.generation)
    }

    /// Pin this handle's view to `revision`, which must be at or below
    /// the head. Reads, index loads and diffs then see the store as of
    /// that revision; writes through a pinned handle are refused.
    pub fn sync_to(&self, revision: u64) -> Result<()> {
        let head_gen = self.sync()?;
        if revision > head_gen {
            return err_at!(Fatal, msg: "no such revision {} > {}", revision, head_gen);
        }
        if revision == head_gen {
            return Ok(());
        }

        let (pos, _trailer) = self.revision_trailer(revision)?;
        self.indices.borrow_mut().reset();
        self.head.set(pos.to_u64());
        self.wm.set(pos.to_u64() + TRAILER_SIZE);
        self.pinned.set(true);
        Ok(())
    }

    /// Generation number of the revision this handle is viewing. Bytes
    /// allocated by an uncommitted transaction do not move it.
    pub fn get_current_revision(&self) -> Result<u64> {
        Ok(self.current_trailer()?.generation)
    }

    /// Address of the trailer publishing the viewed revision.
    pub fn footer_pos(&self) -> TypedAddress<Trailer> {
        TypedAddress::new(Address::new(self.head.get()))
    }

    pub fn current_trailer(&self) -> Result<Trailer> {
        let view = self.getro(Address::new(self.head.get()), TRAILER_SIZE)?;
        Trailer::decode(&view)
    }

    /// Iterate the trailer chain from the viewed revision back to
    /// revision zero.
    pub fn generations(&self) -> GenerationIter {
        GenerationIter::new(self, self.footer_pos())
    }

    /// Locate the trailer publishing `revision` by walking the chain.
    pub fn revision_trailer(
        &self,
        revision: u64,
    ) -> Result<(TypedAddress<Trailer>, Trailer)> {
        for item in self.generations() {
            let (pos, trailer) = item?;
            if trailer.generation == revision {
                return Ok((pos, trailer));
            }
        }
        err_at!(Fatal, msg: "no trailer for revision {}", revision)
    }

    /// Read-only view of `size` bytes at `addr`. The view stays valid
    /// for the life of this handle.
    pub fn getro(&self, addr: Address, size: u64) -> Result<View> {
        let end = addr.checked_add(size)?.to_u64();
        if end > self.wm.get() {
            return err_at!(BadAddress, msg: "read {}+{} beyond arena {}", addr, size, self.wm.get());
        }
        let regions = self.regions.borrow();
        let view = regions.view(addr.to_u64(), size)?;
        // SAFETY: mappings are append-only and never unmapped while this
        // handle lives; the RefCell borrow only guards the region table.
        Ok(unsafe { extend_view(view) })
    }

    /// Little-endian u64 at `addr`.
    pub fn read_u64(&self, addr: Address) -> Result<u64> {
        use std::convert::TryInto;

        let view = self.getro(addr, 8)?;
        Ok(u64::from_le_bytes(view[..8].try_into().unwrap()))
    }

    pub(crate) fn getrw_raw(
        &self,
        addr: Address,
        size: u64,
        initialized: bool,
    ) -> Result<ViewMut> {
        let regions = self.regions.borrow();
        let view = regions.view_mut(addr.to_u64(), size, initialized)?;
        // SAFETY: same argument as [Store::getro].
        Ok(unsafe { extend_view_mut(view) })
    }

    // Bump allocator for the open transaction. Returned address honors
    // `align` and is at or beyond the committed end of the arena.
    pub(crate) fn allocate(&self, size: u64, align: u64) -> Result<Address> {
        let pos = self.wm.get();
        let addr = pos + crate::calc_alignment(pos, align);
        let end = match addr.checked_add(size) {
            Some(end) => end,
            None => err_at!(CannotExtend, msg: "allocation overflow {}+{}", addr, size)?,
        };
        if end > self.regions.borrow().len() {
            self.regions.borrow_mut().grow(end)?;
        }
        self.wm.set(end);
        Ok(Address::new(addr))
    }

    #[inline]
    pub(crate) fn watermark(&self) -> u64 {
        self.wm.get()
    }

    // Forget the open transaction's allocations. The file stays
    // physically extended; the space is reused by the next transaction.
    pub(crate) fn rollback_watermark(&self) {
        self.wm.set(self.head.get() + TRAILER_SIZE);
    }

    pub(crate) fn publish(&self, trailer_addr: Address, first: Address) -> Result<()> {
        let end = trailer_addr.to_u64() + TRAILER_SIZE;
        let regions = self.regions.borrow();
        // All transaction bytes reach the file before the commit point
        // becomes durable.
        regions.flush(first.to_u64(), end)?;
        regions.set_footer_pos(trailer_addr.to_u64());
        regions.flush(0, HEADER_SIZE)?;
        drop(regions);

        self.head.set(trailer_addr.to_u64());
        self.wm.set(end);
        Ok(())
    }

    pub(crate) fn protect(&self, from: Address, to: u64) -> Result<()> {
        self.regions.borrow().protect(from.to_u64(), to)
    }

    #[inline]
    pub(crate) fn is_pinned(&self) -> bool {
        self.pinned.get()
    }

    pub(crate) fn index_cache(&self) -> &RefCell<IndexCache> {
        &self.indices
    }

    pub fn to_location(&self) -> ffi::OsString {
        self.loc.clone()
    }

    pub fn as_config(&self) -> &Config {
        &self.config
    }

    /// Instance uuid stamped into the header at creation.
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.header.uuid)
    }
}

// SAFETY: callers guarantee the backing mappings outlive the target
// lifetime; see [Store::getro].
unsafe fn extend_view<'a, 'b>(view: View<'a>) -> View<'b> {
    mem::transmute(view)
}

unsafe fn extend_view_mut<'a, 'b>(view: ViewMut<'a>) -> ViewMut<'b> {
    mem::transmute(view)
}

#[cfg(test)]
#[path = "db_test.rs"]
mod db_test;
