//! Module implement the mapped-region manager.
//!
//! The backing file is mapped in equally sized regions. Committed bytes
//! are immutable, so region mappings are only ever added, never dropped
//! or moved, while a store handle lives. Views hand out byte slices
//! into the mappings; a span that crosses a region boundary is served
//! from a scratch buffer instead, copied in on creation and, for
//! writable views, copied back when the view drops.

use lazy_static::lazy_static;
use log::debug;
use memmap2::{MmapOptions, MmapRaw};

use std::{
    convert::TryFrom,
    fs, marker, mem, ops, slice,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{store::layout::FOOTER_POS_OFFSET, Error, Result};

lazy_static! {
    pub(crate) static ref PAGE_SIZE: u64 = {
        // SAFETY: sysconf has no preconditions.
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n <= 0 {
            4096
        } else {
            n as u64
        }
    };
}

/// Read-only view over a byte range of the store.
pub enum View<'a> {
    Mapped(&'a [u8]),
    Copied(Vec<u8>),
}

impl<'a> ops::Deref for View<'a> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            View::Mapped(buf) => buf,
            View::Copied(buf) => buf,
        }
    }
}

// A writable spanning view keeps, for each region it touches, the
// destination pointer and length to copy back into on drop.
enum ViewMutInner {
    Mapped {
        ptr: *mut u8,
        len: usize,
    },
    Spanning {
        buf: Vec<u8>,
        segs: Vec<(usize, *mut u8, usize)>, // (buf offset, dst, len)
    },
}

/// Writable view over a byte range of the open transaction.
pub struct ViewMut<'a> {
    inner: ViewMutInner,
    _lt: marker::PhantomData<&'a ()>,
}

impl<'a> ops::Deref for ViewMut<'a> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.inner {
            // SAFETY: the range was bounds-checked against the mapped
            // length and the mapping outlives the view's lifetime.
            ViewMutInner::Mapped { ptr, len } => unsafe {
                slice::from_raw_parts(*ptr, *len)
            },
            ViewMutInner::Spanning { buf, .. } => buf,
        }
    }
}

impl<'a> ops::DerefMut for ViewMut<'a> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.inner {
            // SAFETY: same as Deref, and writable views are only handed
            // out for bytes owned by the open transaction.
            ViewMutInner::Mapped { ptr, len } => unsafe {
                slice::from_raw_parts_mut(*ptr, *len)
            },
            ViewMutInner::Spanning { buf, .. } => buf,
        }
    }
}

impl<'a> Drop for ViewMut<'a> {
    fn drop(&mut self) {
        if let ViewMutInner::Spanning { buf, segs } = &mut self.inner {
            for (off, dst, len) in segs.iter() {
                // SAFETY: segment pointers were derived from live
                // mappings when the view was created.
                unsafe {
                    slice::from_raw_parts_mut(*dst, *len)
                        .copy_from_slice(&buf[*off..*off + *len])
                }
            }
        }
    }
}

pub(crate) struct Regions {
    file: fs::File,
    region_size: u64,
    writable: bool,
    maps: Vec<MmapRaw>,
    len: u64, // current file length in bytes
}

impl Regions {
    /// Map an existing file. `region_size` is clamped to a whole number
    /// of pages, one page minimum.
    pub fn new(file: fs::File, region_size: usize, writable: bool) -> Result<Regions> {
        let region_size = {
            let rs = err_at!(FailConvert, u64::try_from(region_size))?;
            let rs = rs.max(*PAGE_SIZE);
            rs + crate::calc_alignment(rs, *PAGE_SIZE)
        };
        let len = err_at!(IOError, file.metadata())?.len();

        let mut val = Regions { file, region_size, writable, maps: vec![], len };
        let n = val.num_regions();
        for i in 0..n {
            let map = val.map_region(i)?;
            val.maps.push(map);
        }
        Ok(val)
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn region_size(&self) -> u64 {
        self.region_size
    }

    fn num_regions(&self) -> u64 {
        (self.len + self.region_size - 1) / self.region_size
    }

    fn map_region(&self, i: u64) -> Result<MmapRaw> {
        let mut opts = MmapOptions::new();
        let size = err_at!(FailConvert, usize::try_from(self.region_size))?;
        opts.offset(i * self.region_size).len(size);
        if self.writable {
            err_at!(MapFailed, opts.map_raw(&self.file))
        } else {
            err_at!(MapFailed, opts.map_raw_read_only(&self.file))
        }
    }

    /// Extend the file so that `new_len` bytes are addressable, rounding
    /// up to a whole region, and map the added regions.
    pub fn grow(&mut self, new_len: u64) -> Result<()> {
        if !self.writable {
            return err_at!(ReadOnlyStore, msg: "cannot extend read-only store");
        }
        let target = {
            let n = (new_len + self.region_size - 1) / self.region_size;
            n * self.region_size
        };
        if target <= self.len {
            return Ok(());
        }

        err_at!(CannotExtend, self.file.set_len(target), "to {}", target)?;
        self.len = target;
        for i in self.maps.len() as u64..self.num_regions() {
            let map = self.map_region(i)?;
            self.maps.push(map);
        }
        debug!(target: "aodb", "store file extended to {} bytes", target);
        Ok(())
    }

    /// Pick up a file extension made by another handle or process.
    pub fn refresh(&mut self) -> Result<()> {
        let len = err_at!(IOError, self.file.metadata())?.len();
        if len > self.len {
            self.len = len;
            for i in self.maps.len() as u64..self.num_regions() {
                let map = self.map_region(i)?;
                self.maps.push(map);
            }
        }
        Ok(())
    }

    fn check_bounds(&self, addr: u64, size: u64) -> Result<()> {
        match addr.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => err_at!(BadAddress, msg: "address {}+{} beyond {}", addr, size, self.len),
        }
    }

    // (region, offset-in-region, length) triples covering [addr, addr+size).
    fn segments(&self, addr: u64, size: u64) -> Vec<(usize, usize, usize)> {
        let mut segs = vec![];
        let (mut addr, mut rem) = (addr, size);
        while rem > 0 {
            let seg = (addr / self.region_size) as usize;
            let off = addr % self.region_size;
            let n = rem.min(self.region_size - off);
            segs.push((seg, off as usize, n as usize));
            addr += n;
            rem -= n;
        }
        segs
    }

    pub fn view(&self, addr: u64, size: u64) -> Result<View> {
        self.check_bounds(addr, size)?;
        let segs = self.segments(addr, size);
        match segs.as_slice() {
            [] => Ok(View::Copied(vec![])),
            [(seg, off, n)] => {
                // SAFETY: bounds-checked above; mappings are never
                // unmapped while the handle lives.
                let buf = unsafe {
                    slice::from_raw_parts(self.maps[*seg].as_mut_ptr().add(*off), *n)
                };
                Ok(View::Mapped(buf))
            }
            segs => {
                let mut buf = Vec::with_capacity(size as usize);
                for (seg, off, n) in segs {
                    // SAFETY: same as the single-segment arm.
                    let part = unsafe {
                        slice::from_raw_parts(self.maps[*seg].as_mut_ptr().add(*off), *n)
                    };
                    buf.extend_from_slice(part);
                }
                Ok(View::Copied(buf))
            }
        }
    }

    /// Writable view. Callers, which is to say the transaction layer,
    /// are responsible for only requesting bytes the open transaction
    /// has allocated.
    pub fn view_mut(&self, addr: u64, size: u64, initialized: bool) -> Result<ViewMut> {
        if !self.writable {
            return err_at!(ReadOnlyStore, msg: "writable view on read-only store");
        }
        self.check_bounds(addr, size)?;
        let segs = self.segments(addr, size);
        let inner = match segs.as_slice() {
            [] => ViewMutInner::Spanning { buf: vec![], segs: vec![] },
            [(seg, off, n)] => ViewMutInner::Mapped {
                // SAFETY: bounds-checked; single writer per store file.
                ptr: unsafe { self.maps[*seg].as_mut_ptr().add(*off) },
                len: *n,
            },
            parts => {
                let mut buf = vec![0_u8; size as usize];
                let mut segs = Vec::with_capacity(parts.len());
                let mut boff = 0_usize;
                for (seg, off, n) in parts {
                    // SAFETY: same as the single-segment arm.
                    let ptr = unsafe { self.maps[*seg].as_mut_ptr().add(*off) };
                    if initialized {
                        let src = unsafe { slice::from_raw_parts(ptr, *n) };
                        buf[boff..boff + n].copy_from_slice(src);
                    }
                    segs.push((boff, ptr, *n));
                    boff += n;
                }
                ViewMutInner::Spanning { buf, segs }
            }
        };
        Ok(ViewMut { inner, _lt: marker::PhantomData })
    }

    /// Mark every whole page inside `[from, to)` read-only. Pages
    /// straddling either boundary stay writable, the header page is
    /// never touched.
    pub fn protect(&self, from: u64, to: u64) -> Result<()> {
        let start = {
            let s = from + crate::calc_alignment(from, *PAGE_SIZE);
            s.max(*PAGE_SIZE) // keep the header page writable
        };
        let end = (to.min(self.len) / *PAGE_SIZE) * *PAGE_SIZE;
        if start >= end {
            return Ok(());
        }

        for (seg, off, n) in self.segments(start, end - start) {
            // SAFETY: the range is page-aligned and inside the mapping.
            let rc = unsafe {
                libc::mprotect(
                    self.maps[seg].as_mut_ptr().add(off) as *mut libc::c_void,
                    n,
                    libc::PROT_READ,
                )
            };
            if rc != 0 {
                err_at!(MapFailed, Err(std::io::Error::last_os_error()), "mprotect")?
            }
        }
        Ok(())
    }

    /// Flush dirty pages of `[from, to)` back to the file.
    pub fn flush(&self, from: u64, to: u64) -> Result<()> {
        let to = to.min(self.len);
        if from >= to {
            return Ok(());
        }
        for (seg, off, n) in self.segments(from, to - from) {
            err_at!(IOError, self.maps[seg].flush_range(off, n))?;
        }
        Ok(())
    }

    /// Acquire-load of the one mutable word in the file, the address of
    /// the current revision's trailer.
    pub fn footer_pos(&self) -> u64 {
        self.atomic_footer_pos().load(Ordering::Acquire)
    }

    /// Release-store publishing a new revision. This single word is the
    /// commit point.
    pub fn set_footer_pos(&self, pos: u64) {
        self.atomic_footer_pos().store(pos, Ordering::Release)
    }

    fn atomic_footer_pos(&self) -> &AtomicU64 {
        let off = FOOTER_POS_OFFSET as usize;
        debug_assert!(off % mem::align_of::<AtomicU64>() == 0);
        // SAFETY: the word is 8-byte aligned inside the always-mapped
        // header region and shared with other processes only through
        // atomic access.
        unsafe { &*(self.maps[0].as_mut_ptr().add(off) as *const AtomicU64) }
    }
}

#[cfg(test)]
#[path = "regions_test.rs"]
mod regions_test;
