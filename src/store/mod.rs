//! Module implement the append-only store and its transactions.
//!
//! A store is a single file, mapped into memory in fixed-size regions.
//! The file starts with a [Header] whose only mutable word, `footer_pos`,
//! names the [Trailer] of the current revision. Every committed
//! transaction appends its data followed by a fresh trailer and then
//! publishes that trailer with a single atomic store into `footer_pos`,
//! which is the commit point. Older trailers stay chained through
//! `prev_generation` all the way back to revision zero.
//!
//! Use [Store::create] to build a fresh store file and [Store::open] for
//! an existing one. A [Store] value must not be shared between threads,
//! concurrent readers each open their own handle on the same path and
//! cooperate through the shared file pages. Writers additionally take an
//! exclusive file lock for the duration of a [Transaction], making the
//! single-writer rule hold across processes as well.
//!
//! ```ignore
//! let mut config = Config::new(&dir, "fixtures");
//! config.set_region_size(1024 * 1024);
//! let db = Store::create(config)?;
//!
//! let mut txn = Transaction::begin(&db)?;
//! let addr = txn.alloc_bytes(b"payload", 8)?;
//! txn.commit()?;
//! ```

use arbitrary::{Arbitrary, Unstructured};

use std::{convert::TryFrom, ffi, path, time};

use crate::{Error, Result};

mod db;
mod gens;
mod layout;
mod regions;
mod txn;

pub use db::Store;
pub use gens::GenerationIter;
pub use layout::{Header, Trailer, HEADER_SIZE, NUM_INDICES, TRAILER_SIZE};
pub use regions::{View, ViewMut};
pub use txn::Transaction;

/// Default size for a mapped file region, 4MB.
pub const REGION_SIZE: usize = 4 * 1024 * 1024;

/// Whether a store handle accepts write transactions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Whether a background compactor may be started for this store. The
/// compactor itself lives outside this package, the store only records
/// the request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VacuumMode {
    Disabled,
    Background,
}

/// Compose the path to a store file identified by unique `name` under `dir`.
pub fn to_store_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    let mut file = ffi::OsString::from(name);
    file.push(".aodb");
    let loc: path::PathBuf = [dir.to_os_string(), file].iter().collect();
    loc.into_os_string()
}

/// Configuration for a [Store].
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory in which the store file lives.
    pub dir: ffi::OsString,
    /// Uniquely name store instances under `dir`.
    pub name: String,
    /// Size of a single mapped region, lower-bounded by the page size.
    ///
    /// Default: [REGION_SIZE]
    pub region_size: usize,
    /// Reject write transactions when [AccessMode::ReadOnly].
    ///
    /// Default: [AccessMode::ReadWrite]
    pub access_mode: AccessMode,
    /// Allow a background compactor thread to be started.
    ///
    /// Default: [VacuumMode::Disabled]
    pub vacuum_mode: VacuumMode,
}

impl<'a> Arbitrary<'a> for Config {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        use std::env;

        let name: String = u.arbitrary()?;
        let region_size = *u.choose(&[64 * 1024, 256 * 1024, 1024 * 1024, REGION_SIZE])?;

        let config = Config {
            dir: env::temp_dir().into_os_string(),
            name,
            region_size,
            access_mode: AccessMode::ReadWrite,
            vacuum_mode: VacuumMode::Disabled,
        };
        Ok(config)
    }
}

impl Config {
    pub fn new(dir: &ffi::OsStr, name: &str) -> Config {
        Config {
            dir: dir.to_os_string(),
            name: name.to_string(),
            region_size: REGION_SIZE,
            access_mode: AccessMode::ReadWrite,
            vacuum_mode: VacuumMode::Disabled,
        }
    }

    /// Configure the mapping granule. Values below the page size are
    /// rounded up to it.
    pub fn set_region_size(&mut self, region_size: usize) -> &mut Self {
        self.region_size = region_size;
        self
    }

    pub fn set_access_mode(&mut self, access_mode: AccessMode) -> &mut Self {
        self.access_mode = access_mode;
        self
    }

    pub fn set_vacuum_mode(&mut self, vacuum_mode: VacuumMode) -> &mut Self {
        self.vacuum_mode = vacuum_mode;
        self
    }

    pub fn to_location(&self) -> ffi::OsString {
        to_store_location(&self.dir, &self.name)
    }
}

// Wall-clock in milliseconds since UNIX epoch, stamped into trailers.
pub(crate) fn time_to_ms() -> Result<u64> {
    let now = time::SystemTime::now();
    let dur = err_at!(Fatal, now.duration_since(time::UNIX_EPOCH))?;
    err_at!(FailConvert, u64::try_from(dur.as_millis()))
}
