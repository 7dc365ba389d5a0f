//! Aodb implement a single-file, append-only, memory-mapped key/value
//! store for program repositories. Compiler toolchains use it to
//! deduplicate and version large collections of content addressed
//! artifacts, machine-code fragments, compilation records, debug-line
//! headers, interned names and paths.
//!
//! Every successful write transaction produces a new immutable
//! _revision_ and older revisions remain readable forever. A revision
//! is published by a single atomic store into the file header, readers
//! that observe it are guaranteed to see every byte the transaction
//! wrote. Within a process, and across processes, any number of readers
//! can share the file with at most one writer.
//!
//! Logical indices are kept as persistent hash-array-mapped-tries,
//! [index::Map] and [index::Set], stored in the same append-only arena
//! as the data they point at. Unmodified subtrees are shared between
//! revisions, which keeps writes proportional to the change and makes
//! revision-to-revision diffing a matter of pruning the traversal by
//! an address threshold, see [index::diff].
//!
//! Interned strings use a two-phase protocol, [istring::StringAdder],
//! so that the pointer-slots written by the index cluster tightly and
//! the string bodies land behind them in one batch.

use std::result;

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(FooterCorrupt, msg: "prev-generation {}", gen)
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(&mut buf))
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(&mut buf), "reading store file {:?}", loc)
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

mod addr;
mod error;
mod hash;
pub mod index;
pub mod istring;
pub mod store;

pub use crate::addr::{calc_alignment, Address, Extent, TypedAddress};
pub use crate::error::Error;
pub use crate::hash::{CityHash, DigestHash, IndexHash};
pub use crate::store::{AccessMode, Config, Store, Transaction, VacuumMode};

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;
