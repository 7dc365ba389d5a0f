use std::{error, fmt, result};

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location, and a message describing the error.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Fatal(String, String),
    FailConvert(String, String),
    IOError(String, String),
    InvalidFile(String, String),
    HeaderCorrupt(String, String),
    FooterCorrupt(String, String),
    VersionMismatch(String, String),
    BadAddress(String, String),
    CannotExtend(String, String),
    MapFailed(String, String),
    CannotAllocateAfterCommit(String, String),
    IndexNotLatestRevision(String, String),
    WriteOutsideTransaction(String, String),
    ReadOnlyStore(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            HeaderCorrupt(p, msg) => write!(f, "{} HeaderCorrupt: {}", p, msg),
            FooterCorrupt(p, msg) => write!(f, "{} FooterCorrupt: {}", p, msg),
            VersionMismatch(p, msg) => write!(f, "{} VersionMismatch: {}", p, msg),
            BadAddress(p, msg) => write!(f, "{} BadAddress: {}", p, msg),
            CannotExtend(p, msg) => write!(f, "{} CannotExtend: {}", p, msg),
            MapFailed(p, msg) => write!(f, "{} MapFailed: {}", p, msg),
            CannotAllocateAfterCommit(p, msg) => {
                write!(f, "{} CannotAllocateAfterCommit: {}", p, msg)
            }
            IndexNotLatestRevision(p, msg) => {
                write!(f, "{} IndexNotLatestRevision: {}", p, msg)
            }
            WriteOutsideTransaction(p, msg) => {
                write!(f, "{} WriteOutsideTransaction: {}", p, msg)
            }
            ReadOnlyStore(p, msg) => write!(f, "{} ReadOnlyStore: {}", p, msg),
        }
    }
}

impl error::Error for Error {}
