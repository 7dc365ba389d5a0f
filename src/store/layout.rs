//! Module implement the on-disk header and trailer records.
//!
//! All on-disk integers are little-endian, regardless of host order.

use crc::{Crc, CRC_32_ISO_HDLC};

use std::convert::TryInto;

use crate::{store::Store, Address, Error, Result, TypedAddress};

/// Size of the bootstrap header at offset zero.
pub const HEADER_SIZE: u64 = 64;

/// Size of a revision trailer.
pub const TRAILER_SIZE: u64 = 104;

/// Number of logical indices persisted in every trailer.
pub const NUM_INDICES: usize = 6;

// Byte offset of the mutable `footer_pos` word within the header.
pub(crate) const FOOTER_POS_OFFSET: u64 = 32;

const HEADER_SIG1: [u8; 4] = [0x70, 0x53, 0x74, 0x72]; // "pStr"
const HEADER_SIG2: u32 = 0x0507_FFFF;
const TRAILER_SIG1: [u8; 8] = *b"hPPyfooT";
const TRAILER_SIG2: [u8; 8] = *b"hPPyTail";

const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[inline]
pub(crate) fn decode_u64(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

#[inline]
pub(crate) fn encode_u64(buf: &mut [u8], off: usize, val: u64) {
    buf[off..off + 8].copy_from_slice(&val.to_le_bytes());
}

/// The bootstrap record at file offset zero.
///
/// Layout, 64 bytes:
///
/// | offset | field                                   |
/// |--------|-----------------------------------------|
/// |  0     | signature1, 4 bytes                     |
/// |  4     | signature2, u32                         |
/// |  8     | major version, u16                      |
/// | 10     | minor version, u16                      |
/// | 12     | instance uuid, 16 bytes                 |
/// | 28     | crc32 over bytes 0..28                  |
/// | 32     | footer_pos, the one mutable atomic word |
/// | 40     | zero padding to 64                      |
///
/// `footer_pos` is excluded from the crc, it is the only field ever
/// written after the store is created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub major: u16,
    pub minor: u16,
    pub uuid: [u8; 16],
}

impl Header {
    pub fn new(uuid: [u8; 16]) -> Header {
        Header { major: VERSION_MAJOR, minor: VERSION_MINOR, uuid }
    }

    /// Serialize, with the `footer_pos` word zeroed. The caller
    /// publishes `footer_pos` separately.
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0_u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&HEADER_SIG1);
        buf[4..8].copy_from_slice(&HEADER_SIG2.to_le_bytes());
        buf[8..10].copy_from_slice(&self.major.to_le_bytes());
        buf[10..12].copy_from_slice(&self.minor.to_le_bytes());
        buf[12..28].copy_from_slice(&self.uuid);
        let crc = CRC32.checksum(&buf[0..28]);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE as usize {
            err_at!(HeaderCorrupt, msg: "file too small for header {}", buf.len())?
        }
        if buf[0..4] != HEADER_SIG1 {
            err_at!(HeaderCorrupt, msg: "bad signature1 {:?}", &buf[0..4])?
        }
        let sig2 = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if sig2 != HEADER_SIG2 {
            err_at!(HeaderCorrupt, msg: "bad signature2 {:x}", sig2)?
        }
        let crc = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        let computed = CRC32.checksum(&buf[0..28]);
        if crc != computed {
            err_at!(HeaderCorrupt, msg: "crc mismatch {:x} != {:x}", crc, computed)?
        }

        let major = u16::from_le_bytes(buf[8..10].try_into().unwrap());
        let minor = u16::from_le_bytes(buf[10..12].try_into().unwrap());
        if major != VERSION_MAJOR {
            err_at!(VersionMismatch, msg: "major version {} != {}", major, VERSION_MAJOR)?
        }

        let mut uuid = [0_u8; 16];
        uuid.copy_from_slice(&buf[12..28]);

        Ok(Header { major, minor, uuid })
    }
}

/// Per-revision metadata record written at the tail of every committed
/// transaction.
///
/// Layout, 104 bytes, 8-byte aligned:
///
/// | offset | field                              |
/// |--------|------------------------------------|
/// |  0     | signature1, 8 bytes                |
/// |  8     | generation, u64                    |
/// | 16     | size, u64, trailer excluded        |
/// | 24     | time, u64 ms since epoch           |
/// | 32     | prev_generation, trailer address   |
/// | 40     | index_records, 6 x u64             |
/// | 88     | crc32 over bytes 0..88             |
/// | 92     | zero padding                       |
/// | 96     | signature2, 8 bytes                |
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Trailer {
    pub generation: u64,
    pub size: u64,
    pub time: u64,
    pub prev_generation: TypedAddress<Trailer>,
    pub index_records: [Address; NUM_INDICES],
}

impl Trailer {
    /// The trailer written at store creation, revision zero.
    pub fn initial(time: u64) -> Trailer {
        Trailer {
            generation: 0,
            size: 0,
            time,
            prev_generation: TypedAddress::NULL,
            index_records: [Address::NULL; NUM_INDICES],
        }
    }

    pub fn encode(&self) -> [u8; TRAILER_SIZE as usize] {
        let mut buf = [0_u8; TRAILER_SIZE as usize];
        buf[0..8].copy_from_slice(&TRAILER_SIG1);
        encode_u64(&mut buf, 8, self.generation);
        encode_u64(&mut buf, 16, self.size);
        encode_u64(&mut buf, 24, self.time);
        encode_u64(&mut buf, 32, self.prev_generation.to_u64());
        for (i, record) in self.index_records.iter().enumerate() {
            encode_u64(&mut buf, 40 + (i * 8), record.to_u64());
        }
        let crc = CRC32.checksum(&buf[0..88]);
        buf[88..92].copy_from_slice(&crc.to_le_bytes());
        buf[96..104].copy_from_slice(&TRAILER_SIG2);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Trailer> {
        if buf.len() < TRAILER_SIZE as usize {
            err_at!(FooterCorrupt, msg: "short trailer {}", buf.len())?
        }
        if buf[0..8] != TRAILER_SIG1 {
            err_at!(FooterCorrupt, msg: "bad signature1 {:?}", &buf[0..8])?
        }
        if buf[96..104] != TRAILER_SIG2 {
            err_at!(FooterCorrupt, msg: "bad signature2 {:?}", &buf[96..104])?
        }
        let crc = u32::from_le_bytes(buf[88..92].try_into().unwrap());
        let computed = CRC32.checksum(&buf[0..88]);
        if crc != computed {
            err_at!(FooterCorrupt, msg: "crc mismatch {:x} != {:x}", crc, computed)?
        }

        let mut index_records = [Address::NULL; NUM_INDICES];
        for (i, record) in index_records.iter_mut().enumerate() {
            *record = Address::new(decode_u64(buf, 40 + (i * 8)));
        }

        Ok(Trailer {
            generation: decode_u64(buf, 8),
            size: decode_u64(buf, 16),
            time: decode_u64(buf, 24),
            prev_generation: TypedAddress::new(Address::new(decode_u64(buf, 32))),
            index_records,
        })
    }

    /// Validate and read the trailer at `pos`. Null yields `None`. Any
    /// other violation, out of bounds, misalignment, bad magic or crc,
    /// is fatal.
    pub fn validate(db: &Store, pos: TypedAddress<Trailer>) -> Result<Option<Trailer>> {
        if pos.is_null() {
            return Ok(None);
        }
        let addr = pos.to_address();
        if addr.to_u64() % 8 != 0 {
            err_at!(FooterCorrupt, msg: "misaligned trailer {}", addr)?
        }
        if addr.to_u64() < HEADER_SIZE {
            err_at!(FooterCorrupt, msg: "trailer {} inside header", addr)?
        }
        let view = db.getro(addr, TRAILER_SIZE)?;
        Ok(Some(Trailer::decode(&view)?))
    }
}

#[cfg(test)]
#[path = "layout_test.rs"]
mod layout_test;
