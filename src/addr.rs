//! Module implement typed addressing into the store file.

use std::{cmp, convert::TryFrom, fmt, hash, marker, ops, result};

use crate::{Error, Result};

/// A byte offset into the logical store file. Offset zero, which falls
/// inside the file header, doubles as the null sentinel.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address {
    pub const NULL: Address = Address(0);

    #[inline]
    pub fn new(off: u64) -> Address {
        Address(off)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn to_u64(&self) -> u64 {
        self.0
    }

    /// Region number holding the first byte of this address.
    #[inline]
    pub fn segment(&self, region_size: u64) -> u64 {
        self.0 / region_size
    }

    /// Byte offset within the region returned by [Address::segment].
    #[inline]
    pub fn offset(&self, region_size: u64) -> u64 {
        self.0 % region_size
    }

    pub fn checked_add(&self, n: u64) -> Result<Address> {
        match self.0.checked_add(n) {
            Some(off) => Ok(Address(off)),
            None => err_at!(BadAddress, msg: "address overflow {}+{}", self.0, n),
        }
    }
}

impl ops::Add<u64> for Address {
    type Output = Address;

    fn add(self, rhs: u64) -> Address {
        Address(self.0 + rhs)
    }
}

impl From<u64> for Address {
    fn from(off: u64) -> Address {
        Address(off)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "Address({})", self.0)
    }
}

/// Compute the padding required to bring `pos` up to `align` boundary.
/// `align` must be a non-zero power of two.
#[inline]
pub fn calc_alignment(pos: u64, align: u64) -> u64 {
    debug_assert!(align > 0 && align.count_ones() == 1);
    (align - (pos % align)) % align
}

/// An [Address] tagged with the type of its referent, for type-checked
/// reads. The tag is a phantom, it costs nothing at runtime and is not
/// part of the on-disk form.
pub struct TypedAddress<T> {
    addr: Address,
    _typ: marker::PhantomData<T>,
}

impl<T> TypedAddress<T> {
    pub const NULL: TypedAddress<T> = TypedAddress {
        addr: Address::NULL,
        _typ: marker::PhantomData,
    };

    #[inline]
    pub fn new(addr: Address) -> TypedAddress<T> {
        TypedAddress { addr, _typ: marker::PhantomData }
    }

    #[inline]
    pub fn to_address(&self) -> Address {
        self.addr
    }

    #[inline]
    pub fn to_u64(&self) -> u64 {
        self.addr.to_u64()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.addr.is_null()
    }
}

// Manual impls, the phantom referent need not be Clone/Eq/etc.

impl<T> Clone for TypedAddress<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedAddress<T> {}

impl<T> PartialEq for TypedAddress<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for TypedAddress<T> {}

impl<T> PartialOrd for TypedAddress<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.addr.partial_cmp(&other.addr)
    }
}

impl<T> Ord for TypedAddress<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.addr.cmp(&other.addr)
    }
}

impl<T> hash::Hash for TypedAddress<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.addr.hash(state)
    }
}

impl<T> fmt::Debug for TypedAddress<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "TypedAddress({})", self.addr.to_u64())
    }
}

/// A contiguous run of storage, named by its starting address and its
/// length in bytes.
pub struct Extent<T> {
    pub addr: TypedAddress<T>,
    pub size: u64,
}

impl<T> Extent<T> {
    pub fn new(addr: TypedAddress<T>, size: u64) -> Extent<T> {
        Extent { addr, size }
    }

    pub fn from_parts(addr: u64, size: usize) -> Result<Extent<T>> {
        let size = err_at!(FailConvert, u64::try_from(size))?;
        Ok(Extent { addr: TypedAddress::new(Address::new(addr)), size })
    }
}

impl<T> Clone for Extent<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Extent<T> {}

impl<T> PartialEq for Extent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.size == other.size
    }
}

impl<T> Eq for Extent<T> {}

impl<T> fmt::Debug for Extent<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "Extent({},{})", self.addr.to_u64(), self.size)
    }
}

#[cfg(test)]
#[path = "addr_test.rs"]
mod addr_test;
