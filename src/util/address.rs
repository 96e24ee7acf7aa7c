use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// size in bytes
pub type ByteSize = usize;
/// offset in bytes
pub type ByteOffset = isize;

/// Address represents an arbitrary memory address, and lets us do address
/// arithmetic without sprinkling `usize` casts through the collector. The
/// collector itself never dereferences an `Address`; reading and writing
/// reference slots goes through the [`Heap`](crate::runtime::Heap) contract.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

/// Address + ByteSize (positive)
impl Add<ByteSize> for Address {
    type Output = Address;
    fn add(self, offset: ByteSize) -> Address {
        Address(self.0 + offset)
    }
}

/// Address += ByteSize (positive)
impl AddAssign<ByteSize> for Address {
    fn add_assign(&mut self, offset: ByteSize) {
        self.0 += offset;
    }
}

/// Address - ByteSize (positive)
impl Sub<ByteSize> for Address {
    type Output = Address;
    fn sub(self, offset: ByteSize) -> Address {
        Address(self.0 - offset)
    }
}

/// Address -= ByteSize (positive)
impl SubAssign<ByteSize> for Address {
    fn sub_assign(&mut self, offset: ByteSize) {
        self.0 -= offset;
    }
}

/// Address - Address (the first address must be higher)
impl Sub<Address> for Address {
    type Output = ByteSize;
    fn sub(self, other: Address) -> ByteSize {
        debug_assert!(
            self.0 >= other.0,
            "for (addr_a - addr_b), a needs to be larger than b"
        );
        self.0 - other.0
    }
}

impl Address {
    /// The zero address. Not a valid slot location.
    pub const ZERO: Address = Address(0);

    /// Build an address from a raw numeric value.
    pub const fn from_usize(raw: usize) -> Address {
        Address(raw)
    }

    /// The numeric value of the address.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Is this the zero address?
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A reference to a heap object. By convention the raw address of an
/// `ObjectReference` is never zero, so `Option<ObjectReference>` is the type
/// of a nullable slot value.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectReference(usize);

impl ObjectReference {
    /// Build an `ObjectReference` from a raw address. Returns `None` for the
    /// zero address.
    pub fn from_raw_address(addr: Address) -> Option<ObjectReference> {
        if addr.is_zero() {
            None
        } else {
            Some(ObjectReference(addr.as_usize()))
        }
    }

    /// The raw address of the object.
    pub const fn to_raw_address(self) -> Address {
        Address(self.0)
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
