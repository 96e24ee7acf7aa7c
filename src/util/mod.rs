//! Ambient utilities shared across the crate.

pub mod address;
pub mod logger;
pub mod options;

#[cfg(any(test, feature = "mock_test"))]
pub mod test_util;

pub use self::address::Address;
pub use self::address::ByteOffset;
pub use self::address::ByteSize;
pub use self::address::ObjectReference;
