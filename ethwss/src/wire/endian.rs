//! Big-endian scalar storage.
//!
//! Most fields are read directly from a byte wrapper through `byteorder`. Where a value is kept
//! around in its wire form, for example a length prefix that is written before the body it
//! measures is known, `Be<T>` stores it already converted to network order so that `as_bytes`
//! can be copied into an outgoing buffer as is.
use core::fmt;

use super::{Error, Result};

/// An integer that has a fixed size big-endian encoding.
pub trait Scalar: Copy + Sized {
    /// The encoded representation, `[u8; N]`.
    type Bytes: Copy + AsRef<[u8]> + AsMut<[u8]> + Default + fmt::Debug + PartialEq + Eq;

    /// Encode in network byte order.
    fn to_be_bytes(self) -> Self::Bytes;

    /// Decode from network byte order.
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty: $n:expr),*) => {
        $(
            impl Scalar for $ty {
                type Bytes = [u8; $n];

                fn to_be_bytes(self) -> [u8; $n] {
                    <$ty>::to_be_bytes(self)
                }

                fn from_be_bytes(bytes: [u8; $n]) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }
            }
        )*
    }
}

impl_scalar!(u8: 1, u16: 2, u32: 4, u64: 8);

/// A value stored in network byte order.
///
/// Construction always converts, `value` always converts back. A value that is already in wire
/// order, e.g. a checksum produced by a routine working on big-endian words, is adopted without
/// conversion by `from_big_endian`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Be<T: Scalar> {
    bytes: T::Bytes,
}

impl<T: Scalar> Be<T> {
    /// Store a native value in network order.
    pub fn new(value: T) -> Self {
        Be { bytes: value.to_be_bytes() }
    }

    /// Adopt bytes that are already in network order.
    pub fn from_big_endian(bytes: T::Bytes) -> Self {
        Be { bytes }
    }

    /// Convert back into the native value.
    pub fn value(self) -> T {
        T::from_be_bytes(self.bytes)
    }

    /// The wire representation.
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    /// Read a value at some offset of a buffer.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer does not contain the whole value.
    pub fn read(buffer: &[u8], offset: usize) -> Result<Self> {
        let mut bytes = T::Bytes::default();
        let len = bytes.as_ref().len();
        let end = offset.checked_add(len).ok_or(Error::Truncated)?;
        let src = buffer.get(offset..end).ok_or(Error::Truncated)?;
        bytes.as_mut().copy_from_slice(src);
        Ok(Be { bytes })
    }

    /// Write the value at some offset of a buffer.
    ///
    /// # Panics
    /// This panics if the buffer is too short to contain the value at that offset.
    pub fn write(self, buffer: &mut [u8], offset: usize) {
        let len = self.bytes.as_ref().len();
        buffer[offset..offset + len].copy_from_slice(self.bytes.as_ref())
    }
}

impl<T: Scalar> From<T> for Be<T> {
    fn from(value: T) -> Self {
        Be::new(value)
    }
}

impl<T: Scalar + fmt::Debug> fmt::Debug for Be<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Be").field(&self.value()).finish()
    }
}

/// A 24-bit unsigned integer, as used for TLS handshake message lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct U24(u32);

impl U24 {
    /// The largest representable value.
    pub const MAX: u32 = 0x00ff_ffff;

    /// Create a value, `None` if it does not fit into 24 bits.
    pub fn new(value: u32) -> Option<Self> {
        if value <= Self::MAX {
            Some(U24(value))
        } else {
            None
        }
    }

    /// Create a value from a length that is statically known to be small.
    ///
    /// # Panics
    /// This panics if the length does not fit into 24 bits.
    pub fn from_len(len: usize) -> Self {
        assert!(len <= Self::MAX as usize, "Length exceeds 24 bit field");
        U24(len as u32)
    }

    /// The numerical value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Encode in network byte order.
    pub fn to_be_bytes(self) -> [u8; 3] {
        let [_, a, b, c] = self.0.to_be_bytes();
        [a, b, c]
    }

    /// Decode from network byte order.
    pub fn from_be_bytes(bytes: [u8; 3]) -> Self {
        U24(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Read a value at some offset of a buffer.
    pub fn read(buffer: &[u8], offset: usize) -> Result<Self> {
        let end = offset.checked_add(3).ok_or(Error::Truncated)?;
        match buffer.get(offset..end) {
            Some(&[a, b, c]) => Ok(U24::from_be_bytes([a, b, c])),
            _ => Err(Error::Truncated),
        }
    }

    /// Write the value at some offset of a buffer.
    pub fn write(self, buffer: &mut [u8], offset: usize) {
        buffer[offset..offset + 3].copy_from_slice(&self.to_be_bytes())
    }
}

impl From<U24> for u32 {
    fn from(val: U24) -> u32 {
        val.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn be_matches_manual_swap() {
        for &v in &[0u16, 1, 0x1234, 0xff00, 0xffff] {
            let be = Be::new(v);
            assert_eq!(be.value(), v);
            assert_eq!(be.as_bytes(), &[(v >> 8) as u8, v as u8]);
        }

        for &v in &[0u32, 0xdead_beef, 0x0102_0304, u32::max_value()] {
            let be = Be::new(v);
            assert_eq!(be.value(), v);
            let swapped = v.swap_bytes().to_le_bytes();
            assert_eq!(be.as_bytes(), &swapped[..]);
        }

        let be = Be::new(0x0102_0304_0506_0708u64);
        assert_eq!(be.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn be_from_big_endian_does_not_swap() {
        let be = Be::<u16>::from_big_endian([0xab, 0xcd]);
        assert_eq!(be.value(), 0xabcd);
        assert_eq!(be.as_bytes(), &[0xab, 0xcd]);
    }

    #[test]
    fn be_read_write() {
        let mut buffer = [0u8; 6];
        Be::new(0x1122_3344u32).write(&mut buffer, 1);
        assert_eq!(buffer, [0, 0x11, 0x22, 0x33, 0x44, 0]);
        assert_eq!(Be::<u32>::read(&buffer, 1).map(Be::value), Ok(0x1122_3344));
        assert_eq!(Be::<u32>::read(&buffer, 3), Err(Error::Truncated));
        assert_eq!(Be::<u16>::read(&buffer, usize::max_value()), Err(Error::Truncated));
    }

    #[test]
    fn u24_bounds() {
        assert_eq!(U24::new(0x0100_0000), None);
        let val = U24::new(0x00ab_cdef).unwrap();
        assert_eq!(val.to_be_bytes(), [0xab, 0xcd, 0xef]);
        assert_eq!(U24::from_be_bytes([0xab, 0xcd, 0xef]), val);
        assert_eq!(U24::read(&[0, 0, 0x21], 0).map(U24::value), Ok(0x21));
        assert_eq!(U24::read(&[0, 0], 0), Err(Error::Truncated));
    }
}
