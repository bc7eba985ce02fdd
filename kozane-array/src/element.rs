//! Fixed-width array elements.
//!
//! An array stores either `i32` or `i64` cells; the width is chosen through
//! the type parameter of the array and recorded in the array-file header.
//! On-disk byte order is big-endian.

use std::fmt::Debug;

use byteorder::{BigEndian, ByteOrder};

mod sealed {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

/// A fixed-width primitive array element
pub trait Element:
    sealed::Sealed + Copy + Default + PartialEq + Debug + Send + Sync + 'static
{
    /// Width of one element in bytes
    const WIDTH: usize;

    /// Encode into the first `WIDTH` bytes of `buf`
    fn write_to(self, buf: &mut [u8]);

    /// Decode from the first `WIDTH` bytes of `buf`
    fn read_from(buf: &[u8]) -> Self;
}

impl Element for i32 {
    const WIDTH: usize = 4;

    fn write_to(self, buf: &mut [u8]) {
        BigEndian::write_i32(buf, self);
    }

    fn read_from(buf: &[u8]) -> Self {
        BigEndian::read_i32(buf)
    }
}

impl Element for i64 {
    const WIDTH: usize = 8;

    fn write_to(self, buf: &mut [u8]) {
        BigEndian::write_i64(buf, self);
    }

    fn read_from(buf: &[u8]) -> Self {
        BigEndian::read_i64(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut buf = [0u8; 8];
        0x0102_0304i32.write_to(&mut buf);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(i32::read_from(&buf), 0x0102_0304);

        (-1i64).write_to(&mut buf);
        assert_eq!(buf, [0xff; 8]);
        assert_eq!(i64::read_from(&buf), -1);
    }
}
