//! # Byte Order Codec
//!
//! Conversion of fixed-width scalars between host representation and a declared
//! wire order. Orders are the `byteorder` marker types ([`LittleEndian`],
//! [`BigEndian`], [`NativeEndian`]) so the order is part of the type and the
//! conversion is resolved at compile time.
//!
//! Floating point values are moved as their same-width unsigned bit pattern, never
//! through a numeric conversion, so NaN payloads and denormals survive unchanged.
//! Booleans occupy one byte and are never swapped.
//!
//! ```rust
//! use dbwire::core::byte_order::{from_order, to_order, BigEndian, LittleEndian};
//!
//! let wire = to_order::<i32, LittleEndian>(0x0102_0304);
//! assert_eq!(wire, [0x04, 0x03, 0x02, 0x01]);
//! assert_eq!(from_order::<i32, LittleEndian>(&wire), 0x0102_0304);
//!
//! let be = to_order::<u32, BigEndian>(0x0102_0304);
//! assert_eq!(be, [0x01, 0x02, 0x03, 0x04]);
//! ```

use std::fmt::Debug;
use std::mem::size_of;

pub use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};

/// A scalar that can be stored in exactly `WIDTH` bytes in any byte order.
pub trait Packable: Copy + Debug + Send + Sync + 'static {
    /// Encoded width in bytes. Always equal to `size_of::<Self>()`.
    const WIDTH: usize;

    /// Fixed-size encoded form.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default + Copy + Debug + Eq + Send + Sync;

    /// Decode from the first `WIDTH` bytes of `src`.
    ///
    /// `src` must hold at least `WIDTH` bytes; bounds are the caller's concern.
    fn read<O: ByteOrder>(src: &[u8]) -> Self;

    /// Encode into the first `WIDTH` bytes of `dst`.
    fn write<O: ByteOrder>(self, dst: &mut [u8]);
}

macro_rules! packable_int {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        $(
            impl Packable for $ty {
                const WIDTH: usize = size_of::<$ty>();
                type Bytes = [u8; size_of::<$ty>()];

                #[inline]
                fn read<O: ByteOrder>(src: &[u8]) -> Self {
                    O::$read(src)
                }

                #[inline]
                fn write<O: ByteOrder>(self, dst: &mut [u8]) {
                    O::$write(dst, self)
                }
            }
        )*
    };
}

packable_int! {
    i16 => read_i16, write_i16;
    u16 => read_u16, write_u16;
    i32 => read_i32, write_i32;
    u32 => read_u32, write_u32;
    i64 => read_i64, write_i64;
    u64 => read_u64, write_u64;
}

impl Packable for f32 {
    const WIDTH: usize = size_of::<f32>();
    type Bytes = [u8; 4];

    #[inline]
    fn read<O: ByteOrder>(src: &[u8]) -> Self {
        f32::from_bits(O::read_u32(src))
    }

    #[inline]
    fn write<O: ByteOrder>(self, dst: &mut [u8]) {
        O::write_u32(dst, self.to_bits())
    }
}

impl Packable for f64 {
    const WIDTH: usize = size_of::<f64>();
    type Bytes = [u8; 8];

    #[inline]
    fn read<O: ByteOrder>(src: &[u8]) -> Self {
        f64::from_bits(O::read_u64(src))
    }

    #[inline]
    fn write<O: ByteOrder>(self, dst: &mut [u8]) {
        O::write_u64(dst, self.to_bits())
    }
}

impl Packable for bool {
    const WIDTH: usize = 1;
    type Bytes = [u8; 1];

    #[inline]
    fn read<O: ByteOrder>(src: &[u8]) -> Self {
        src[0] != 0
    }

    #[inline]
    fn write<O: ByteOrder>(self, dst: &mut [u8]) {
        dst[0] = u8::from(self);
    }
}

/// Encode `value` in order `O`.
#[inline]
pub fn to_order<T: Packable, O: ByteOrder>(value: T) -> T::Bytes {
    let mut bytes = T::Bytes::default();
    value.write::<O>(bytes.as_mut());
    bytes
}

/// Decode a value previously encoded in order `O`.
#[inline]
pub fn from_order<T: Packable, O: ByteOrder>(bytes: &T::Bytes) -> T {
    T::read::<O>(bytes.as_ref())
}

/// Reverse the byte order of `value`, preserving the bit pattern of floats.
#[inline]
pub fn byte_swap<T: Packable>(value: T) -> T {
    from_order::<T, BigEndian>(&to_order::<T, LittleEndian>(value))
}

/// Runtime byte order selector, for callers that only learn the order from data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    Little,
    Big,
}

impl Order {
    /// The order of the machine we are running on.
    pub const fn host() -> Self {
        if cfg!(target_endian = "little") {
            Order::Little
        } else {
            Order::Big
        }
    }

    pub fn encode<T: Packable>(self, value: T) -> T::Bytes {
        match self {
            Order::Little => to_order::<T, LittleEndian>(value),
            Order::Big => to_order::<T, BigEndian>(value),
        }
    }

    pub fn decode<T: Packable>(self, bytes: &T::Bytes) -> T {
        match self {
            Order::Little => from_order::<T, LittleEndian>(bytes),
            Order::Big => from_order::<T, BigEndian>(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_and_big_layouts() {
        assert_eq!(to_order::<u16, LittleEndian>(0xABCD), [0xCD, 0xAB]);
        assert_eq!(to_order::<u16, BigEndian>(0xABCD), [0xAB, 0xCD]);
        assert_eq!(
            to_order::<i64, LittleEndian>(1),
            [1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(to_order::<i64, BigEndian>(1), [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_negative_values_round_trip() {
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(from_order::<i32, BigEndian>(&to_order::<i32, BigEndian>(v)), v);
            assert_eq!(
                from_order::<i32, LittleEndian>(&to_order::<i32, LittleEndian>(v)),
                v
            );
        }
    }

    #[test]
    fn test_double_bit_patterns_preserved() {
        let signalling_nan = f64::from_bits(0x7FF0_0000_0000_0001);
        let denormal = f64::from_bits(0x0000_0000_0000_0001);
        for v in [signalling_nan, denormal, -0.0, f64::INFINITY] {
            let le = to_order::<f64, LittleEndian>(v);
            let be = to_order::<f64, BigEndian>(v);
            assert_eq!(from_order::<f64, LittleEndian>(&le).to_bits(), v.to_bits());
            assert_eq!(from_order::<f64, BigEndian>(&be).to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_bool_is_single_unswapped_byte() {
        assert_eq!(to_order::<bool, BigEndian>(true), [1]);
        assert_eq!(to_order::<bool, LittleEndian>(true), [1]);
        assert!(!from_order::<bool, BigEndian>(&[0]));
    }

    #[test]
    fn test_byte_swap() {
        assert_eq!(byte_swap(0x1122_3344u32), 0x4433_2211);
        assert_eq!(byte_swap(byte_swap(-12345i64)), -12345);
        let x = f64::from_bits(0x7FF8_0000_DEAD_BEEF);
        assert_eq!(byte_swap(byte_swap(x)).to_bits(), x.to_bits());
    }

    #[test]
    fn test_runtime_order_matches_static() {
        assert_eq!(Order::Little.encode(7i32), to_order::<i32, LittleEndian>(7));
        assert_eq!(Order::Big.encode(7i32), to_order::<i32, BigEndian>(7));
        assert_eq!(Order::host().encode(7u64), to_order::<u64, NativeEndian>(7));
        assert_eq!(Order::Big.decode::<u32>(&[0, 0, 1, 0]), 256);
    }
}
