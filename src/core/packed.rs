//! # Packed Fields
//!
//! Padding-free typed storage with a declared byte order.
//!
//! - [`Packed<T, O>`] is an owned cell holding exactly `size_of::<T>()` bytes.
//! - [`PackedRef`] and [`PackedMut`] are views over an offset in a caller's buffer.
//!   They are built through [`PackedRef::at`] / [`PackedMut::at`], which perform the
//!   only length check at this layer. Views borrow the buffer, so they cannot outlive
//!   it or survive a mutation made through another path.
//!
//! Compound updates (`add`, `sub`, `bit_and`, ...) are plain read-modify-write and are
//! not atomic. They are only for memory the caller exclusively owns, such as a reply
//! buffer under construction.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, BitXor};

use super::byte_order::{ByteOrder, Packable};

/// Integer types that support the compound update helpers.
pub trait Integral:
    Packable + Eq + BitAnd<Output = Self> + BitOr<Output = Self> + BitXor<Output = Self>
{
    const ONE: Self;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
}

macro_rules! integral {
    ($($ty:ty),*) => {
        $(
            impl Integral for $ty {
                const ONE: Self = 1;

                #[inline]
                fn wrapping_add(self, rhs: Self) -> Self {
                    <$ty>::wrapping_add(self, rhs)
                }

                #[inline]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    <$ty>::wrapping_sub(self, rhs)
                }
            }
        )*
    };
}

integral!(i16, u16, i32, u32, i64, u64);

/// Read access to a packed value.
pub trait PackedRead<T: Packable> {
    fn get(&self) -> T;
}

/// Read/write access to a packed value, with explicit read-modify-write helpers.
///
/// Each helper returns the value stored after the update.
pub trait PackedField<T: Packable>: PackedRead<T> {
    fn set(&mut self, value: T);

    #[inline]
    fn update<F: FnOnce(T) -> T>(&mut self, f: F) -> T {
        let next = f(self.get());
        self.set(next);
        next
    }

    #[inline]
    fn add(&mut self, rhs: T) -> T
    where
        T: Integral,
    {
        self.update(|v| v.wrapping_add(rhs))
    }

    #[inline]
    fn sub(&mut self, rhs: T) -> T
    where
        T: Integral,
    {
        self.update(|v| v.wrapping_sub(rhs))
    }

    #[inline]
    fn bit_and(&mut self, rhs: T) -> T
    where
        T: Integral,
    {
        self.update(|v| v & rhs)
    }

    #[inline]
    fn bit_or(&mut self, rhs: T) -> T
    where
        T: Integral,
    {
        self.update(|v| v | rhs)
    }

    #[inline]
    fn bit_xor(&mut self, rhs: T) -> T
    where
        T: Integral,
    {
        self.update(|v| v ^ rhs)
    }

    #[inline]
    fn increment(&mut self) -> T
    where
        T: Integral,
    {
        self.add(T::ONE)
    }

    #[inline]
    fn decrement(&mut self) -> T
    where
        T: Integral,
    {
        self.sub(T::ONE)
    }
}

/// Owned packed cell. `size_of::<Packed<T, O>>() == size_of::<T>()` and the alignment is 1.
#[repr(transparent)]
pub struct Packed<T: Packable, O: ByteOrder> {
    bytes: T::Bytes,
    _marker: PhantomData<(T, O)>,
}

/// Little-endian packed cell, the wire default.
pub type Le<T> = Packed<T, byteorder::LittleEndian>;
/// Big-endian packed cell.
pub type Be<T> = Packed<T, byteorder::BigEndian>;

impl<T: Packable, O: ByteOrder> Packed<T, O> {
    pub fn new(value: T) -> Self {
        let mut cell = Self::from_bytes(T::Bytes::default());
        cell.set(value);
        cell
    }

    /// Wrap bytes that are already in order `O`.
    pub fn from_bytes(bytes: T::Bytes) -> Self {
        Self {
            bytes,
            _marker: PhantomData,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    pub fn into_bytes(self) -> T::Bytes {
        self.bytes
    }
}

impl<T: Packable, O: ByteOrder> PackedRead<T> for Packed<T, O> {
    #[inline]
    fn get(&self) -> T {
        T::read::<O>(self.bytes.as_ref())
    }
}

impl<T: Packable, O: ByteOrder> PackedField<T> for Packed<T, O> {
    #[inline]
    fn set(&mut self, value: T) {
        value.write::<O>(self.bytes.as_mut());
    }
}

impl<T: Packable, O: ByteOrder> Clone for Packed<T, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Packable, O: ByteOrder> Copy for Packed<T, O> {}

// Equality is bitwise, so two NaN cells with the same payload compare equal.
impl<T: Packable, O: ByteOrder> PartialEq for Packed<T, O> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T: Packable, O: ByteOrder> Eq for Packed<T, O> {}

impl<T: Packable, O: ByteOrder> Default for Packed<T, O> {
    fn default() -> Self {
        Self::from_bytes(T::Bytes::default())
    }
}

impl<T: Packable, O: ByteOrder> From<T> for Packed<T, O> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Packable, O: ByteOrder> fmt::Debug for Packed<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Packed").field(&self.get()).finish()
    }
}

/// Read-only view of a packed value inside a buffer.
pub struct PackedRef<'a, T: Packable, O: ByteOrder> {
    bytes: &'a [u8],
    _marker: PhantomData<(T, O)>,
}

impl<'a, T: Packable, O: ByteOrder> PackedRef<'a, T, O> {
    /// View `T::WIDTH` bytes at `offset`, or `None` if they do not fit in `buf`.
    pub fn at(buf: &'a [u8], offset: usize) -> Option<Self> {
        let end = offset.checked_add(T::WIDTH)?;
        buf.get(offset..end).map(|bytes| Self {
            bytes,
            _marker: PhantomData,
        })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl<T: Packable, O: ByteOrder> PackedRead<T> for PackedRef<'_, T, O> {
    #[inline]
    fn get(&self) -> T {
        T::read::<O>(self.bytes)
    }
}

/// Mutable view of a packed value inside a buffer.
pub struct PackedMut<'a, T: Packable, O: ByteOrder> {
    bytes: &'a mut [u8],
    _marker: PhantomData<(T, O)>,
}

impl<'a, T: Packable, O: ByteOrder> PackedMut<'a, T, O> {
    /// View `T::WIDTH` bytes at `offset`, or `None` if they do not fit in `buf`.
    pub fn at(buf: &'a mut [u8], offset: usize) -> Option<Self> {
        let end = offset.checked_add(T::WIDTH)?;
        buf.get_mut(offset..end).map(|bytes| Self {
            bytes,
            _marker: PhantomData,
        })
    }
}

impl<T: Packable, O: ByteOrder> PackedRead<T> for PackedMut<'_, T, O> {
    #[inline]
    fn get(&self) -> T {
        T::read::<O>(self.bytes)
    }
}

impl<T: Packable, O: ByteOrder> PackedField<T> for PackedMut<'_, T, O> {
    #[inline]
    fn set(&mut self, value: T) {
        value.write::<O>(self.bytes);
    }
}

/// Read a `T` at `offset`, if it fits.
#[inline]
pub fn read_at<T: Packable, O: ByteOrder>(buf: &[u8], offset: usize) -> Option<T> {
    PackedRef::<T, O>::at(buf, offset).map(|field| field.get())
}

/// Write a `T` at `offset`. Returns `None` and leaves `buf` untouched if it does not fit.
#[inline]
pub fn write_at<T: Packable, O: ByteOrder>(buf: &mut [u8], offset: usize, value: T) -> Option<()> {
    PackedMut::<T, O>::at(buf, offset).map(|mut field| field.set(value))
}
