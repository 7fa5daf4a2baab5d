//! Big-endian readers shared by all table views.
//!
//! Offsets are always resolved against the bytes of the table that declares them,
//! and every read goes through a single bounds check on that slice.

pub use ttf_parser::{FromData, LazyArray16, LazyArray32};

use super::{DynArray, Offsets16};

/// Lossless conversion between integer types.
pub trait NumFrom<T>: Sized {
    fn num_from(_: T) -> Self;
}

impl NumFrom<u32> for usize {
    #[inline]
    fn num_from(v: u32) -> Self {
        // usize is at least 32 bits on every supported target.
        v as usize
    }
}

/// Common offset methods.
pub trait Offset {
    /// Converts the offset to `usize`.
    fn to_usize(&self) -> usize;

    /// Checks that the offset is NULL.
    fn is_null(&self) -> bool {
        self.to_usize() == 0
    }
}

/// A 16-bit offset.
#[derive(Clone, Copy, Debug)]
pub struct Offset16(pub u16);

impl Offset16 {
    /// Returns `None` for a NULL offset.
    #[inline]
    pub fn non_null(self) -> Option<Self> {
        if self.0 != 0 {
            Some(self)
        } else {
            None
        }
    }
}

impl Offset for Offset16 {
    #[inline]
    fn to_usize(&self) -> usize {
        usize::from(self.0)
    }
}

impl FromData for Offset16 {
    const SIZE: usize = 2;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        u16::parse(data).map(Offset16)
    }
}

/// A 32-bit offset.
#[derive(Clone, Copy, Debug)]
pub struct Offset32(pub u32);

impl Offset32 {
    /// Returns `None` for a NULL offset.
    #[inline]
    pub fn non_null(self) -> Option<Self> {
        if self.0 != 0 {
            Some(self)
        } else {
            None
        }
    }
}

impl Offset for Offset32 {
    #[inline]
    fn to_usize(&self) -> usize {
        usize::num_from(self.0)
    }
}

impl FromData for Offset32 {
    const SIZE: usize = 4;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        u32::parse(data).map(Offset32)
    }
}

/// A streaming binary parser.
#[derive(Clone, Default, Debug)]
pub struct Stream<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Stream<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Stream { data, offset: 0 }
    }

    /// Creates a parser at `offset`, or `None` when it is out of bounds.
    #[inline]
    pub fn new_at(data: &'a [u8], offset: usize) -> Option<Self> {
        if offset <= data.len() {
            Some(Stream { data, offset })
        } else {
            None
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Advances by `FromData::SIZE` without a bounds check.
    #[inline]
    pub fn skip<T: FromData>(&mut self) {
        self.advance(T::SIZE);
    }

    /// Advances by `len` without a bounds check.
    #[inline]
    pub fn advance(&mut self, len: usize) {
        self.offset = self.offset.saturating_add(len);
    }

    #[inline]
    pub fn read<T: FromData>(&mut self) -> Option<T> {
        self.read_bytes(T::SIZE).and_then(T::parse)
    }

    #[inline]
    pub fn read_at<T: FromData>(data: &[u8], offset: usize) -> Option<T> {
        data.read_at(offset)
    }

    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let v = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(v)
    }

    #[inline]
    pub fn read_array16<T: FromData>(&mut self, count: u16) -> Option<LazyArray16<'a, T>> {
        let len = usize::from(count) * T::SIZE;
        self.read_bytes(len).map(LazyArray16::new)
    }

    #[inline]
    pub fn read_array32<T: FromData>(&mut self, count: u32) -> Option<LazyArray32<'a, T>> {
        let len = usize::num_from(count).checked_mul(T::SIZE)?;
        self.read_bytes(len).map(LazyArray32::new)
    }
}

/// Typed reads at fixed positions of a table.
///
/// Each accessor checks the requested range once and hands back a view that
/// cannot read past it.
pub trait TableData<'a>: Copy {
    /// Reads a value at `pos`.
    fn read_at<T: FromData>(self, pos: usize) -> Option<T>;

    /// Returns `count` consecutive values starting at `pos`.
    fn array_at<T: FromData>(self, pos: usize, count: u16) -> Option<LazyArray16<'a, T>>;

    /// Returns `count` records of `stride` bytes starting at `pos`.
    fn records_at(self, pos: usize, count: usize, stride: usize) -> Option<DynArray<'a>>;

    /// Returns `count` offsets starting at `pos`, resolved against this table.
    fn offsets_at(self, pos: usize, count: u16) -> Option<Offsets16<'a, Offset16>>;

    /// Follows the offset stored at `pos`.
    ///
    /// Returns `None` for a NULL or out of bounds offset.
    fn follow16(self, pos: usize) -> Option<&'a [u8]>;
}

impl<'a> TableData<'a> for &'a [u8] {
    #[inline]
    fn read_at<T: FromData>(self, pos: usize) -> Option<T> {
        self.get(pos..pos.checked_add(T::SIZE)?).and_then(T::parse)
    }

    #[inline]
    fn array_at<T: FromData>(self, pos: usize, count: u16) -> Option<LazyArray16<'a, T>> {
        let len = usize::from(count) * T::SIZE;
        self.get(pos..pos.checked_add(len)?).map(LazyArray16::new)
    }

    #[inline]
    fn records_at(self, pos: usize, count: usize, stride: usize) -> Option<DynArray<'a>> {
        let len = count.checked_mul(stride)?;
        self.get(pos..pos.checked_add(len)?)
            .map(|data| DynArray::new(data, stride))
    }

    #[inline]
    fn offsets_at(self, pos: usize, count: u16) -> Option<Offsets16<'a, Offset16>> {
        let offsets = self.array_at(pos, count)?;
        Some(Offsets16::new(self, offsets))
    }

    #[inline]
    fn follow16(self, pos: usize) -> Option<&'a [u8]> {
        let offset = self.read_at::<Offset16>(pos)?.non_null()?;
        self.get(offset.to_usize()..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_bounded() {
        let data: &[u8] = &[0, 1, 0, 2, 0xFF];
        assert_eq!(data.read_at::<u16>(2), Some(2));
        assert_eq!(data.read_at::<u16>(4), None);
        assert_eq!(data.read_at::<u16>(usize::MAX), None);

        let array = data.array_at::<u16>(0, 2).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(1), Some(2));
        assert!(data.array_at::<u16>(2, 2).is_none());
    }

    #[test]
    fn null_offsets_are_not_followed() {
        let data: &[u8] = &[0, 0, 0, 4, 0xAB];
        assert_eq!(data.follow16(0), None);
        assert_eq!(data.follow16(2), Some(&[0xAB][..]));
        assert_eq!(data.follow16(4), None);
    }

    #[test]
    fn stream_stops_at_the_end() {
        let mut s = Stream::new(&[0, 7, 1]);
        assert_eq!(s.read::<u16>(), Some(7));
        assert_eq!(s.read::<u16>(), None);
        assert_eq!(s.offset(), 2);
    }
}
