//! Zero-copy views over the binary tables used for positioning and glyph variations.

pub mod gdef;
pub mod gpos;
pub mod gvar;
pub mod layout;
pub mod parser;
pub mod var_store;

use parser::*;

/// A slice-like container with runtime-defined stride.
#[derive(Clone, Copy, Debug)]
pub struct DynArray<'a> {
    data: &'a [u8],
    stride: usize,
}

impl<'a> DynArray<'a> {
    #[inline]
    pub fn new(data: &'a [u8], stride: usize) -> Self {
        Self { data, stride }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        let start = index.checked_mul(self.stride)?;
        let end = start.checked_add(self.stride)?;
        self.data.get(start..end)
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.stride == 0 {
            return 0;
        }

        self.data.len() / self.stride
    }

    #[inline]
    pub fn binary_search_by<F>(&self, mut f: F) -> Option<(usize, &'a [u8])>
    where
        F: FnMut(&[u8]) -> core::cmp::Ordering,
    {
        // Based on Rust std implementation.

        use core::cmp::Ordering;

        let mut size = self.len();
        if size == 0 {
            return None;
        }

        let mut base = 0;
        while size > 1 {
            let half = size / 2;
            let mid = base + half;
            // mid is always in [0, size), that means mid is >= 0 and < size.
            // mid >= 0: by definition
            // mid < size: mid = size / 2 + size / 4 + size / 8 ...
            let cmp = f(self.get(mid)?);
            base = if cmp == Ordering::Greater { base } else { mid };
            size -= half;
        }

        // base is always in [0, size) because base <= mid.
        let value = self.get(base)?;
        if f(value) == Ordering::Equal {
            Some((base, value))
        } else {
            None
        }
    }
}

/// Array of offsets from beginning of `data`.
#[derive(Clone, Copy)]
pub struct Offsets16<'a, T: Offset> {
    data: &'a [u8],
    offsets: LazyArray16<'a, T>, // [Offset16/Offset32]
}

impl<'a, T: Offset + FromData> Offsets16<'a, T> {
    pub fn new(data: &'a [u8], offsets: LazyArray16<'a, T>) -> Self {
        Self { data, offsets }
    }

    pub fn len(&self) -> u16 {
        self.offsets.len()
    }

    pub fn get(&self, index: u16) -> Option<T> {
        self.offsets.get(index)
    }

    /// Returns data at the offset with the specified index.
    ///
    /// NULL offsets resolve to `None`.
    pub fn slice(&self, index: u16) -> Option<&'a [u8]> {
        let offset = self.offsets.get(index)?;
        if offset.is_null() {
            return None;
        }

        self.data.get(offset.to_usize()..)
    }
}

impl<'a, T: Offset + FromData + Copy + core::fmt::Debug> core::fmt::Debug for Offsets16<'a, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{:?}", self.offsets)
    }
}

/// An iterator over `Offset16`.
#[derive(Clone, Copy)]
#[allow(missing_debug_implementations)]
pub struct OffsetsIter16<'a, T: Offset + FromData> {
    offsets: Offsets16<'a, T>,
    index: u16,
}

impl<'a, T: Offset + FromData> IntoIterator for Offsets16<'a, T> {
    type Item = &'a [u8];
    type IntoIter = OffsetsIter16<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        OffsetsIter16 {
            offsets: self,
            index: 0,
        }
    }
}

impl<'a, T: Offset + FromData> Iterator for OffsetsIter16<'a, T> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.offsets.len() {
            let idx = self.index;
            self.index += 1;

            // Skip NULL and out of bounds offsets.
            if let Some(data) = self.offsets.slice(idx) {
                return Some(data);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn dyn_array_binary_search() {
        let data = [0, 1, 0xAA, 0, 5, 0xBB, 0, 9, 0xCC];
        let array = DynArray::new(&data, 3);
        assert_eq!(array.len(), 3);

        let found = array.binary_search_by(|rec| {
            Stream::read_at::<u16>(rec, 0).map_or(core::cmp::Ordering::Less, |v| v.cmp(&5))
        });
        assert_eq!(found, Some((1, &data[3..6])));

        let missing = array.binary_search_by(|rec| {
            Stream::read_at::<u16>(rec, 0).map_or(core::cmp::Ordering::Less, |v| v.cmp(&6))
        });
        assert_eq!(missing, None);
    }

    #[test]
    fn offsets_skip_null() {
        // count = 3, offsets = [8, 0, 9], followed by payload.
        let data: &[u8] = &[0, 3, 0, 8, 0, 0, 0, 9, 0x11, 0x22];
        let offsets = data.offsets_at(2, 3).unwrap();
        assert_eq!(offsets.slice(1), None);

        let items: Vec<&[u8]> = offsets.into_iter().collect();
        assert_eq!(items, vec![&data[8..], &data[9..]]);
    }
}
