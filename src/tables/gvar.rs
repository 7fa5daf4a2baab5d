//! A [Glyph Variations Table](https://docs.microsoft.com/en-us/typography/opentype/spec/gvar).
//!
//! This module only decodes tuple variation data. Applying the deltas to
//! glyph points lives in `crate::var`.

use alloc::vec::Vec;

use super::parser::*;
use ttf_parser::GlyphId;

use crate::var::VariationError;

/// Flags of the `tupleVariationCount` field.
mod tuple_count {
    pub const SHARED_POINT_NUMBERS: u16 = 0x8000;
    pub const COUNT_MASK: u16 = 0x0FFF;
}

/// Flags of the `tupleIndex` field.
mod tuple_flags {
    pub const EMBEDDED_PEAK_TUPLE: u16 = 0x8000;
    pub const INTERMEDIATE_REGION: u16 = 0x4000;
    pub const PRIVATE_POINT_NUMBERS: u16 = 0x2000;
    pub const TUPLE_INDEX_MASK: u16 = 0x0FFF;
}

#[derive(Clone, Copy, Debug)]
enum GlyphVariationDataOffsets<'a> {
    Short(LazyArray32<'a, u16>),
    Long(LazyArray32<'a, u32>),
}

#[derive(Clone, Copy, Debug)]
pub struct Table<'a> {
    axis_count: u16,
    shared_tuples: &'a [u8],
    offsets: GlyphVariationDataOffsets<'a>,
    glyphs_variation_data: &'a [u8],
}

impl<'a> Table<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let mut s = Stream::new(data);
        let version = s.read::<u32>()?;
        if version != 0x00010000 {
            return None;
        }

        let axis_count = s.read::<u16>()?;
        let shared_tuple_count = s.read::<u16>()?;
        let shared_tuples_offset = s.read::<Offset32>()?;
        let glyph_count = s.read::<u16>()?;
        let flags = s.read::<u16>()?;
        let glyph_variation_data_array_offset = s.read::<Offset32>()?;

        // The axis count cannot be zero.
        if axis_count == 0 {
            return None;
        }

        let shared_tuples = {
            let start = shared_tuples_offset.to_usize();
            let len = usize::from(shared_tuple_count) * usize::from(axis_count) * i16::SIZE;
            data.get(start..start.checked_add(len)?)?
        };

        let glyphs_variation_data = data.get(glyph_variation_data_array_offset.to_usize()..)?;
        let offsets_count = u32::from(glyph_count) + 1;
        let offsets = if flags & 1 != 0 {
            GlyphVariationDataOffsets::Long(s.read_array32(offsets_count)?)
        } else {
            GlyphVariationDataOffsets::Short(s.read_array32(offsets_count)?)
        };

        Some(Table {
            axis_count,
            shared_tuples,
            offsets,
            glyphs_variation_data,
        })
    }

    #[inline]
    pub fn axis_count(&self) -> u16 {
        self.axis_count
    }

    fn glyph_variation_data(&self, glyph: GlyphId) -> Option<&'a [u8]> {
        let index = u32::from(glyph.0);
        let (start, end) = match self.offsets {
            GlyphVariationDataOffsets::Short(offsets) => {
                // 'The actual local offset divided by 2 is stored.'
                let start = usize::from(offsets.get(index)?) * 2;
                let end = usize::from(offsets.get(index + 1)?) * 2;
                (start, end)
            }
            GlyphVariationDataOffsets::Long(offsets) => {
                let start = usize::num_from(offsets.get(index)?);
                let end = usize::num_from(offsets.get(index + 1)?);
                (start, end)
            }
        };

        // Ignore empty data.
        if start >= end {
            return None;
        }

        self.glyphs_variation_data.get(start..end)
    }

    /// Returns the active tuples of a glyph for the given normalized coordinates.
    ///
    /// `point_count` is the number of points in the glyph, including phantom points.
    /// Returns `Ok(None)` when the glyph has no variation data.
    pub fn tuples(
        &self,
        glyph: GlyphId,
        coords: &'a [i16],
        point_count: u16,
    ) -> Result<Option<TupleIter<'a>>, VariationError> {
        if coords.len() != usize::from(self.axis_count) {
            return Err(VariationError::UnsupportedConfiguration);
        }

        let Some(data) = self.glyph_variation_data(glyph) else {
            return Ok(None);
        };

        TupleIter::new(data, self, coords, point_count)
            .map(Some)
            .ok_or(VariationError::MalformedData)
    }
}

/// Point numbers referenced by a tuple.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PointNumbers {
    All,
    Explicit(Vec<u16>),
}

/// A decoded tuple with a non-zero scalar.
#[derive(Clone, Debug)]
pub struct VariationTuple {
    pub scalar: f32,
    pub points: PointNumbers,
    pub x_deltas: Vec<i32>,
    pub y_deltas: Vec<i32>,
}

impl VariationTuple {
    /// Iterates over `(point index, scaled x delta, scaled y delta)`.
    pub fn deltas(&self) -> impl Iterator<Item = (usize, f32, f32)> + '_ {
        let deltas = self.x_deltas.iter().zip(&self.y_deltas).enumerate();
        deltas.map(move |(i, (&x, &y))| {
            let point = match self.points {
                PointNumbers::All => i,
                PointNumbers::Explicit(ref points) => {
                    points.get(i).map_or(usize::MAX, |p| usize::from(*p))
                }
            };
            (point, x as f32 * self.scalar, y as f32 * self.scalar)
        })
    }
}

#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct TupleIter<'a> {
    headers: Stream<'a>,
    serialized_data: Stream<'a>,
    shared_points: PointNumbers,
    shared_tuples: &'a [u8],
    axis_count: u16,
    coords: &'a [i16],
    point_count: u16,
    tuples_left: u16,
}

impl<'a> TupleIter<'a> {
    fn new(
        data: &'a [u8],
        table: &Table<'a>,
        coords: &'a [i16],
        point_count: u16,
    ) -> Option<Self> {
        let mut headers = Stream::new(data);
        let tuple_variation_count = headers.read::<u16>()?;
        let data_offset = headers.read::<Offset16>()?;

        let mut serialized_data = Stream::new_at(data, data_offset.to_usize())?;
        let shared_points = if tuple_variation_count & tuple_count::SHARED_POINT_NUMBERS != 0 {
            unpack_points(&mut serialized_data)?
        } else {
            PointNumbers::All
        };

        Some(TupleIter {
            headers,
            serialized_data,
            shared_points,
            shared_tuples: table.shared_tuples,
            axis_count: table.axis_count,
            coords,
            point_count,
            tuples_left: tuple_variation_count & tuple_count::COUNT_MASK,
        })
    }

    fn read_tuple(&self, s: &mut Stream<'a>) -> Option<LazyArray16<'a, i16>> {
        s.read_array16(self.axis_count)
    }

    fn shared_tuple(&self, index: u16) -> Option<LazyArray16<'a, i16>> {
        let offset = usize::from(index) * usize::from(self.axis_count) * i16::SIZE;
        let mut s = Stream::new_at(self.shared_tuples, offset)?;
        s.read_array16(self.axis_count)
    }

    /// Decodes the next header. `Some(None)` means the tuple is inactive.
    fn next_tuple(&mut self) -> Option<Option<VariationTuple>> {
        let mut headers = self.headers.clone();
        let variation_data_size = headers.read::<u16>()?;
        let tuple_index = headers.read::<u16>()?;

        let peak = if tuple_index & tuple_flags::EMBEDDED_PEAK_TUPLE != 0 {
            self.read_tuple(&mut headers)?
        } else {
            self.shared_tuple(tuple_index & tuple_flags::TUPLE_INDEX_MASK)?
        };

        let region = if tuple_index & tuple_flags::INTERMEDIATE_REGION != 0 {
            let start = self.read_tuple(&mut headers)?;
            let end = self.read_tuple(&mut headers)?;
            Some((start, end))
        } else {
            None
        };

        self.headers = headers;

        // The data must be skipped even when the tuple is inactive.
        let data = self.serialized_data.read_bytes(usize::from(variation_data_size))?;

        let scalar = tuple_scalar(self.coords, peak, region);
        if scalar == 0.0 {
            return Some(None);
        }

        let mut s = Stream::new(data);
        let points = if tuple_index & tuple_flags::PRIVATE_POINT_NUMBERS != 0 {
            unpack_points(&mut s)?
        } else {
            self.shared_points.clone()
        };

        let count = match points {
            PointNumbers::All => usize::from(self.point_count),
            PointNumbers::Explicit(ref points) => points.len(),
        };

        let x_deltas = unpack_deltas(&mut s, count)?;
        let y_deltas = unpack_deltas(&mut s, count)?;

        Some(Some(VariationTuple {
            scalar,
            points,
            x_deltas,
            y_deltas,
        }))
    }
}

impl Iterator for TupleIter<'_> {
    type Item = Result<VariationTuple, VariationError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.tuples_left > 0 {
            self.tuples_left -= 1;
            match self.next_tuple() {
                Some(Some(tuple)) => return Some(Ok(tuple)),
                Some(None) => continue,
                None => {
                    self.tuples_left = 0;
                    return Some(Err(VariationError::MalformedData));
                }
            }
        }

        None
    }
}

/// Computes the scalar of a tuple for the given coordinates.
///
/// All values are F2DOT14.
pub fn tuple_scalar(
    coords: &[i16],
    peak: LazyArray16<i16>,
    region: Option<(LazyArray16<i16>, LazyArray16<i16>)>,
) -> f32 {
    let mut scalar = 1.0;
    for (i, peak) in peak.into_iter().enumerate() {
        let v = i32::from(coords.get(i).cloned().unwrap_or(0));
        let peak = i32::from(peak);
        if peak == 0 || v == peak {
            continue;
        }

        if let Some((start_tuple, end_tuple)) = region {
            let index = i as u16;
            let (Some(start), Some(end)) = (start_tuple.get(index), end_tuple.get(index)) else {
                return 0.0;
            };

            let start = i32::from(start);
            let end = i32::from(end);
            if start > peak || peak > end || (start < 0 && end > 0) {
                continue;
            }

            if v < start || v > end {
                return 0.0;
            }

            if v < peak {
                if peak != start {
                    scalar *= (v - start) as f32 / (peak - start) as f32;
                }
            } else if peak != end {
                scalar *= (end - v) as f32 / (end - peak) as f32;
            }
        } else {
            if v == 0 || v < peak.min(0) || v > peak.max(0) {
                return 0.0;
            }

            scalar *= v as f32 / peak as f32;
        }
    }

    scalar
}

/// Decodes packed point numbers.
///
/// A zero count means all points.
pub fn unpack_points(s: &mut Stream) -> Option<PointNumbers> {
    const POINTS_ARE_WORDS: u8 = 0x80;
    const POINT_RUN_COUNT_MASK: u8 = 0x7F;

    let first = s.read::<u8>()?;
    if first == 0 {
        return Some(PointNumbers::All);
    }

    let count = if first & POINTS_ARE_WORDS != 0 {
        let second = s.read::<u8>()?;
        (u16::from(first & POINT_RUN_COUNT_MASK) << 8) | u16::from(second)
    } else {
        u16::from(first)
    };

    let count = usize::from(count);
    let mut points = Vec::with_capacity(count);
    let mut n = 0u16;
    while points.len() < count {
        let control = s.read::<u8>()?;
        let run_count = usize::from(control & POINT_RUN_COUNT_MASK) + 1;
        if points.len() + run_count > count {
            return None;
        }

        for _ in 0..run_count {
            let delta = if control & POINTS_ARE_WORDS != 0 {
                s.read::<u16>()?
            } else {
                u16::from(s.read::<u8>()?)
            };

            n = n.wrapping_add(delta);
            points.push(n);
        }
    }

    Some(PointNumbers::Explicit(points))
}

/// Decodes `count` packed deltas.
pub fn unpack_deltas(s: &mut Stream, count: usize) -> Option<Vec<i32>> {
    const DELTAS_ARE_ZERO: u8 = 0x80;
    const DELTAS_ARE_WORDS: u8 = 0x40;
    const DELTAS_ARE_LONGS: u8 = DELTAS_ARE_ZERO | DELTAS_ARE_WORDS;
    const DELTA_RUN_COUNT_MASK: u8 = 0x3F;

    let mut deltas = Vec::with_capacity(count);
    while deltas.len() < count {
        let control = s.read::<u8>()?;
        let run_count = usize::from(control & DELTA_RUN_COUNT_MASK) + 1;
        if deltas.len() + run_count > count {
            return None;
        }

        for _ in 0..run_count {
            let delta = match control & DELTAS_ARE_LONGS {
                DELTAS_ARE_LONGS => s.read::<i32>()?,
                DELTAS_ARE_ZERO => 0,
                DELTAS_ARE_WORDS => i32::from(s.read::<i16>()?),
                _ => i32::from(s.read::<u8>()? as i8),
            };
            deltas.push(delta);
        }
    }

    Some(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn points(data: &[u8]) -> Option<PointNumbers> {
        unpack_points(&mut Stream::new(data))
    }

    #[test]
    fn packed_points() {
        assert_eq!(points(&[0x00]), Some(PointNumbers::All));
        assert_eq!(points(&[0x02, 0x01, 0x09, 0x06]), Some(PointNumbers::Explicit(vec![9, 15])));
        assert_eq!(
            points(&[0x02, 0x81, 0xbe, 0xef, 0x0c, 0x0f]),
            Some(PointNumbers::Explicit(vec![0xbeef, 0xcafe]))
        );
        assert_eq!(points(&[0x01, 0, 0x07]), Some(PointNumbers::Explicit(vec![7])));
        assert_eq!(
            points(&[0x04, 1, 7, 1, 1, 0xff, 2]),
            Some(PointNumbers::Explicit(vec![7, 8, 263, 265]))
        );
    }

    #[test]
    fn packed_points_malformed() {
        // A run longer than the declared count.
        assert_eq!(points(&[0x01, 0x01, 0x07, 0x08]), None);
        // Truncated data.
        assert_eq!(points(&[0x03, 0x02, 0x07]), None);
    }

    #[test]
    fn packed_deltas() {
        let data = [0x83, 0x40, 0x01, 0x02, 0x01, 0x81, 0x80];
        let deltas = unpack_deltas(&mut Stream::new(&data), 7);
        assert_eq!(deltas, Some(vec![0, 0, 0, 0, 258, -127, -128]));

        let data = [0x03, 0x0A, 0x97, 0x00, 0xC6, 0x87, 0x41, 0x10, 0x22, 0xFB, 0x34];
        let deltas = unpack_deltas(&mut Stream::new(&data), 14);
        assert_eq!(
            deltas,
            Some(vec![10, -105, 0, -58, 0, 0, 0, 0, 0, 0, 0, 0, 4130, -1228])
        );
    }

    #[test]
    fn packed_long_deltas() {
        let data = [0xC0, 0x00, 0x01, 0x00, 0x00];
        let deltas = unpack_deltas(&mut Stream::new(&data), 1);
        assert_eq!(deltas, Some(vec![0x10000]));
    }

    fn tuple(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn scalar_peak_only() {
        let peak = tuple(&[0x4000]);
        let peak = Stream::new(&peak).read_array16::<i16>(1).unwrap();
        assert_eq!(tuple_scalar(&[0x2000], peak, None), 0.5);
        assert_eq!(tuple_scalar(&[0x4000], peak, None), 1.0);
        assert_eq!(tuple_scalar(&[0], peak, None), 0.0);
        assert_eq!(tuple_scalar(&[-0x2000], peak, None), 0.0);
    }

    #[test]
    fn scalar_zero_peak_is_neutral() {
        let peak = tuple(&[0, 0x4000]);
        let peak = Stream::new(&peak).read_array16::<i16>(2).unwrap();
        assert_eq!(tuple_scalar(&[-0x4000, 0x4000], peak, None), 1.0);
        assert_eq!(tuple_scalar(&[0x1234, 0x2000], peak, None), 0.5);
    }

    #[test]
    fn scalar_intermediate_region() {
        let peak = tuple(&[0x2000]);
        let start = tuple(&[0x1000]);
        let end = tuple(&[0x3000]);
        let peak = Stream::new(&peak).read_array16::<i16>(1).unwrap();
        let start = Stream::new(&start).read_array16::<i16>(1).unwrap();
        let end = Stream::new(&end).read_array16::<i16>(1).unwrap();
        let region = Some((start, end));

        assert_eq!(tuple_scalar(&[0x2000], peak, region), 1.0);
        assert_eq!(tuple_scalar(&[0x1800], peak, region), 0.5);
        assert_eq!(tuple_scalar(&[0x2800], peak, region), 0.5);
        assert_eq!(tuple_scalar(&[0x0800], peak, region), 0.0);
        assert_eq!(tuple_scalar(&[0x3800], peak, region), 0.0);
    }
}
