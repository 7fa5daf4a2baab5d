//! An [Item Variation Store](https://docs.microsoft.com/en-us/typography/opentype/spec/otvarcommonformats#item-variation-store).

use super::parser::*;

#[derive(Clone, Copy, Debug)]
pub struct ItemVariationStore<'a> {
    data: &'a [u8],
    data_offsets: LazyArray16<'a, u32>,
    regions: VariationRegionList<'a>,
}

impl<'a> ItemVariationStore<'a> {
    pub fn parse(data: &'a [u8]) -> Option<ItemVariationStore<'a>> {
        let mut s = Stream::new(data);
        let format = s.read::<u16>()?;
        if format != 1 {
            return None;
        }

        let region_list_offset = s.read::<u32>()?;
        let count = s.read::<u16>()?;
        let data_offsets = s.read_array16(count)?;

        let regions = {
            let mut s = Stream::new_at(data, usize::num_from(region_list_offset))?;
            let axis_count = s.read::<u16>()?;
            let count = s.read::<u16>()?;
            let total = count.checked_mul(axis_count)?;
            VariationRegionList {
                axis_count,
                regions: s.read_array16(total)?,
            }
        };

        Some(ItemVariationStore {
            data,
            data_offsets,
            regions,
        })
    }

    /// Returns the delta for the given index pair, or `None` on malformed data.
    pub fn parse_delta(&self, outer_index: u16, inner_index: u16, coords: &[i16]) -> Option<f32> {
        let offset = self.data_offsets.get(outer_index)?;
        let mut s = Stream::new_at(self.data, usize::num_from(offset))?;
        let item_count = s.read::<u16>()?;
        let word_delta_count = s.read::<u16>()?;
        let region_index_count = s.read::<u16>()?;
        let region_indices = s.read_array16::<u16>(region_index_count)?;

        if inner_index >= item_count {
            return None;
        }

        let has_long_words = word_delta_count & 0x8000 != 0;
        let word_delta_count = word_delta_count & 0x7FFF;
        if word_delta_count > region_index_count {
            return None;
        }

        // Rows hold `word_delta_count` wide deltas followed by narrow ones.
        let (wide, narrow) = if has_long_words { (4, 2) } else { (2, 1) };
        let row_size = usize::from(word_delta_count) * wide
            + usize::from(region_index_count - word_delta_count) * narrow;
        s.advance(usize::from(inner_index).checked_mul(row_size)?);

        let mut delta = 0.0;
        for (i, region_index) in region_indices.into_iter().enumerate() {
            let value = if i < usize::from(word_delta_count) {
                if has_long_words {
                    s.read::<i32>()? as f32
                } else {
                    f32::from(s.read::<i16>()?)
                }
            } else if has_long_words {
                f32::from(s.read::<i16>()?)
            } else {
                f32::from(s.read::<u8>()? as i8)
            };

            delta += value * self.regions.evaluate_region(region_index, coords);
        }

        Some(delta)
    }
}

#[derive(Clone, Copy, Debug)]
struct VariationRegionList<'a> {
    axis_count: u16,
    regions: LazyArray16<'a, RegionAxisCoordinatesRecord>,
}

impl VariationRegionList<'_> {
    fn len(&self) -> u16 {
        if self.axis_count == 0 {
            0
        } else {
            self.regions.len() / self.axis_count
        }
    }

    fn evaluate_region(&self, index: u16, coords: &[i16]) -> f32 {
        if index >= self.len() {
            return 0.0;
        }

        let mut v = 1.0;
        for i in 0..self.axis_count {
            let coord = coords.get(usize::from(i)).cloned().unwrap_or(0);
            let factor = u32::from(index) * u32::from(self.axis_count) + u32::from(i);
            let Some(record) = u16::try_from(factor)
                .ok()
                .and_then(|idx| self.regions.get(idx))
            else {
                return 0.0;
            };

            let factor = record.evaluate_axis(coord);
            if factor == 0.0 {
                return 0.0;
            }

            v *= factor;
        }

        v
    }
}

#[derive(Clone, Copy, Debug)]
struct RegionAxisCoordinatesRecord {
    start_coord: i16,
    peak_coord: i16,
    end_coord: i16,
}

impl RegionAxisCoordinatesRecord {
    fn evaluate_axis(&self, coord: i16) -> f32 {
        let start = self.start_coord;
        let peak = self.peak_coord;
        let end = self.end_coord;

        if start > peak || peak > end {
            return 1.0;
        }

        if start < 0 && end > 0 && peak != 0 {
            return 1.0;
        }

        if peak == 0 || coord == peak {
            return 1.0;
        }

        if coord <= start || end <= coord {
            return 0.0;
        }

        let (coord, start, peak, end) = (
            i32::from(coord),
            i32::from(start),
            i32::from(peak),
            i32::from(end),
        );
        if coord < peak {
            (coord - start) as f32 / (peak - start) as f32
        } else {
            (end - coord) as f32 / (end - peak) as f32
        }
    }
}

impl FromData for RegionAxisCoordinatesRecord {
    const SIZE: usize = 6;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        let mut s = Stream::new(data);
        Some(RegionAxisCoordinatesRecord {
            start_coord: s.read()?,
            peak_coord: s.read()?,
            end_coord: s.read()?,
        })
    }
}
