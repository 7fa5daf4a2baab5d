//! Lookup lists, glyph coverage and classes, devices and sequence context rules.

use core::cmp::Ordering;

use ttf_parser::GlyphId;

use super::parser::*;
use super::Offsets16;
use crate::set_digest::SetDigest;

/// Upper bound on chained extension subtables.
const MAX_EXTENSION_DEPTH: usize = 8;

/// A type-safe wrapper for a lookup index.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug)]
pub struct LookupIndex(pub u16);

impl FromData for LookupIndex {
    const SIZE: usize = 2;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        u16::parse(data).map(Self)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LookupList<'a> {
    lookups: Offsets16<'a, Offset16>,
}

impl<'a> LookupList<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let count = data.read_at::<u16>(0)?;
        let lookups = data.offsets_at(2, count)?;
        Some(LookupList { lookups })
    }

    pub fn len(&self) -> u16 {
        self.lookups.len()
    }

    pub fn get(&self, index: LookupIndex) -> Option<Lookup<'a>> {
        Lookup::parse(self.lookups.slice(index.0)?)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Lookup<'a> {
    pub kind: u16,
    pub flags: LookupFlags,
    pub subtables: Offsets16<'a, Offset16>,
    pub mark_filtering_set: Option<u16>,
}

impl<'a> Lookup<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let kind = data.read_at::<u16>(0)?;
        let flags = data.read_at::<LookupFlags>(2)?;
        let count = data.read_at::<u16>(4)?;
        let subtables = data.offsets_at(6, count)?;

        // The set index follows the subtable offsets.
        let mark_filtering_set = if flags.contains(LookupFlags::USE_MARK_FILTERING_SET) {
            Some(data.read_at::<u16>(6 + usize::from(count) * Offset16::SIZE)?)
        } else {
            None
        };

        Some(Self {
            kind,
            flags,
            subtables,
            mark_filtering_set,
        })
    }

    /// Lookup flags in the low half, the mark filtering set in the high half.
    pub fn props(&self) -> u32 {
        let set = self.mark_filtering_set.map_or(0, u32::from);
        (set << 16) | u32::from(self.flags.bits())
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct LookupFlags: u16 {
        const RIGHT_TO_LEFT          = 0x0001;
        const IGNORE_BASE_GLYPHS     = 0x0002;
        const IGNORE_LIGATURES       = 0x0004;
        const IGNORE_MARKS           = 0x0008;
        const IGNORE_FLAGS           = 0x000E;
        const USE_MARK_FILTERING_SET = 0x0010;
        const MARK_ATTACHMENT_TYPE   = 0xFF00;
    }
}

impl FromData for LookupFlags {
    const SIZE: usize = 2;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        u16::parse(data).map(Self::from_bits_retain)
    }
}

/// Resolves an extension subtable into the wrapped subtable and its lookup type.
///
/// Extensions of extensions are followed at most `MAX_EXTENSION_DEPTH` times,
/// so a self-referencing chain is rejected instead of looping.
pub fn resolve_extension(data: &[u8], extension_kind: u16) -> Option<(&[u8], u16)> {
    let mut current = data;
    for _ in 0..MAX_EXTENSION_DEPTH {
        if current.read_at::<u16>(0)? != 1 {
            return None;
        }

        let kind = current.read_at::<u16>(2)?;
        let offset = current.read_at::<Offset32>(4)?;
        current = current.get(offset.to_usize()..)?;
        if kind != extension_kind {
            return Some((current, kind));
        }
    }

    log::debug!("extension chain is deeper than {}", MAX_EXTENSION_DEPTH);
    None
}

/// An ordered set of glyphs.
///
/// https://docs.microsoft.com/en-us/typography/opentype/spec/chapter2#coverage-table
#[derive(Clone, Copy, Debug)]
pub enum Coverage<'a> {
    /// Sorted glyph ids; the index is the position in the list.
    Glyphs(LazyArray16<'a, GlyphId>),
    /// Sorted glyph ranges carrying the index of their first glyph.
    Ranges(LazyArray16<'a, RangeRecord>),
}

impl<'a> Coverage<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let format = data.read_at::<u16>(0)?;
        let count = data.read_at::<u16>(2)?;
        match format {
            1 => data.array_at(4, count).map(Self::Glyphs),
            2 => data.array_at(4, count).map(Self::Ranges),
            _ => None,
        }
    }

    /// Returns the coverage index of the glyph.
    ///
    /// Any glyph id is accepted: glyphs outside of the table are not covered.
    pub fn index_of(&self, glyph: GlyphId) -> Option<u16> {
        match *self {
            Self::Glyphs(glyphs) => glyphs.binary_search(&glyph).map(|(index, _)| index),
            Self::Ranges(ranges) => {
                let range = find_range(ranges, glyph)?;
                range.value.checked_add(glyph.0 - range.start.0)
            }
        }
    }

    #[inline]
    pub fn contains(&self, glyph: GlyphId) -> bool {
        self.index_of(glyph).is_some()
    }

    /// Adds every covered glyph to a digest.
    pub fn collect(&self, digest: &mut SetDigest) {
        match *self {
            Self::Glyphs(glyphs) => digest.add_array(glyphs),
            Self::Ranges(ranges) => {
                for range in ranges {
                    digest.add_range(range.start, range.end);
                }
            }
        }
    }
}

/// A mapping from glyphs to classes.
///
/// https://docs.microsoft.com/en-us/typography/opentype/spec/chapter2#class-definition-table
#[derive(Clone, Copy, Default, Debug)]
pub enum ClassDef<'a> {
    /// Every glyph is in class 0.
    #[default]
    Empty,
    /// Classes of consecutive glyphs starting at `first`.
    Array {
        first: GlyphId,
        classes: LazyArray16<'a, u16>,
    },
    /// Glyph ranges carrying their class.
    Ranges(LazyArray16<'a, RangeRecord>),
}

impl<'a> ClassDef<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        match data.read_at::<u16>(0)? {
            1 => {
                let first = data.read_at::<GlyphId>(2)?;
                let count = data.read_at::<u16>(4)?;
                let classes = data.array_at(6, count)?;
                Some(Self::Array { first, classes })
            }
            2 => {
                let count = data.read_at::<u16>(2)?;
                data.array_at(4, count).map(Self::Ranges)
            }
            _ => None,
        }
    }

    /// Returns the class of the glyph.
    ///
    /// Any glyph id is accepted: glyphs outside of the table are in class 0.
    pub fn class_of(&self, glyph: GlyphId) -> u16 {
        let class = match *self {
            Self::Empty => None,
            Self::Array { first, classes } => glyph
                .0
                .checked_sub(first.0)
                .and_then(|index| classes.get(index)),
            Self::Ranges(ranges) => find_range(ranges, glyph).map(|range| range.value),
        };

        class.unwrap_or(0)
    }
}

/// Reads the class definition behind the offset at `pos`.
///
/// NULL and malformed class definitions put every glyph into class 0.
pub(crate) fn class_def_at(data: &[u8], pos: usize) -> Option<ClassDef> {
    data.read_at::<Offset16>(pos)?;
    Some(
        data.follow16(pos)
            .and_then(ClassDef::parse)
            .unwrap_or_default(),
    )
}

/// A range of glyphs with a start coverage index or a class.
#[derive(Clone, Copy, Debug)]
pub struct RangeRecord {
    start: GlyphId,
    end: GlyphId,
    value: u16,
}

impl FromData for RangeRecord {
    const SIZE: usize = 6;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        Some(Self {
            start: data.read_at(0)?,
            end: data.read_at(2)?,
            value: data.read_at(4)?,
        })
    }
}

fn find_range(ranges: LazyArray16<RangeRecord>, glyph: GlyphId) -> Option<RangeRecord> {
    let (_, range) = ranges.binary_search_by(|range| {
        if range.end < glyph {
            Ordering::Less
        } else if range.start > glyph {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })?;
    Some(range)
}

/// A device or a variation index table.
///
/// https://docs.microsoft.com/en-us/typography/opentype/spec/chapter2#device-and-variationindex-tables
#[derive(Clone, Copy, Debug)]
pub enum Device<'a> {
    Hinting(HintingDevice<'a>),
    Variation(VariationDevice),
}

impl<'a> Device<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let format = data.read_at::<u16>(4)?;
        if format == 0x8000 {
            return Some(Self::Variation(VariationDevice {
                outer_index: data.read_at(0)?,
                inner_index: data.read_at(2)?,
            }));
        }

        if !(1..=3).contains(&format) {
            return None;
        }

        let start_size = data.read_at::<u16>(0)?;
        let end_size = data.read_at::<u16>(2)?;
        if end_size < start_size {
            return None;
        }

        // 2, 4 or 8 bits per size.
        let bits = 1u32 << format;
        let sizes = u32::from(end_size - start_size) + 1;
        let words = u16::try_from(sizes.div_ceil(16 / bits)).ok()?;
        Some(Self::Hinting(HintingDevice {
            start_size,
            end_size,
            bits,
            words: data.array_at(6, words)?,
        }))
    }
}

/// Pixel adjustments for a range of sizes.
#[derive(Clone, Copy, Debug)]
pub struct HintingDevice<'a> {
    start_size: u16,
    end_size: u16,
    bits: u32,
    words: LazyArray16<'a, u16>,
}

impl HintingDevice<'_> {
    /// Returns the signed pixel delta for `ppem`, if the device covers it.
    pub fn pixels(&self, ppem: u16) -> Option<i32> {
        if ppem == 0 || ppem < self.start_size || ppem > self.end_size {
            return None;
        }

        let per_word = 16 / self.bits;
        let index = u32::from(ppem - self.start_size);
        let word = self.words.get(u16::try_from(index / per_word).ok()?)?;

        // Values are packed from the most significant bits.
        let shift = 16 - self.bits * (index % per_word + 1);
        let raw = (u32::from(word) >> shift) & ((1 << self.bits) - 1);

        let mut delta = raw as i32;
        if raw >= 1 << (self.bits - 1) {
            delta -= 1 << self.bits;
        }

        Some(delta)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct VariationDevice {
    pub outer_index: u16,
    pub inner_index: u16,
}

/// A contextual or chained contextual subtable.
///
/// Plain contextual rules are chained rules with empty backtrack and lookahead
/// sequences, so both lookup types share this representation.
#[derive(Clone, Copy, Debug)]
pub struct SequenceContext<'a> {
    pub coverage: Coverage<'a>,
    pub chained: bool,
    pub rules: SequenceRules<'a>,
}

#[derive(Clone, Copy, Debug)]
pub enum SequenceRules<'a> {
    /// Rule sets indexed by the coverage index of the first glyph.
    Glyphs(Offsets16<'a, Offset16>),
    /// Rule sets indexed by the input class of the first glyph.
    ///
    /// Classes are in backtrack, input, lookahead order.
    Classes {
        classes: [ClassDef<'a>; 3],
        sets: Offsets16<'a, Offset16>,
    },
    /// A single rule made of coverage offsets relative to `data`.
    ///
    /// The input sequence excludes the first glyph.
    Coverages {
        data: &'a [u8],
        coverages: [LazyArray16<'a, Offset16>; 3],
        lookups: LazyArray16<'a, LookupRecord>,
    },
}

impl<'a> SequenceContext<'a> {
    /// Parses a contextual positioning subtable.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let coverage_at = |pos| data.follow16(pos).and_then(Coverage::parse);
        let rules = match data.read_at::<u16>(0)? {
            1 => {
                let count = data.read_at::<u16>(4)?;
                SequenceRules::Glyphs(data.offsets_at(6, count)?)
            }
            2 => {
                let input = class_def_at(data, 4)?;
                let count = data.read_at::<u16>(6)?;
                SequenceRules::Classes {
                    classes: [ClassDef::Empty, input, ClassDef::Empty],
                    sets: data.offsets_at(8, count)?,
                }
            }
            3 => {
                let input_count = data.read_at::<u16>(2)?;
                let lookup_count = data.read_at::<u16>(4)?;
                let input = data.array_at(8, input_count.checked_sub(1)?)?;
                let lookups_pos = 6 + usize::from(input_count) * Offset16::SIZE;
                return Some(Self {
                    coverage: coverage_at(6)?,
                    chained: false,
                    rules: SequenceRules::Coverages {
                        data,
                        coverages: [LazyArray16::default(), input, LazyArray16::default()],
                        lookups: data.array_at(lookups_pos, lookup_count)?,
                    },
                });
            }
            _ => return None,
        };

        Some(Self {
            coverage: coverage_at(2)?,
            chained: false,
            rules,
        })
    }

    /// Parses a chained contextual positioning subtable.
    pub fn parse_chained(data: &'a [u8]) -> Option<Self> {
        let coverage_at = |pos| data.follow16(pos).and_then(Coverage::parse);
        let rules = match data.read_at::<u16>(0)? {
            1 => {
                let count = data.read_at::<u16>(4)?;
                SequenceRules::Glyphs(data.offsets_at(6, count)?)
            }
            2 => {
                let classes = [
                    class_def_at(data, 4)?,
                    class_def_at(data, 6)?,
                    class_def_at(data, 8)?,
                ];
                let count = data.read_at::<u16>(10)?;
                SequenceRules::Classes {
                    classes,
                    sets: data.offsets_at(12, count)?,
                }
            }
            3 => {
                let mut s = Stream::new_at(data, 2)?;
                let backtrack = read_counted(&mut s, false)?;
                let input_count = s.read::<u16>()?;
                let coverage = coverage_at(s.offset())?;
                s.skip::<Offset16>();
                let input = s.read_array16(input_count.checked_sub(1)?)?;
                let lookahead = read_counted(&mut s, false)?;
                let lookups = read_counted(&mut s, false)?;
                return Some(Self {
                    coverage,
                    chained: true,
                    rules: SequenceRules::Coverages {
                        data,
                        coverages: [backtrack, input, lookahead],
                        lookups,
                    },
                });
            }
            _ => return None,
        };

        Some(Self {
            coverage: coverage_at(2)?,
            chained: true,
            rules,
        })
    }

    /// Returns the rules of the set at `index`.
    pub fn rule_set(&self, index: u16) -> Option<RuleSet<'a>> {
        let sets = match self.rules {
            SequenceRules::Glyphs(sets) => sets,
            SequenceRules::Classes { sets, .. } => sets,
            SequenceRules::Coverages { .. } => return None,
        };

        let data = sets.slice(index)?;
        let count = data.read_at::<u16>(0)?;
        Some(RuleSet {
            rules: data.offsets_at(2, count)?,
            chained: self.chained,
        })
    }
}

/// Reads a count followed by that many values.
///
/// With `includes_first`, the count also covers a value stored elsewhere.
fn read_counted<'a, T: FromData>(
    s: &mut Stream<'a>,
    includes_first: bool,
) -> Option<LazyArray16<'a, T>> {
    let count = s.read::<u16>()?;
    let count = if includes_first {
        count.checked_sub(1)?
    } else {
        count
    };
    s.read_array16(count)
}

/// Rules tried in order until one of them matches.
#[derive(Clone, Copy, Debug)]
pub struct RuleSet<'a> {
    rules: Offsets16<'a, Offset16>,
    chained: bool,
}

impl<'a> RuleSet<'a> {
    /// Iterates over well-formed rules, skipping the rest.
    pub fn rules(&self) -> impl Iterator<Item = SequenceRule<'a>> {
        let chained = self.chained;
        self.rules.into_iter().filter_map(move |data| {
            if chained {
                SequenceRule::parse_chained(data)
            } else {
                SequenceRule::parse(data)
            }
        })
    }
}

/// Glyph ids or classes to match, in backtrack, input and lookahead order.
///
/// The input sequence excludes the first glyph.
#[derive(Clone, Copy, Debug)]
pub struct SequenceRule<'a> {
    pub sequences: [LazyArray16<'a, u16>; 3],
    pub lookups: LazyArray16<'a, LookupRecord>,
}

impl<'a> SequenceRule<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let input_count = data.read_at::<u16>(0)?;
        let lookup_count = data.read_at::<u16>(2)?;
        let input = data.array_at(4, input_count.checked_sub(1)?)?;
        let lookups_pos = 4 + usize::from(input.len()) * u16::SIZE;
        Some(Self {
            sequences: [LazyArray16::default(), input, LazyArray16::default()],
            lookups: data.array_at(lookups_pos, lookup_count)?,
        })
    }

    fn parse_chained(data: &'a [u8]) -> Option<Self> {
        let mut s = Stream::new(data);
        let backtrack = read_counted(&mut s, false)?;
        let input = read_counted(&mut s, true)?;
        let lookahead = read_counted(&mut s, false)?;
        let lookups = read_counted(&mut s, false)?;
        Some(Self {
            sequences: [backtrack, input, lookahead],
            lookups,
        })
    }
}

/// A nested lookup to apply at a position of the matched input.
#[derive(Clone, Copy, Debug)]
pub struct LookupRecord {
    pub sequence_index: u16,
    pub lookup_index: LookupIndex,
}

impl FromData for LookupRecord {
    const SIZE: usize = 4;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        Some(Self {
            sequence_index: data.read_at(0)?,
            lookup_index: data.read_at(2)?,
        })
    }
}
