//! The Glyph Positioning Table.

use alloc::vec::Vec;

use ttf_parser::GlyphId;

use super::layout::*;
use super::parser::*;
use super::{DynArray, Offsets16};
use crate::set_digest::SetDigest;

pub mod lookup_type {
    pub const SINGLE: u16 = 1;
    pub const PAIR: u16 = 2;
    pub const CURSIVE: u16 = 3;
    pub const MARK_TO_BASE: u16 = 4;
    pub const MARK_TO_LIGATURE: u16 = 5;
    pub const MARK_TO_MARK: u16 = 6;
    pub const CONTEXT: u16 = 7;
    pub const CHAIN_CONTEXT: u16 = 8;
    pub const EXTENSION: u16 = 9;
}

/// Parsed lookups of a GPOS table. Script and feature lists are not used.
#[derive(Clone, Debug)]
pub struct PosTable<'a> {
    pub lookups: Vec<Option<PosLookup<'a>>>,
}

impl<'a> PosTable<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.read_at::<u16>(0)? != 1 {
            return None;
        }

        let list = LookupList::parse(data.follow16(8)?)?;
        let lookups = (0..list.len())
            .map(|i| list.get(LookupIndex(i)).map(PosLookup::parse))
            .collect();

        Some(Self { lookups })
    }

    pub fn get_lookup(&self, index: LookupIndex) -> Option<&PosLookup<'a>> {
        self.lookups.get(usize::from(index.0))?.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct PosLookup<'a> {
    pub subtables: Vec<PosSubtable<'a>>,
    pub digest: SetDigest,
    pub props: u32,
}

impl<'a> PosLookup<'a> {
    pub fn parse(lookup: Lookup<'a>) -> Self {
        let subtables: Vec<_> = lookup
            .subtables
            .into_iter()
            .filter_map(|data| PosSubtable::parse(data, lookup.kind))
            .collect();

        let mut digest = SetDigest::new();
        for subtable in &subtables {
            subtable.coverage().collect(&mut digest);
        }

        Self {
            subtables,
            digest,
            props: lookup.props(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum PosSubtable<'a> {
    Single(SinglePos<'a>),
    Pair(PairPos<'a>),
    Cursive(CursivePos<'a>),
    MarkAttach(MarkAttachPos<'a>),
    Context(SequenceContext<'a>),
}

impl<'a> PosSubtable<'a> {
    pub fn parse(data: &'a [u8], kind: u16) -> Option<Self> {
        let (data, kind) = if kind == lookup_type::EXTENSION {
            resolve_extension(data, kind)?
        } else {
            (data, kind)
        };

        match kind {
            lookup_type::SINGLE => SinglePos::parse(data).map(Self::Single),
            lookup_type::PAIR => PairPos::parse(data).map(Self::Pair),
            lookup_type::CURSIVE => CursivePos::parse(data).map(Self::Cursive),
            lookup_type::MARK_TO_BASE => {
                MarkAttachPos::parse(data, MarkTarget::Base).map(Self::MarkAttach)
            }
            lookup_type::MARK_TO_LIGATURE => {
                MarkAttachPos::parse(data, MarkTarget::Ligature).map(Self::MarkAttach)
            }
            lookup_type::MARK_TO_MARK => {
                MarkAttachPos::parse(data, MarkTarget::Mark).map(Self::MarkAttach)
            }
            lookup_type::CONTEXT => SequenceContext::parse(data).map(Self::Context),
            lookup_type::CHAIN_CONTEXT => SequenceContext::parse_chained(data).map(Self::Context),
            _ => {
                log::debug!("skipping GPOS subtable of unknown type {}", kind);
                None
            }
        }
    }

    pub fn coverage(&self) -> Coverage<'a> {
        match self {
            Self::Single(t) => t.coverage,
            Self::Pair(t) => t.coverage,
            Self::Cursive(t) => t.coverage,
            Self::MarkAttach(t) => t.mark_coverage,
            Self::Context(t) => t.coverage,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SinglePos<'a> {
    data: &'a [u8],
    pub coverage: Coverage<'a>,
    flags: ValueFormatFlags,
    values: SingleValues<'a>,
}

#[derive(Clone, Copy, Debug)]
enum SingleValues<'a> {
    /// One record for every covered glyph.
    Shared(&'a [u8]),
    /// A record per coverage index.
    PerGlyph(DynArray<'a>),
}

impl<'a> SinglePos<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let format = data.read_at::<u16>(0)?;
        let coverage = Coverage::parse(data.follow16(2)?)?;
        let flags = data.read_at::<ValueFormatFlags>(4)?;
        let values = match format {
            1 => SingleValues::Shared(data.get(6..6 + flags.size())?),
            2 => {
                let count = data.read_at::<u16>(6)?;
                SingleValues::PerGlyph(data.records_at(8, usize::from(count), flags.size())?)
            }
            _ => return None,
        };

        Some(Self {
            data,
            coverage,
            flags,
            values,
        })
    }

    /// Returns the value record for a covered glyph and the data its devices are relative to.
    pub fn value(&self, glyph: GlyphId) -> Option<(&'a [u8], ValueRecord<'a>)> {
        let index = self.coverage.index_of(glyph)?;
        let record = match self.values {
            SingleValues::Shared(record) => record,
            // Records of an empty format have no bytes and any index resolves.
            SingleValues::PerGlyph(records) => records.get(usize::from(index))?,
        };

        Some((self.data, ValueRecord::new(record, self.flags)))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PairPos<'a> {
    pub coverage: Coverage<'a>,
    pub flags: [ValueFormatFlags; 2],
    pairs: PairValues<'a>,
}

#[derive(Clone, Copy, Debug)]
enum PairValues<'a> {
    /// Pair sets indexed by the coverage index of the first glyph.
    Glyphs(Offsets16<'a, Offset16>),
    /// A matrix indexed by the classes of both glyphs.
    Classes {
        data: &'a [u8],
        classes: [ClassDef<'a>; 2],
        matrix: ClassMatrix<'a>,
    },
}

impl<'a> PairPos<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let format = data.read_at::<u16>(0)?;
        let coverage = Coverage::parse(data.follow16(2)?)?;
        let flags = [
            data.read_at::<ValueFormatFlags>(4)?,
            data.read_at::<ValueFormatFlags>(6)?,
        ];

        let pairs = match format {
            1 => {
                let count = data.read_at::<u16>(8)?;
                PairValues::Glyphs(data.offsets_at(10, count)?)
            }
            2 => {
                let classes = [class_def_at(data, 8)?, class_def_at(data, 10)?];
                let counts = [data.read_at::<u16>(12)?, data.read_at::<u16>(14)?];
                let matrix = ClassMatrix::parse(data, 16, counts, flags)?;
                PairValues::Classes {
                    data,
                    classes,
                    matrix,
                }
            }
            _ => return None,
        };

        Some(Self {
            coverage,
            flags,
            pairs,
        })
    }

    /// Returns the value records for a glyph pair and the data their devices are relative to.
    ///
    /// `first_index` is the coverage index of the first glyph.
    pub fn values(
        &self,
        first: GlyphId,
        first_index: u16,
        second: GlyphId,
    ) -> Option<(&'a [u8], [ValueRecord<'a>; 2])> {
        match self.pairs {
            PairValues::Glyphs(sets) => {
                let data = sets.slice(first_index)?;
                let set = PairSet::parse(data, self.flags)?;
                Some((data, set.get(second)?))
            }
            PairValues::Classes {
                data,
                classes,
                matrix,
            } => {
                let classes = [classes[0].class_of(first), classes[1].class_of(second)];
                Some((data, matrix.get(classes)?))
            }
        }
    }
}

/// Splits a pair record into the records of both glyphs.
fn split_pair<'a>(
    record: &'a [u8],
    flags: [ValueFormatFlags; 2],
) -> Option<[ValueRecord<'a>; 2]> {
    let first_len = flags[0].size();
    let second_len = flags[1].size();
    Some([
        ValueRecord::new(record.get(..first_len)?, flags[0]),
        ValueRecord::new(record.get(first_len..first_len + second_len)?, flags[1]),
    ])
}

/// Second glyphs of a pair, sorted by glyph id.
#[derive(Clone, Copy, Debug)]
pub struct PairSet<'a> {
    records: DynArray<'a>,
    flags: [ValueFormatFlags; 2],
}

impl<'a> PairSet<'a> {
    pub fn parse(data: &'a [u8], flags: [ValueFormatFlags; 2]) -> Option<Self> {
        let count = data.read_at::<u16>(0)?;
        let stride = GlyphId::SIZE + flags[0].size() + flags[1].size();
        let records = data.records_at(2, usize::from(count), stride)?;
        Some(Self { records, flags })
    }

    pub fn get(&self, second: GlyphId) -> Option<[ValueRecord<'a>; 2]> {
        let (_, record) = self.records.binary_search_by(|record| {
            record
                .read_at::<GlyphId>(0)
                .map_or(core::cmp::Ordering::Less, |glyph| glyph.cmp(&second))
        })?;

        split_pair(record.get(GlyphId::SIZE..)?, self.flags)
    }
}

/// Pair records of a class pair table, one row per first class.
#[derive(Clone, Copy, Debug)]
pub struct ClassMatrix<'a> {
    records: DynArray<'a>,
    counts: [u16; 2],
    flags: [ValueFormatFlags; 2],
}

impl<'a> ClassMatrix<'a> {
    pub fn parse(
        data: &'a [u8],
        pos: usize,
        counts: [u16; 2],
        flags: [ValueFormatFlags; 2],
    ) -> Option<Self> {
        let count = usize::from(counts[0]) * usize::from(counts[1]);
        let stride = flags[0].size() + flags[1].size();
        let records = data.records_at(pos, count, stride)?;
        Some(Self {
            records,
            counts,
            flags,
        })
    }

    /// Returns `None` when any class is outside of the matrix.
    pub fn get(&self, classes: [u16; 2]) -> Option<[ValueRecord<'a>; 2]> {
        if classes[0] >= self.counts[0] || classes[1] >= self.counts[1] {
            return None;
        }

        let index = usize::from(classes[0]) * usize::from(self.counts[1]) + usize::from(classes[1]);
        split_pair(self.records.get(index)?, self.flags)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CursivePos<'a> {
    data: &'a [u8],
    pub coverage: Coverage<'a>,
    records: LazyArray16<'a, EntryExitRecord>,
}

impl<'a> CursivePos<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.read_at::<u16>(0)? != 1 {
            return None;
        }

        let coverage = Coverage::parse(data.follow16(2)?)?;
        let count = data.read_at::<u16>(4)?;
        let records = data.array_at(6, count)?;
        Some(Self {
            data,
            coverage,
            records,
        })
    }

    /// Returns the entry anchor of the glyph with the coverage index.
    pub fn entry(&self, index: u16) -> Option<Anchor<'a>> {
        anchor_at(self.data, self.records.get(index)?.entry)
    }

    /// Returns the exit anchor of the glyph with the coverage index.
    pub fn exit(&self, index: u16) -> Option<Anchor<'a>> {
        anchor_at(self.data, self.records.get(index)?.exit)
    }
}

#[derive(Clone, Copy, Debug)]
struct EntryExitRecord {
    entry: Offset16,
    exit: Offset16,
}

impl FromData for EntryExitRecord {
    const SIZE: usize = 4;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        Some(Self {
            entry: data.read_at(0)?,
            exit: data.read_at(2)?,
        })
    }
}

/// What a mark attaches to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MarkTarget {
    Base,
    Ligature,
    Mark,
}

/// A mark-to-base, mark-to-ligature or mark-to-mark subtable.
///
/// All three share the same layout and differ only in how target anchors
/// are stored and which glyph is searched for.
#[derive(Clone, Copy, Debug)]
pub struct MarkAttachPos<'a> {
    pub target: MarkTarget,
    pub mark_coverage: Coverage<'a>,
    pub target_coverage: Coverage<'a>,
    pub marks: MarkArray<'a>,
    class_count: u16,
    targets: &'a [u8],
}

impl<'a> MarkAttachPos<'a> {
    pub fn parse(data: &'a [u8], target: MarkTarget) -> Option<Self> {
        if data.read_at::<u16>(0)? != 1 {
            return None;
        }

        Some(Self {
            target,
            mark_coverage: Coverage::parse(data.follow16(2)?)?,
            target_coverage: Coverage::parse(data.follow16(4)?)?,
            class_count: data.read_at::<u16>(6)?,
            marks: MarkArray::parse(data.follow16(8)?)?,
            targets: data.follow16(10)?,
        })
    }

    /// Returns anchors of base or mark glyphs: one row per covered glyph.
    pub fn anchors(&self) -> Option<AnchorMatrix<'a>> {
        AnchorMatrix::parse(self.targets, self.class_count)
    }

    /// Returns anchors of a ligature: one row per component.
    pub fn ligature_anchors(&self, index: u16) -> Option<AnchorMatrix<'a>> {
        let count = self.targets.read_at::<u16>(0)?;
        if index >= count {
            return None;
        }

        let attach = self.targets.follow16(2 + usize::from(index) * Offset16::SIZE)?;
        AnchorMatrix::parse(attach, self.class_count)
    }
}

/// A value record with its format.
#[derive(Clone, Copy, Debug)]
pub struct ValueRecord<'a> {
    pub data: &'a [u8],
    pub flags: ValueFormatFlags,
}

impl<'a> ValueRecord<'a> {
    pub fn new(data: &'a [u8], flags: ValueFormatFlags) -> Self {
        Self { data, flags }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct ValueFormatFlags: u16 {
        const X_PLACEMENT        = 0x0001;
        const Y_PLACEMENT        = 0x0002;
        const X_ADVANCE          = 0x0004;
        const Y_ADVANCE          = 0x0008;
        const X_PLACEMENT_DEVICE = 0x0010;
        const Y_PLACEMENT_DEVICE = 0x0020;
        const X_ADVANCE_DEVICE   = 0x0040;
        const Y_ADVANCE_DEVICE   = 0x0080;
    }
}

impl ValueFormatFlags {
    /// Size of a record in bytes: one 16-bit slot per flag.
    pub fn size(self) -> usize {
        u16::SIZE * usize::num_from(self.bits().count_ones())
    }
}

impl FromData for ValueFormatFlags {
    const SIZE: usize = 2;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        u16::parse(data).map(Self::from_bits_truncate)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Anchor<'a> {
    /// Design units only.
    Format1 { x: i16, y: i16 },
    /// Design units plus a glyph contour point index.
    Format2 { x: i16, y: i16, point: u16 },
    /// Design units plus optional device tables.
    Format3 {
        x: i16,
        y: i16,
        x_device: Option<Device<'a>>,
        y_device: Option<Device<'a>>,
    },
}

impl<'a> Anchor<'a> {
    /// The anchor used in place of a NULL mark anchor.
    pub const ORIGIN: Self = Self::Format1 { x: 0, y: 0 };

    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let format = data.read_at::<u16>(0)?;
        let x = data.read_at::<i16>(2)?;
        let y = data.read_at::<i16>(4)?;
        Some(match format {
            1 => Self::Format1 { x, y },
            2 => Self::Format2 {
                x,
                y,
                point: data.read_at(6)?,
            },
            3 => {
                // Missing or broken devices leave the coordinate unadjusted.
                data.get(..10)?;
                Self::Format3 {
                    x,
                    y,
                    x_device: data.follow16(6).and_then(Device::parse),
                    y_device: data.follow16(8).and_then(Device::parse),
                }
            }
            _ => return None,
        })
    }
}

/// Resolves an anchor offset relative to `data`. NULL means there is no anchor.
fn anchor_at(data: &[u8], offset: Offset16) -> Option<Anchor> {
    let offset = offset.non_null()?;
    Anchor::parse(data.get(offset.to_usize()..)?)
}

/// Anchor offsets with `cols` mark classes per row.
#[derive(Clone, Copy, Debug)]
pub struct AnchorMatrix<'a> {
    data: &'a [u8],
    pub rows: u16,
    cols: u16,
}

impl<'a> AnchorMatrix<'a> {
    pub fn parse(data: &'a [u8], cols: u16) -> Option<Self> {
        let rows = data.read_at::<u16>(0)?;
        let len = usize::from(rows) * usize::from(cols) * Offset16::SIZE;
        data.get(..2 + len)?;
        Some(Self { data, rows, cols })
    }

    /// Returns an anchor at the row and column, or `None` when it is absent.
    pub fn get(&self, row: u16, col: u16) -> Option<Anchor<'a>> {
        if row >= self.rows || col >= self.cols {
            return None;
        }

        let index = usize::from(row) * usize::from(self.cols) + usize::from(col);
        let offset = self.data.read_at::<Offset16>(2 + index * Offset16::SIZE)?;
        anchor_at(self.data, offset)
    }
}

/// Classes and anchors of marks, by coverage index.
#[derive(Clone, Copy, Debug)]
pub struct MarkArray<'a> {
    data: &'a [u8],
    records: LazyArray16<'a, MarkRecord>,
}

impl<'a> MarkArray<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let count = data.read_at::<u16>(0)?;
        let records = data.array_at(2, count)?;
        Some(Self { data, records })
    }

    /// Returns the class and anchor of a mark.
    pub fn get(&self, index: u16) -> Option<(u16, Anchor<'a>)> {
        let record = self.records.get(index)?;
        let anchor = match record.anchor.non_null() {
            Some(_) => anchor_at(self.data, record.anchor)?,
            None => Anchor::ORIGIN,
        };

        Some((record.class, anchor))
    }
}

#[derive(Clone, Copy, Debug)]
struct MarkRecord {
    class: u16,
    anchor: Offset16,
}

impl FromData for MarkRecord {
    const SIZE: usize = 4;

    #[inline]
    fn parse(data: &[u8]) -> Option<Self> {
        Some(Self {
            class: data.read_at(0)?,
            anchor: data.read_at(2)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn push_u16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    // A pair set for the first glyph with `count` second glyphs (2, 4, 6, ...),
    // each carrying an x-advance equal to the negated glyph id.
    fn pair_set(count: u16) -> Vec<u8> {
        let mut data = Vec::new();
        push_u16(&mut data, count);
        for i in 0..count {
            let glyph = (i + 1) * 2;
            push_u16(&mut data, glyph);
            push_u16(&mut data, (-(glyph as i16)) as u16);
        }
        data
    }

    fn x_advance(record: &ValueRecord) -> i16 {
        record.data.read_at::<i16>(0).unwrap()
    }

    impl<'a> PairSet<'a> {
        fn get_linear(&self, second: GlyphId) -> Option<[ValueRecord<'a>; 2]> {
            (0..self.records.len())
                .filter_map(|i| self.records.get(i))
                .find(|record| record.read_at::<GlyphId>(0) == Some(second))
                .and_then(|record| split_pair(record.get(GlyphId::SIZE..)?, self.flags))
        }
    }

    #[test]
    fn pair_set_binary_search_matches_linear_scan() {
        let flags = [ValueFormatFlags::X_ADVANCE, ValueFormatFlags::empty()];
        for count in [0, 1, 2, 3, 50] {
            let data = pair_set(count);
            let set = PairSet::parse(&data, flags).unwrap();

            for second in 0..110u16 {
                let linear = set.get_linear(GlyphId(second)).map(|r| x_advance(&r[0]));
                let binary = set.get(GlyphId(second)).map(|r| x_advance(&r[0]));
                assert_eq!(linear, binary, "{} records, glyph {}", count, second);
            }
        }
    }

    #[test]
    fn empty_pair_set() {
        let flags = [ValueFormatFlags::X_ADVANCE, ValueFormatFlags::empty()];
        let data = pair_set(0);
        let set = PairSet::parse(&data, flags).unwrap();
        assert!(set.get(GlyphId(0)).is_none());
        assert!(set.get(GlyphId(2)).is_none());
    }

    #[test]
    fn class_matrix_bounds() {
        // 2x2 classes with x-advance records 1..=4
        let mut data = Vec::new();
        for v in 1..=4 {
            push_u16(&mut data, v);
        }
        let flags = [ValueFormatFlags::X_ADVANCE, ValueFormatFlags::empty()];
        let matrix = ClassMatrix::parse(&data, 0, [2, 2], flags).unwrap();
        assert_eq!(matrix.get([1, 0]).map(|r| x_advance(&r[0])), Some(3));
        assert_eq!(matrix.get([1, 1]).map(|r| r[1].data.len()), Some(0));
        assert!(matrix.get([2, 0]).is_none());
        assert!(matrix.get([0, 2]).is_none());
        assert!(ClassMatrix::parse(&data, 0, [3, 2], flags).is_none());
    }

    #[test]
    fn value_format_size() {
        let flags = ValueFormatFlags::X_ADVANCE | ValueFormatFlags::X_PLACEMENT_DEVICE;
        assert_eq!(flags.size(), 4);
        assert_eq!(ValueFormatFlags::empty().size(), 0);
    }

    #[test]
    fn anchor_formats() {
        let f1 = [0, 1, 0, 10, 0xFF, 0xF6];
        assert!(matches!(Anchor::parse(&f1), Some(Anchor::Format1 { x: 10, y: -10 })));

        let f2 = [0, 2, 0, 1, 0, 2, 0, 7];
        assert!(matches!(Anchor::parse(&f2), Some(Anchor::Format2 { x: 1, y: 2, point: 7 })));

        let f3 = vec![0, 3, 0, 1, 0, 2, 0, 0, 0, 0];
        assert!(matches!(
            Anchor::parse(&f3),
            Some(Anchor::Format3 { x: 1, y: 2, x_device: None, y_device: None })
        ));

        assert!(Anchor::parse(&[0, 4, 0, 0, 0, 0]).is_none());
        assert!(Anchor::parse(&[0, 2, 0, 1, 0, 2]).is_none());
    }

    #[test]
    fn anchor_matrix_null_cells() {
        // 1 row, 2 classes: [NULL, 6] -> anchor (5, 6)
        let data = [0, 1, 0, 0, 0, 6, 0, 1, 0, 5, 0, 6];
        let matrix = AnchorMatrix::parse(&data, 2).unwrap();
        assert!(matrix.get(0, 0).is_none());
        assert!(matches!(matrix.get(0, 1), Some(Anchor::Format1 { x: 5, y: 6 })));
        assert!(matrix.get(1, 0).is_none());
        assert!(AnchorMatrix::parse(&data[..4], 2).is_none());
    }

    #[test]
    fn null_mark_anchor_is_origin() {
        // 2 marks: class 1 without anchor, class 0 with anchor at 10
        let data = [0, 2, 0, 1, 0, 0, 0, 0, 0, 10, 0, 1, 0, 3, 0, 4];
        let marks = MarkArray::parse(&data).unwrap();
        assert!(matches!(marks.get(0), Some((1, Anchor::Format1 { x: 0, y: 0 }))));
        assert!(matches!(marks.get(1), Some((0, Anchor::Format1 { x: 3, y: 4 }))));
        assert!(marks.get(2).is_none());
    }
}
