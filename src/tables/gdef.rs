//! A [Glyph Definition Table](https://docs.microsoft.com/en-us/typography/opentype/spec/gdef).

use super::parser::*;
use ttf_parser::GlyphId;

use super::layout::{ClassDef, Coverage};
use super::var_store::ItemVariationStore;

/// A glyph class as defined by the GDEF `glyphClassDef`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GlyphClass {
    Base = 1,
    Ligature = 2,
    Mark = 3,
    Component = 4,
}

#[derive(Clone, Copy, Default, Debug)]
pub struct DefinitionTable<'a> {
    glyph_classes: Option<ClassDef<'a>>,
    mark_attach_classes: Option<ClassDef<'a>>,
    mark_glyph_coverages: Option<MarkGlyphSets<'a>>,
    variation_store: Option<ItemVariationStore<'a>>,
}

impl<'a> DefinitionTable<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let version = data.read_at::<u32>(0)?;
        let header_len = match version {
            0x00010000 => 12,
            0x00010002 => 14,
            0x00010003 => 18,
            _ => return None,
        };
        data.get(..header_len)?;

        let mut table = DefinitionTable {
            glyph_classes: data.follow16(4).and_then(ClassDef::parse),
            mark_attach_classes: data.follow16(10).and_then(ClassDef::parse),
            ..DefinitionTable::default()
        };

        if version >= 0x00010002 {
            table.mark_glyph_coverages = data.follow16(12).and_then(MarkGlyphSets::parse);
        }

        if version >= 0x00010003 {
            let offset = data.read_at::<Offset32>(14)?.non_null();
            if let Some(subdata) = offset.and_then(|offset| data.get(offset.to_usize()..)) {
                table.variation_store = ItemVariationStore::parse(subdata);
                if table.variation_store.is_none() {
                    log::debug!("GDEF item variation store is malformed");
                }
            }
        }

        Some(table)
    }

    #[inline]
    pub fn has_glyph_classes(&self) -> bool {
        self.glyph_classes.is_some()
    }

    pub fn glyph_class(&self, glyph: GlyphId) -> Option<GlyphClass> {
        match self.glyph_classes?.class_of(glyph) {
            1 => Some(GlyphClass::Base),
            2 => Some(GlyphClass::Ligature),
            3 => Some(GlyphClass::Mark),
            4 => Some(GlyphClass::Component),
            _ => None,
        }
    }

    #[inline]
    pub fn glyph_mark_attachment_class(&self, glyph: GlyphId) -> u16 {
        self.mark_attach_classes
            .map(|def| def.class_of(glyph))
            .unwrap_or(0)
    }

    /// Checks that the glyph is a mark of the mark glyph set with the given index.
    ///
    /// Without a set index, checks for any mark glyph set.
    pub fn is_mark_glyph(&self, glyph: GlyphId, set_index: Option<u16>) -> bool {
        let Some(coverages) = self.mark_glyph_coverages else {
            return false;
        };

        match set_index {
            Some(index) => coverages
                .get(index)
                .map_or(false, |coverage| coverage.contains(glyph)),
            None => (0..coverages.len())
                .filter_map(|i| coverages.get(i))
                .any(|coverage| coverage.contains(glyph)),
        }
    }

    #[inline]
    pub fn variation_store(&self) -> Option<&ItemVariationStore<'a>> {
        self.variation_store.as_ref()
    }

    /// Returns the item variation delta for a VariationIndex device.
    #[inline]
    pub fn glyph_variation_delta(
        &self,
        outer_index: u16,
        inner_index: u16,
        coords: &[i16],
    ) -> Option<f32> {
        self.variation_store
            .as_ref()?
            .parse_delta(outer_index, inner_index, coords)
    }
}

/// Mark glyph set coverages, addressed with 32-bit offsets.
#[derive(Clone, Copy, Debug)]
struct MarkGlyphSets<'a> {
    data: &'a [u8],
    offsets: LazyArray16<'a, Offset32>,
}

impl<'a> MarkGlyphSets<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        if data.read_at::<u16>(0)? != 1 {
            return None;
        }

        let count = data.read_at::<u16>(2)?;
        let offsets = data.array_at(4, count)?;
        Some(Self { data, offsets })
    }

    fn len(&self) -> u16 {
        self.offsets.len()
    }

    fn get(&self, index: u16) -> Option<Coverage<'a>> {
        let offset = self.offsets.get(index)?.to_usize();
        Coverage::parse(self.data.get(offset..)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn push_u16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    // GDEF 1.2 with glyph classes (5 -> base, 6 -> mark), a mark attach
    // class (6 -> 2) and one mark glyph set holding glyph 6.
    fn gdef() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0x00010002u32.to_be_bytes());
        push_u16(&mut data, 14); // glyph classes
        push_u16(&mut data, 0);
        push_u16(&mut data, 0);
        push_u16(&mut data, 24); // mark attach classes
        push_u16(&mut data, 32); // mark glyph sets

        // 14: class def format 1, start 5, [1, 3]
        for v in [1, 5, 2, 1, 3] {
            push_u16(&mut data, v);
        }
        // 24: class def format 1, start 6, [2]
        for v in [1, 6, 1, 2] {
            push_u16(&mut data, v);
        }
        // 32: mark glyph sets, format 1, one offset32 to a coverage at +8
        push_u16(&mut data, 1);
        push_u16(&mut data, 1);
        data.extend_from_slice(&8u32.to_be_bytes());
        for v in [1, 1, 6] {
            push_u16(&mut data, v);
        }
        data
    }

    #[test]
    fn classes_and_sets() {
        let data = gdef();
        let table = DefinitionTable::parse(&data).unwrap();
        assert!(table.has_glyph_classes());
        assert_eq!(table.glyph_class(GlyphId(5)), Some(GlyphClass::Base));
        assert_eq!(table.glyph_class(GlyphId(6)), Some(GlyphClass::Mark));
        assert_eq!(table.glyph_class(GlyphId(7)), None);
        assert_eq!(table.glyph_mark_attachment_class(GlyphId(6)), 2);
        assert_eq!(table.glyph_mark_attachment_class(GlyphId(5)), 0);
        assert!(table.is_mark_glyph(GlyphId(6), Some(0)));
        assert!(table.is_mark_glyph(GlyphId(6), None));
        assert!(!table.is_mark_glyph(GlyphId(6), Some(1)));
        assert!(!table.is_mark_glyph(GlyphId(5), Some(0)));
    }

    #[test]
    fn unknown_version() {
        let mut data = gdef();
        data[3] = 9;
        assert!(DefinitionTable::parse(&data).is_none());
    }
}
