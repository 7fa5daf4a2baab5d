use crate::buffer::{Buffer, GlyphInfo, GlyphPropsFlags};
use crate::face::Font;
use crate::tables::gpos::{PosLookup, PosSubtable};
use crate::tables::layout::{LookupFlags, LookupIndex};

use super::attach::Attachments;

/// Apply a lookup.
pub(crate) trait Apply {
    /// Apply the lookup at the current buffer position.
    ///
    /// Returns `None` when nothing was applied, which lets the caller
    /// try the next subtable.
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()>;
}

pub(crate) struct ApplyContext<'a, 'b> {
    pub font: &'a Font<'b>,
    pub buffer: &'a mut Buffer,
    pub attachments: Attachments,
    lookup_mask: u32,
    pub lookup_index: LookupIndex,
    pub lookup_props: u32,
    pub nesting_level_left: usize,
    pub auto_zwj: bool,
    pub per_syllable: bool,
    pub last_base: Option<usize>,
    pub last_base_until: usize,
}

impl<'a, 'b> ApplyContext<'a, 'b> {
    pub fn new(font: &'a Font<'b>, buffer: &'a mut Buffer) -> Self {
        let mut attachments = Attachments::default();
        attachments.reset(buffer.len());
        Self {
            font,
            buffer,
            attachments,
            lookup_mask: 1,
            lookup_index: LookupIndex(u16::MAX),
            lookup_props: 0,
            nesting_level_left: font.limits().max_nesting_level,
            auto_zwj: true,
            per_syllable: false,
            last_base: None,
            last_base_until: 0,
        }
    }

    pub fn set_lookup_mask(&mut self, mask: u32) {
        self.lookup_mask = mask;
        self.last_base = None;
        self.last_base_until = 0;
    }

    #[inline]
    pub fn lookup_mask(&self) -> u32 {
        self.lookup_mask
    }

    /// Applies a nested lookup at the current position.
    pub fn recurse(&mut self, sub_lookup_index: LookupIndex) -> Option<()> {
        if self.nesting_level_left == 0 {
            log::warn!(
                "lookup {} exceeds the nesting limit",
                sub_lookup_index.0
            );
            return None;
        }

        self.buffer.max_ops -= 1;
        if self.buffer.max_ops < 0 {
            log::warn!("operation limit reached in lookup {}", self.lookup_index.0);
            return None;
        }

        let face = self.font.face();
        let lookup = face
            .gpos
            .as_ref()
            .and_then(|table| table.get_lookup(sub_lookup_index))?;

        self.nesting_level_left -= 1;
        let saved_props = self.lookup_props;
        let saved_index = self.lookup_index;

        self.lookup_index = sub_lookup_index;
        self.lookup_props = lookup.props;
        let applied = lookup.apply(self);

        self.lookup_props = saved_props;
        self.lookup_index = saved_index;
        self.nesting_level_left += 1;
        applied
    }

    /// Checks that a glyph is not ignored by the lookup flags.
    pub fn check_glyph_property(&self, info: &GlyphInfo, match_props: u32) -> bool {
        let glyph_props = info.glyph_props();

        // Lookup flags are lower 16-bit of match props.
        let lookup_flags = match_props as u16;

        // E.g. a ligature when the lookup ignores ligatures.
        if glyph_props & lookup_flags & LookupFlags::IGNORE_FLAGS.bits() != 0 {
            return false;
        }

        if glyph_props & GlyphPropsFlags::MARK.bits() != 0 {
            // The high short of match_props has the set index.
            if lookup_flags & LookupFlags::USE_MARK_FILTERING_SET.bits() != 0 {
                let set_index = (match_props >> 16) as u16;
                return self
                    .font
                    .face()
                    .gdef
                    .is_mark_glyph(info.as_glyph(), Some(set_index));
            }

            // Ignore marks of a different attachment type.
            let mark_type = LookupFlags::MARK_ATTACHMENT_TYPE.bits();
            if lookup_flags & mark_type != 0 {
                return (lookup_flags & mark_type) == (glyph_props & mark_type);
            }
        }

        true
    }
}

impl Apply for PosLookup<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        for subtable in &self.subtables {
            if subtable.apply(ctx).is_some() {
                return Some(());
            }
        }

        None
    }
}

impl Apply for PosSubtable<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        match self {
            Self::Single(t) => t.apply(ctx),
            Self::Pair(t) => t.apply(ctx),
            Self::Cursive(t) => t.apply(ctx),
            Self::MarkAttach(t) => t.apply(ctx),
            Self::Context(t) => t.apply(ctx),
        }
    }
}

/// Applies a lookup to every glyph of the buffer, front to back.
pub(crate) fn apply_forward(ctx: &mut ApplyContext, lookup: &PosLookup) -> bool {
    let mut applied = false;
    ctx.buffer.idx = 0;
    while ctx.buffer.idx < ctx.buffer.len() {
        let cur = ctx.buffer.cur(0);
        if cur.mask & ctx.lookup_mask() != 0
            && lookup.digest.may_have_glyph(cur.as_glyph())
            && ctx.check_glyph_property(cur, ctx.lookup_props)
            && lookup.apply(ctx).is_some()
        {
            applied = true;
        } else {
            ctx.buffer.next_glyph();
        }
    }

    applied
}
