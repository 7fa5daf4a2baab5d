//! GPOS lookup application.

mod apply;
mod attach;
mod contextual;
mod matching;
mod position;

use alloc::vec::Vec;

use crate::buffer::{Buffer, BufferScratchFlags, GlyphPropsFlags};
use crate::face::Font;
use crate::set_digest::SetDigest;
use crate::tables::layout::LookupIndex;

use self::apply::{apply_forward, ApplyContext};
use self::attach::propagate_offsets;

/// A lookup to apply, with the glyphs it is enabled for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LookupMap {
    /// Index of the lookup in the GPOS lookup list.
    pub index: u16,
    /// Glyphs whose mask doesn't intersect this one are not positioned.
    pub mask: u32,
    /// Whether ZWJ is skipped while matching.
    pub auto_zwj: bool,
    /// Whether matching is restricted to the syllable of the current glyph.
    pub per_syllable: bool,
}

impl LookupMap {
    /// Creates a map enabled for all glyphs.
    pub fn new(index: u16) -> Self {
        LookupMap {
            index,
            mask: u32::MAX,
            auto_zwj: true,
            per_syllable: false,
        }
    }
}

/// Applies GPOS lookups to the buffer, in the given order.
///
/// Lookups missing from the font are skipped.
pub fn position(font: &Font, lookups: &[LookupMap], buffer: &mut Buffer) {
    buffer.reset_max_ops();
    buffer.scratch_flags = BufferScratchFlags::empty();
    position_start(font, buffer);

    let direction = buffer.direction;
    let max_depth = font.limits().max_attachment_depth;
    let mut ctx = ApplyContext::new(font, buffer);

    if let Some(gpos) = font.face().gpos.as_ref() {
        let digest = buffer_digest(ctx.buffer);
        for map in lookups {
            let Some(lookup) = gpos.get_lookup(LookupIndex(map.index)) else {
                continue;
            };

            if ctx.buffer.is_empty() || map.mask == 0 || !lookup.digest.may_have(&digest) {
                continue;
            }

            ctx.lookup_index = LookupIndex(map.index);
            ctx.set_lookup_mask(map.mask);
            ctx.auto_zwj = map.auto_zwj;
            ctx.per_syllable = map.per_syllable;
            ctx.lookup_props = lookup.props;

            if apply_forward(&mut ctx, lookup) {
                log::trace!("applied lookup {}", map.index);
            }
        }
    }

    // Position finish offsets.
    if ctx
        .buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_GPOS_ATTACHMENT)
    {
        propagate_offsets(&mut ctx.buffer.pos, &mut ctx.attachments, direction, max_depth);
    }
}

/// Applies every GPOS lookup of the font, in lookup list order.
pub fn position_all(font: &Font, buffer: &mut Buffer) {
    let lookups: Vec<LookupMap> = (0..font.face().lookup_count())
        .map(LookupMap::new)
        .collect();
    position(font, &lookups, buffer);
}

/// Sets glyph classes from GDEF, keeping the substitution bits.
fn position_start(font: &Font, buffer: &mut Buffer) {
    let face = font.face();
    if !face.has_glyph_classes() {
        return;
    }

    for info in &mut buffer.info {
        let preserved = info.glyph_props() & GlyphPropsFlags::PRESERVE.bits();
        info.set_glyph_props(preserved | face.glyph_props(info.as_glyph()));
    }
}

fn buffer_digest(buffer: &Buffer) -> SetDigest {
    let mut digest = SetDigest::new();
    digest.add_array(buffer.info.iter().map(|info| info.as_glyph()));
    digest
}
