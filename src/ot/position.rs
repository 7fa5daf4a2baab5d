//! Single, pair, cursive and mark positioning.

use core_maths::CoreFloat;
use ttf_parser::GlyphId;

use super::apply::{Apply, ApplyContext};
use super::attach::{attach_type, reverse_cursive_chain};
use super::matching::{Match, SkippyIter};
use crate::buffer::{Buffer, BufferScratchFlags, GlyphPosition};
use crate::common::Direction;
use crate::face::Font;
use crate::tables::gpos::*;
use crate::tables::layout::{Device, LookupFlags};
use crate::tables::parser::{Offset, Offset16, Stream};

/// A value record with its slots read.
#[derive(Clone, Copy, Default, Debug)]
struct Values<'a> {
    x_placement: i16,
    y_placement: i16,
    x_advance: i16,
    y_advance: i16,
    x_placement_device: Option<Device<'a>>,
    y_placement_device: Option<Device<'a>>,
    x_advance_device: Option<Device<'a>>,
    y_advance_device: Option<Device<'a>>,
}

impl<'a> Values<'a> {
    /// Reads the slots present in the record, in format order.
    ///
    /// Device offsets are relative to `base`.
    fn read(record: &ValueRecord<'a>, base: &'a [u8]) -> Self {
        let mut s = Stream::new(record.data);
        let mut values = Values::default();
        let flags = record.flags;

        let mut value = |flag: ValueFormatFlags| -> i16 {
            if flags.contains(flag) {
                s.read::<i16>().unwrap_or(0)
            } else {
                0
            }
        };

        values.x_placement = value(ValueFormatFlags::X_PLACEMENT);
        values.y_placement = value(ValueFormatFlags::Y_PLACEMENT);
        values.x_advance = value(ValueFormatFlags::X_ADVANCE);
        values.y_advance = value(ValueFormatFlags::Y_ADVANCE);

        let mut device = |flag: ValueFormatFlags| -> Option<Device<'a>> {
            if !flags.contains(flag) {
                return None;
            }

            let offset = s.read::<Offset16>()?.non_null()?;
            Device::parse(base.get(offset.to_usize()..)?)
        };

        values.x_placement_device = device(ValueFormatFlags::X_PLACEMENT_DEVICE);
        values.y_placement_device = device(ValueFormatFlags::Y_PLACEMENT_DEVICE);
        values.x_advance_device = device(ValueFormatFlags::X_ADVANCE_DEVICE);
        values.y_advance_device = device(ValueFormatFlags::Y_ADVANCE_DEVICE);
        values
    }

    /// Adds the values to a glyph position.
    ///
    /// Returns `true` when the position was changed.
    fn apply_to_pos(&self, font: &Font, direction: Direction, pos: &mut GlyphPosition) -> bool {
        let horizontal = direction.is_horizontal();
        let mut worked = false;

        if self.x_placement != 0 {
            pos.x_offset += font.em_scale_x(self.x_placement);
            worked = true;
        }

        if self.y_placement != 0 {
            pos.y_offset += font.em_scale_y(self.y_placement);
            worked = true;
        }

        if self.x_advance != 0 && horizontal {
            pos.x_advance += font.em_scale_x(self.x_advance);
            worked = true;
        }

        if self.y_advance != 0 && !horizontal {
            // y_advance values grow downward but font-space grows upward, hence negation
            pos.y_advance -= font.em_scale_y(self.y_advance);
            worked = true;
        }

        let (ppem_x, ppem_y) = font.ppem();
        let use_x_device = ppem_x != 0 || font.is_varied();
        let use_y_device = ppem_y != 0 || font.is_varied();

        if use_x_device {
            if let Some(device) = self.x_placement_device {
                pos.x_offset += x_delta(&device, font);
                worked = true;
            }
        }

        if use_y_device {
            if let Some(device) = self.y_placement_device {
                pos.y_offset += y_delta(&device, font);
                worked = true;
            }
        }

        if horizontal && use_x_device {
            if let Some(device) = self.x_advance_device {
                pos.x_advance += x_delta(&device, font);
                worked = true;
            }
        }

        if !horizontal && use_y_device {
            if let Some(device) = self.y_advance_device {
                pos.y_advance -= y_delta(&device, font);
                worked = true;
            }
        }

        worked
    }
}

fn apply_value(ctx: &mut ApplyContext, record: &ValueRecord, base: &[u8], idx: usize) -> bool {
    let values = Values::read(record, base);
    let direction = ctx.buffer.direction;
    let font = ctx.font;
    match ctx.buffer.pos.get_mut(idx) {
        Some(pos) => values.apply_to_pos(font, direction, pos),
        None => false,
    }
}

fn x_delta(device: &Device, font: &Font) -> i32 {
    match device {
        Device::Hinting(hinting) => {
            let ppem = font.ppem().0;
            hinting
                .pixels(ppem)
                .map_or(0, |pixels| scale_pixels(pixels, font.scale().0, ppem))
        }
        Device::Variation(variation) => font
            .face()
            .gdef
            .glyph_variation_delta(
                variation.outer_index,
                variation.inner_index,
                font.normalized_coords(),
            )
            .map_or(0, |delta| font.em_scalef_x(delta)),
    }
}

fn y_delta(device: &Device, font: &Font) -> i32 {
    match device {
        Device::Hinting(hinting) => {
            let ppem = font.ppem().1;
            hinting
                .pixels(ppem)
                .map_or(0, |pixels| scale_pixels(pixels, font.scale().1, ppem))
        }
        Device::Variation(variation) => font
            .face()
            .gdef
            .glyph_variation_delta(
                variation.outer_index,
                variation.inner_index,
                font.normalized_coords(),
            )
            .map_or(0, |delta| font.em_scalef_y(delta)),
    }
}

#[inline]
fn scale_pixels(pixels: i32, scale: i32, ppem: u16) -> i32 {
    if ppem == 0 {
        return 0;
    }

    (i64::from(pixels) * i64::from(scale) / i64::from(ppem)) as i32
}

/// Resolves an anchor of `glyph` into scaled units.
fn anchor_position(anchor: &Anchor, font: &Font, glyph: GlyphId) -> (f32, f32) {
    match *anchor {
        Anchor::Format1 { x, y } => (font.em_fscale_x(x), font.em_fscale_y(y)),
        Anchor::Format2 { x, y, point } => {
            let mut pos = (font.em_fscale_x(x), font.em_fscale_y(y));
            let (ppem_x, ppem_y) = font.ppem();
            if ppem_x != 0 || ppem_y != 0 {
                if let Some((cx, cy)) = font.contour_point(glyph, point) {
                    if ppem_x != 0 {
                        pos.0 = cx as f32;
                    }

                    if ppem_y != 0 {
                        pos.1 = cy as f32;
                    }
                }
            }

            pos
        }
        Anchor::Format3 {
            x,
            y,
            x_device,
            y_device,
        } => {
            let mut pos = (font.em_fscale_x(x), font.em_fscale_y(y));
            let (ppem_x, ppem_y) = font.ppem();

            if let Some(device) = x_device {
                if ppem_x != 0 || font.is_varied() {
                    pos.0 += x_delta(&device, font) as f32;
                }
            }

            if let Some(device) = y_device {
                if ppem_y != 0 || font.is_varied() {
                    pos.1 += y_delta(&device, font) as f32;
                }
            }

            pos
        }
    }
}

impl Apply for SinglePos<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let (base, record) = self.value(glyph)?;
        let idx = ctx.buffer.idx;
        apply_value(ctx, &record, base, idx);
        ctx.buffer.next_glyph();
        Some(())
    }
}

impl Apply for PairPos<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let first_glyph = ctx.buffer.cur(0).as_glyph();
        let first_index = self.coverage.index_of(first_glyph)?;

        let mut iter = SkippyIter::new(ctx, ctx.buffer.idx, false);
        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            ctx.buffer.unsafe_to_concat(ctx.buffer.idx, unsafe_to);
            return None;
        }

        let second = iter.index();
        let second_glyph = ctx.buffer.info[second].as_glyph();

        let Some((base, records)) = self.values(first_glyph, first_index, second_glyph) else {
            ctx.buffer.unsafe_to_concat(ctx.buffer.idx, second + 1);
            return None;
        };

        let first = ctx.buffer.idx;
        let worked1 = apply_value(ctx, &records[0], base, first);
        let worked2 = apply_value(ctx, &records[1], base, second);

        if worked1 || worked2 {
            ctx.buffer.unsafe_to_break(first, second + 1);
        } else {
            ctx.buffer.unsafe_to_concat(first, second + 1);
        }

        // A second glyph with its own value record cannot start another pair.
        ctx.buffer.idx = second;
        if !self.flags[1].is_empty() {
            ctx.buffer.idx += 1;
        }

        Some(())
    }
}

impl Apply for CursivePos<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let this = ctx.buffer.cur(0).as_glyph();
        let index_this = self.coverage.index_of(this)?;
        let entry_this = self.entry(index_this)?;

        let mut iter = SkippyIter::new(ctx, ctx.buffer.idx, false);
        let mut unsafe_from = 0;
        if !iter.prev(Some(&mut unsafe_from)) {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(unsafe_from, ctx.buffer.idx + 1);
            return None;
        }

        let i = iter.index();
        let prev = ctx.buffer.info[i].as_glyph();
        let Some(exit_prev) = self.coverage.index_of(prev).and_then(|index| self.exit(index)) else {
            ctx.buffer
                .unsafe_to_concat_from_outbuffer(i, ctx.buffer.idx + 1);
            return None;
        };

        let j = ctx.buffer.idx;
        let (exit_x, exit_y) = anchor_position(&exit_prev, ctx.font, prev);
        let (entry_x, entry_y) = anchor_position(&entry_this, ctx.font, this);

        ctx.buffer.unsafe_to_break(i, j + 1);

        let direction = ctx.buffer.direction;
        let pos = &mut ctx.buffer.pos;
        match direction {
            Direction::LeftToRight => {
                pos[i].x_advance = round(exit_x) + pos[i].x_offset;
                let d = round(entry_x) + pos[j].x_offset;
                pos[j].x_advance -= d;
                pos[j].x_offset -= d;
            }
            Direction::RightToLeft => {
                let d = round(exit_x) + pos[i].x_offset;
                pos[i].x_advance -= d;
                pos[i].x_offset -= d;
                pos[j].x_advance = round(entry_x) + pos[j].x_offset;
            }
            Direction::TopToBottom => {
                pos[i].y_advance = round(exit_y) + pos[i].y_offset;
                let d = round(entry_y) + pos[j].y_offset;
                pos[j].y_advance -= d;
                pos[j].y_offset -= d;
            }
            Direction::BottomToTop => {
                let d = round(exit_y) + pos[i].y_offset;
                pos[i].y_advance -= d;
                pos[i].y_offset -= d;
                pos[j].y_advance = round(entry_y);
            }
            Direction::Invalid => {}
        }

        // The child is attached to the parent, like in a rooted tree
        // where the root stays on the baseline.
        let mut child = i;
        let mut parent = j;
        let mut x_offset = round(entry_x - exit_x);
        let mut y_offset = round(entry_y - exit_y);

        // Low bits are lookup flags, so we want to truncate.
        if ctx.lookup_props as u16 & LookupFlags::RIGHT_TO_LEFT.bits() == 0 {
            core::mem::swap(&mut child, &mut parent);
            x_offset = -x_offset;
            y_offset = -y_offset;
        }

        let max_depth = ctx.font.limits().max_attachment_depth;
        reverse_cursive_chain(
            pos,
            &mut ctx.attachments,
            child,
            parent,
            direction,
            max_depth,
        );

        let chain = parent as i32 - child as i32;
        ctx.attachments.set(child, attach_type::CURSIVE, chain);
        ctx.buffer.scratch_flags |= BufferScratchFlags::HAS_GPOS_ATTACHMENT;

        let pos = &mut ctx.buffer.pos;
        if direction.is_horizontal() {
            pos[child].y_offset = y_offset;
        } else {
            pos[child].x_offset = x_offset;
        }

        // A parent attached to its child is detached.
        if ctx.attachments.chain(parent) == -chain {
            ctx.attachments.set_chain(parent, 0);
        }

        ctx.buffer.next_glyph();
        Some(())
    }
}

impl Apply for MarkAttachPos<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let mark_glyph = ctx.buffer.cur(0).as_glyph();
        let mark_index = self.mark_coverage.index_of(mark_glyph)?;
        match self.target {
            MarkTarget::Base => apply_mark_to_base(self, ctx, mark_index),
            MarkTarget::Ligature => apply_mark_to_ligature(self, ctx, mark_index),
            MarkTarget::Mark => apply_mark_to_mark(self, ctx, mark_index),
        }
    }
}

fn apply_mark_to_base(t: &MarkAttachPos, ctx: &mut ApplyContext, mark_index: u16) -> Option<()> {
    let anchors = t.anchors()?;
    let idx = ctx.buffer.idx;

    if ctx.last_base_until > idx {
        ctx.last_base_until = 0;
        ctx.last_base = None;
    }

    // Search backwards for a non-mark glyph.
    // A cached result avoids quadratic behavior on long mark runs.
    let mut found = None;
    {
        let mut iter = SkippyIter::new(ctx, idx, false);
        iter.set_lookup_props(u32::from(LookupFlags::IGNORE_MARKS.bits()));

        let mut j = idx;
        while j > ctx.last_base_until {
            let mut matched = iter.match_(&ctx.buffer.info[j - 1]);
            if matched == Match::Match && !accept(ctx.buffer, j - 1) {
                matched = Match::Skip;
            }

            if matched == Match::Match {
                found = Some(j - 1);
                break;
            }

            j -= 1;
        }
    }

    if found.is_some() {
        ctx.last_base = found;
    }
    ctx.last_base_until = idx;

    let Some(base) = ctx.last_base else {
        ctx.buffer.unsafe_to_concat_from_outbuffer(0, idx + 1);
        return None;
    };

    // Checking that the matched glyph is actually a base glyph by GDEF is too strong.
    let base_glyph = ctx.buffer.info[base].as_glyph();
    let Some(base_index) = t.target_coverage.index_of(base_glyph) else {
        ctx.buffer.unsafe_to_concat_from_outbuffer(base, idx + 1);
        return None;
    };

    apply_mark(ctx, &t.marks, anchors, mark_index, base_index, base)
}

/// Only the first glyph of a multiplied sequence accepts marks,
/// unless a mark inside the sequence separates it.
fn accept(buffer: &Buffer, idx: usize) -> bool {
    let info = &buffer.info[idx];
    if !info.is_multiplied() || info.lig_comp() == 0 || idx == 0 {
        return true;
    }

    let prev = &buffer.info[idx - 1];
    prev.is_mark()
        || !prev.is_multiplied()
        || info.lig_id() != prev.lig_id()
        || info.lig_comp() != prev.lig_comp() + 1
}

fn apply_mark_to_ligature(
    t: &MarkAttachPos,
    ctx: &mut ApplyContext,
    mark_index: u16,
) -> Option<()> {
    let idx = ctx.buffer.idx;

    // Search backwards for a non-mark glyph.
    let mut iter = SkippyIter::new(ctx, idx, false);
    iter.set_lookup_props(u32::from(LookupFlags::IGNORE_MARKS.bits()));

    let mut unsafe_from = 0;
    if !iter.prev(Some(&mut unsafe_from)) {
        ctx.buffer.unsafe_to_concat_from_outbuffer(unsafe_from, idx + 1);
        return None;
    }

    let lig = iter.index();
    let lig_glyph = ctx.buffer.info[lig].as_glyph();
    let Some(lig_anchors) = t
        .target_coverage
        .index_of(lig_glyph)
        .and_then(|index| t.ligature_anchors(index))
    else {
        ctx.buffer.unsafe_to_concat_from_outbuffer(lig, idx + 1);
        return None;
    };

    let comp_count = lig_anchors.rows;
    if comp_count == 0 {
        ctx.buffer.unsafe_to_concat_from_outbuffer(lig, idx + 1);
        return None;
    }

    // A mark that belongs to the found ligature uses its own component,
    // otherwise it goes to the last one.
    let lig_id = ctx.buffer.info[lig].lig_id();
    let mark_id = ctx.buffer.info[idx].lig_id();
    let mark_comp = u16::from(ctx.buffer.info[idx].lig_comp());
    let comp_index = if lig_id != 0 && lig_id == mark_id && mark_comp > 0 {
        mark_comp.min(comp_count)
    } else {
        comp_count
    } - 1;

    apply_mark(ctx, &t.marks, lig_anchors, mark_index, comp_index, lig)
}

fn apply_mark_to_mark(t: &MarkAttachPos, ctx: &mut ApplyContext, mark1_index: u16) -> Option<()> {
    let anchors = t.anchors()?;
    let idx = ctx.buffer.idx;

    // Search backwards for a suitable mark glyph until a non-mark glyph.
    let mut iter = SkippyIter::new(ctx, idx, false);
    iter.set_lookup_props(ctx.lookup_props & !u32::from(LookupFlags::IGNORE_FLAGS.bits()));

    let mut unsafe_from = 0;
    if !iter.prev(Some(&mut unsafe_from)) {
        ctx.buffer.unsafe_to_concat_from_outbuffer(unsafe_from, idx + 1);
        return None;
    }

    let j = iter.index();
    if !ctx.buffer.info[j].is_mark() {
        ctx.buffer.unsafe_to_concat_from_outbuffer(j, idx + 1);
        return None;
    }

    let cur = &ctx.buffer.info[idx];
    let prev = &ctx.buffer.info[j];
    let (id1, comp1) = (cur.lig_id(), cur.lig_comp());
    let (id2, comp2) = (prev.lig_id(), prev.lig_comp());

    let matches = if id1 == id2 {
        // Marks belonging to the same base, or to the same ligature component.
        id1 == 0 || comp1 == comp2
    } else {
        // If ligature ids don't match, it may be the case that one of the marks
        // itself is a ligature, in which case match.
        (id1 > 0 && comp1 == 0) || (id2 > 0 && comp2 == 0)
    };

    if !matches {
        ctx.buffer.unsafe_to_concat_from_outbuffer(j, idx + 1);
        return None;
    }

    let mark2_glyph = ctx.buffer.info[j].as_glyph();
    let Some(mark2_index) = t.target_coverage.index_of(mark2_glyph) else {
        ctx.buffer.unsafe_to_concat_from_outbuffer(j, idx + 1);
        return None;
    };

    apply_mark(ctx, &t.marks, anchors, mark1_index, mark2_index, j)
}

/// Attaches the current mark to the glyph at `glyph_pos`.
///
/// Returns `None` when the subtable has no anchor for this pair,
/// so that the following subtables have a chance at it.
fn apply_mark(
    ctx: &mut ApplyContext,
    marks: &MarkArray,
    anchors: AnchorMatrix,
    mark_index: u16,
    glyph_index: u16,
    glyph_pos: usize,
) -> Option<()> {
    let (mark_class, mark_anchor) = marks.get(mark_index)?;
    let base_anchor = anchors.get(glyph_index, mark_class)?;

    let idx = ctx.buffer.idx;
    let mark_glyph = ctx.buffer.info[idx].as_glyph();
    let base_glyph = ctx.buffer.info[glyph_pos].as_glyph();
    let (mark_x, mark_y) = anchor_position(&mark_anchor, ctx.font, mark_glyph);
    let (base_x, base_y) = anchor_position(&base_anchor, ctx.font, base_glyph);

    ctx.buffer.unsafe_to_break(glyph_pos, idx + 1);

    let pos = ctx.buffer.cur_pos_mut();
    pos.x_offset = round(base_x - mark_x);
    pos.y_offset = round(base_y - mark_y);

    ctx.attachments
        .set(idx, attach_type::MARK, glyph_pos as i32 - idx as i32);
    ctx.buffer.scratch_flags |= BufferScratchFlags::HAS_GPOS_ATTACHMENT;
    ctx.buffer.next_glyph();
    Some(())
}

#[inline]
fn round(v: f32) -> i32 {
    v.round() as i32
}
