//! Matching of glyph patterns.

use ttf_parser::GlyphId;

use super::apply::ApplyContext;
use crate::buffer::GlyphInfo;
use crate::tables::layout::ClassDef;

/// The maximum number of glyphs in a matched input sequence.
pub const MAX_CONTEXT_LENGTH: usize = 64;

/// A glyph matcher. The second argument is the index of the glyph
/// in the matched sequence.
pub(crate) type MatchFn<'a> = dyn Fn(GlyphId, u16) -> bool + 'a;

/// Value represents glyph id.
pub(crate) fn match_glyph(glyph: GlyphId, value: u16) -> bool {
    glyph == GlyphId(value)
}

/// Value represents glyph class.
pub(crate) fn match_class<'a>(class_def: ClassDef<'a>) -> impl Fn(GlyphId, u16) -> bool + 'a {
    move |glyph, value| class_def.class_of(glyph) == value
}

/// A successfully matched input sequence.
pub(crate) struct MatchedInput {
    /// Buffer positions of the sequence glyphs, the first one included.
    pub positions: smallvec::SmallVec<[usize; 4]>,
    /// The position right after the last matched glyph.
    pub end: usize,
}

/// Matches `input_len` glyphs after the current one.
///
/// On failure returns the position up to which the result depends on the
/// buffer content.
pub(crate) fn match_input(
    ctx: &ApplyContext,
    input_len: u16,
    match_func: &MatchFn,
) -> Result<MatchedInput, usize> {
    #[derive(PartialEq)]
    enum Ligbase {
        NotChecked,
        MayNotSkip,
        MaySkip,
    }

    let count = usize::from(input_len) + 1;
    if count > MAX_CONTEXT_LENGTH {
        return Err(ctx.buffer.idx);
    }

    let mut positions = smallvec::SmallVec::from_elem(0, count);
    let mut iter = SkippyIter::new(ctx, ctx.buffer.idx, false);
    iter.enable_matching(match_func);

    let first = ctx.buffer.cur(0);
    let first_lig_id = first.lig_id();
    let first_lig_comp = first.lig_comp();
    let mut ligbase = Ligbase::NotChecked;

    for position in &mut positions[1..] {
        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            return Err(unsafe_to);
        }

        *position = iter.index();

        let this = &ctx.buffer.info[iter.index()];
        let this_lig_id = this.lig_id();
        let this_lig_comp = this.lig_comp();

        if first_lig_id != 0 && first_lig_comp != 0 {
            // When the first glyph is attached to a ligature component,
            // the rest must be attached to the same component...
            if first_lig_id != this_lig_id || first_lig_comp != this_lig_comp {
                // ...unless that ligature is skipped by the lookup.
                if ligbase == Ligbase::NotChecked {
                    let infos = &ctx.buffer.info[..ctx.buffer.idx];
                    let mut j = infos.len();
                    let mut found = false;
                    while j > 0 && infos[j - 1].lig_id() == first_lig_id {
                        j -= 1;
                        if infos[j].lig_comp() == 0 {
                            found = true;
                            break;
                        }
                    }

                    ligbase = if found && iter.may_skip(&infos[j]) == MaySkip::Yes {
                        Ligbase::MaySkip
                    } else {
                        Ligbase::MayNotSkip
                    };
                }

                if ligbase == Ligbase::MayNotSkip {
                    return Err(ctx.buffer.idx);
                }
            }
        } else if this_lig_id != 0 && this_lig_comp != 0 && this_lig_id != first_lig_id {
            // Otherwise, nothing may be attached to a foreign ligature component.
            return Err(ctx.buffer.idx);
        }
    }

    let end = iter.index() + 1;
    positions[0] = ctx.buffer.idx;
    Ok(MatchedInput { positions, end })
}

/// Matches `backtrack_len` glyphs before the current one.
///
/// Returns the position of the earliest matched glyph or,
/// on failure, the position from which the result depends on the buffer.
pub(crate) fn match_backtrack(
    ctx: &ApplyContext,
    backtrack_len: u16,
    match_func: &MatchFn,
) -> Result<usize, usize> {
    let mut iter = SkippyIter::new(ctx, ctx.buffer.idx, true);
    iter.enable_matching(match_func);

    for _ in 0..backtrack_len {
        let mut unsafe_from = 0;
        if !iter.prev(Some(&mut unsafe_from)) {
            return Err(unsafe_from);
        }
    }

    Ok(iter.index())
}

/// Matches `lookahead_len` glyphs starting at `start_index`.
///
/// Returns the position after the last matched glyph or,
/// on failure, the position up to which the result depends on the buffer.
pub(crate) fn match_lookahead(
    ctx: &ApplyContext,
    lookahead_len: u16,
    match_func: &MatchFn,
    start_index: usize,
) -> Result<usize, usize> {
    let mut iter = SkippyIter::new(ctx, start_index - 1, true);
    iter.enable_matching(match_func);

    for _ in 0..lookahead_len {
        let mut unsafe_to = 0;
        if !iter.next(Some(&mut unsafe_to)) {
            return Err(unsafe_to);
        }
    }

    Ok(iter.index() + 1)
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub(crate) enum Match {
    Match,
    NotMatch,
    Skip,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum MayMatch {
    No,
    Yes,
    Maybe,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum MaySkip {
    No,
    Yes,
    Maybe,
}

/// Walks the buffer skipping the glyphs ignored by the current lookup.
///
/// Created on demand from a shared borrow of the apply context.
pub(crate) struct SkippyIter<'a, 'b> {
    ctx: &'a ApplyContext<'a, 'b>,
    lookup_props: u32,
    ignore_zwj: bool,
    mask: u32,
    syllable: u8,
    matching: Option<&'a MatchFn<'a>>,
    glyph_data: u16,
    buf_len: usize,
    buf_idx: usize,
}

impl<'a, 'b> SkippyIter<'a, 'b> {
    pub fn new(ctx: &'a ApplyContext<'a, 'b>, start_buf_index: usize, context_match: bool) -> Self {
        SkippyIter {
            ctx,
            lookup_props: ctx.lookup_props,
            // ZWNJ and hidden glyphs are always ignored while positioning.
            ignore_zwj: context_match || ctx.auto_zwj,
            mask: if context_match {
                u32::MAX
            } else {
                ctx.lookup_mask()
            },
            syllable: if ctx.buffer.idx == start_buf_index && ctx.per_syllable {
                ctx.buffer.cur(0).syllable()
            } else {
                0
            },
            matching: None,
            glyph_data: 0,
            buf_len: ctx.buffer.len(),
            buf_idx: start_buf_index,
        }
    }

    pub fn set_lookup_props(&mut self, lookup_props: u32) {
        self.lookup_props = lookup_props;
    }

    pub fn enable_matching(&mut self, func: &'a MatchFn<'a>) {
        self.matching = Some(func);
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.buf_idx
    }

    pub fn next(&mut self, unsafe_to: Option<&mut usize>) -> bool {
        while self.buf_idx + 1 < self.buf_len {
            self.buf_idx += 1;
            let info = &self.ctx.buffer.info[self.buf_idx];

            match self.match_(info) {
                Match::Match => {
                    self.glyph_data += 1;
                    return true;
                }
                Match::NotMatch => {
                    if let Some(unsafe_to) = unsafe_to {
                        *unsafe_to = self.buf_idx + 1;
                    }

                    return false;
                }
                Match::Skip => continue,
            }
        }

        if let Some(unsafe_to) = unsafe_to {
            *unsafe_to = self.buf_idx + 1;
        }

        false
    }

    pub fn prev(&mut self, unsafe_from: Option<&mut usize>) -> bool {
        while self.buf_idx > 0 {
            self.buf_idx -= 1;
            let info = &self.ctx.buffer.info[self.buf_idx];

            match self.match_(info) {
                Match::Match => {
                    self.glyph_data += 1;
                    return true;
                }
                Match::NotMatch => {
                    if let Some(unsafe_from) = unsafe_from {
                        *unsafe_from = self.buf_idx.max(1) - 1;
                    }

                    return false;
                }
                Match::Skip => continue,
            }
        }

        if let Some(unsafe_from) = unsafe_from {
            *unsafe_from = 0;
        }

        false
    }

    pub fn match_(&self, info: &GlyphInfo) -> Match {
        let skip = self.may_skip(info);
        if skip == MaySkip::Yes {
            return Match::Skip;
        }

        let matched = self.may_match(info);
        if matched == MayMatch::Yes || (matched == MayMatch::Maybe && skip == MaySkip::No) {
            return Match::Match;
        }

        if skip == MaySkip::No {
            return Match::NotMatch;
        }

        Match::Skip
    }

    fn may_match(&self, info: &GlyphInfo) -> MayMatch {
        if info.mask & self.mask == 0 || (self.syllable != 0 && self.syllable != info.syllable()) {
            return MayMatch::No;
        }

        match self.matching {
            Some(match_func) if match_func(info.as_glyph(), self.glyph_data) => MayMatch::Yes,
            Some(_) => MayMatch::No,
            None => MayMatch::Maybe,
        }
    }

    fn may_skip(&self, info: &GlyphInfo) -> MaySkip {
        if !self.ctx.check_glyph_property(info, self.lookup_props) {
            return MaySkip::Yes;
        }

        if info.is_default_ignorable() && (self.ignore_zwj || !info.is_zwj()) {
            return MaySkip::Maybe;
        }

        MaySkip::No
    }
}
