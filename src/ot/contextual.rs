use ttf_parser::GlyphId;

use super::apply::{Apply, ApplyContext};
use super::matching::{
    match_backtrack, match_class, match_glyph, match_input, match_lookahead, MatchFn,
};
use crate::tables::layout::{
    Coverage, LookupRecord, RuleSet, SequenceContext, SequenceRule, SequenceRules,
};
use crate::tables::parser::{LazyArray16, Offset, Offset16};

impl Apply for SequenceContext<'_> {
    fn apply(&self, ctx: &mut ApplyContext) -> Option<()> {
        let glyph = ctx.buffer.cur(0).as_glyph();
        let index = self.coverage.index_of(glyph)?;
        match self.rules {
            SequenceRules::Glyphs(_) => {
                let set = self.rule_set(index)?;
                let match_glyph: &MatchFn = &match_glyph;
                apply_rule_set(ctx, self.chained, set, [match_glyph; 3])
            }
            SequenceRules::Classes { classes, .. } => {
                let set = self.rule_set(classes[1].class_of(glyph))?;
                let [back, input, ahead] = classes.map(match_class);
                apply_rule_set(ctx, self.chained, set, [&back, &input, &ahead])
            }
            SequenceRules::Coverages {
                data,
                coverages,
                lookups,
            } => {
                let [back, input, ahead] =
                    coverages.map(|offsets| move |glyph, index| covers(data, offsets, index, glyph));
                let lens = coverages.map(|offsets| offsets.len());
                apply_sequence(ctx, self.chained, lens, [&back, &input, &ahead], lookups)
            }
        }
    }
}

/// Checks a glyph against the coverage table at `offsets[index]`.
fn covers(data: &[u8], offsets: LazyArray16<Offset16>, index: u16, glyph: GlyphId) -> bool {
    offsets
        .get(index)
        .and_then(|offset| offset.non_null())
        .and_then(|offset| data.get(offset.to_usize()..))
        .and_then(Coverage::parse)
        .map_or(false, |coverage| coverage.contains(glyph))
}

fn apply_rule_set(
    ctx: &mut ApplyContext,
    chained: bool,
    set: RuleSet,
    match_funcs: [&MatchFn; 3],
) -> Option<()> {
    for rule in set.rules() {
        if apply_rule(ctx, chained, &rule, match_funcs).is_some() {
            return Some(());
        }
    }

    None
}

fn apply_rule(
    ctx: &mut ApplyContext,
    chained: bool,
    rule: &SequenceRule,
    match_funcs: [&MatchFn; 3],
) -> Option<()> {
    let [back, input, ahead] = rule.sequences;
    let back_fn = |glyph, index| back.get(index).map_or(false, |v| match_funcs[0](glyph, v));
    let input_fn = |glyph, index| input.get(index).map_or(false, |v| match_funcs[1](glyph, v));
    let ahead_fn = |glyph, index| ahead.get(index).map_or(false, |v| match_funcs[2](glyph, v));

    apply_sequence(
        ctx,
        chained,
        rule.sequences.map(|sequence| sequence.len()),
        [&back_fn, &input_fn, &ahead_fn],
        rule.lookups,
    )
}

/// Matches a rule made of backtrack, input and lookahead sequences.
fn apply_sequence(
    ctx: &mut ApplyContext,
    chained: bool,
    lens: [u16; 3],
    match_funcs: [&MatchFn; 3],
    lookups: LazyArray16<LookupRecord>,
) -> Option<()> {
    if chained {
        apply_chain_context(ctx, lens, match_funcs, lookups)
    } else {
        apply_context(ctx, lens[1], match_funcs[1], lookups)
    }
}

fn apply_context(
    ctx: &mut ApplyContext,
    input_len: u16,
    match_func: &MatchFn,
    lookups: LazyArray16<LookupRecord>,
) -> Option<()> {
    match match_input(ctx, input_len, match_func) {
        Ok(matched) => {
            ctx.buffer.unsafe_to_break(ctx.buffer.idx, matched.end);
            apply_lookup(ctx, &matched.positions, matched.end, lookups);
            Some(())
        }
        Err(end) => {
            ctx.buffer.unsafe_to_concat(ctx.buffer.idx, end);
            None
        }
    }
}

/// Matches the input, the lookahead and then the backtrack sequences.
///
/// `lens` and `match_funcs` are in backtrack, input, lookahead order.
fn apply_chain_context(
    ctx: &mut ApplyContext,
    lens: [u16; 3],
    match_funcs: [&MatchFn; 3],
    lookups: LazyArray16<LookupRecord>,
) -> Option<()> {
    let [backtrack_len, input_len, lookahead_len] = lens;
    let [back, input, ahead] = match_funcs;

    let matched = match match_input(ctx, input_len, input) {
        Ok(matched) => matched,
        Err(end) => {
            ctx.buffer.unsafe_to_concat(ctx.buffer.idx, end);
            return None;
        }
    };

    let end_index = match match_lookahead(ctx, lookahead_len, ahead, matched.end) {
        Ok(end) => end,
        Err(end) => {
            ctx.buffer.unsafe_to_concat(ctx.buffer.idx, end);
            return None;
        }
    };

    let start_index = match match_backtrack(ctx, backtrack_len, back) {
        Ok(start) => start,
        Err(start) => {
            ctx.buffer.unsafe_to_concat_from_outbuffer(start, end_index);
            return None;
        }
    };

    ctx.buffer
        .unsafe_to_break_from_outbuffer(start_index, end_index);
    apply_lookup(ctx, &matched.positions, matched.end, lookups);
    Some(())
}

/// Applies nested lookups at the matched positions.
///
/// Positioning never changes the buffer length, so positions stay valid.
fn apply_lookup(
    ctx: &mut ApplyContext,
    positions: &[usize],
    match_end: usize,
    lookups: LazyArray16<LookupRecord>,
) {
    for record in lookups {
        let Some(&position) = positions.get(usize::from(record.sequence_index)) else {
            continue;
        };

        if !ctx.buffer.move_to(position) {
            break;
        }

        if ctx.buffer.max_ops <= 0 {
            log::warn!("operation limit reached in lookup {}", ctx.lookup_index.0);
            break;
        }

        ctx.recurse(record.lookup_index);
    }

    ctx.buffer.move_to(match_end);
}
