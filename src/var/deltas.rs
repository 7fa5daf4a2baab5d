use alloc::vec::Vec;

use core_maths::CoreFloat;
use ttf_parser::GlyphId;

use super::{ContourPoint, VariationError, PHANTOM_POINT_COUNT};
use crate::tables::gvar::{self, PointNumbers};

/// Applies glyph variations to the points of a simple glyph.
///
/// `points` must end with four phantom points. Deltas are accumulated
/// and rounded once all tuples are processed. On malformed data, tuples
/// preceding the malformed one are still applied.
pub(crate) fn apply_simple_deltas(
    table: &gvar::Table,
    glyph: GlyphId,
    coords: &[i16],
    points: &mut [ContourPoint],
    contour_ends: &[u16],
) -> Result<(), VariationError> {
    if points.len() < PHANTOM_POINT_COUNT {
        return Err(VariationError::UnsupportedConfiguration);
    }

    let mut deltas = alloc::vec![ContourPoint::default(); points.len()];
    let result = glyph_deltas(table, glyph, coords, points, Some(contour_ends), &mut deltas);
    if result == Err(VariationError::UnsupportedConfiguration) {
        return result;
    }

    for (point, delta) in points.iter_mut().zip(&deltas) {
        point.x += delta.x.round();
        point.y += delta.y.round();
    }

    result
}

/// Accumulates the scaled deltas of every active tuple into `deltas`.
///
/// Without `contour_ends` no deltas are inferred, which is what
/// composite glyphs need.
pub(crate) fn glyph_deltas(
    table: &gvar::Table,
    glyph: GlyphId,
    coords: &[i16],
    points: &[ContourPoint],
    contour_ends: Option<&[u16]>,
    deltas: &mut [ContourPoint],
) -> Result<(), VariationError> {
    if coords.is_empty() {
        return Ok(());
    }

    let point_count =
        u16::try_from(points.len()).map_err(|_| VariationError::UnsupportedConfiguration)?;
    let Some(tuples) = table.tuples(glyph, coords, point_count)? else {
        return Ok(());
    };

    let outline_len = points.len().saturating_sub(PHANTOM_POINT_COUNT);
    let mut tuple_deltas = Vec::new();
    let mut referenced = Vec::new();
    for tuple in tuples {
        let tuple = match tuple {
            Ok(tuple) => tuple,
            Err(e) => {
                log::debug!("glyph {} has malformed variation data", glyph.0);
                return Err(e);
            }
        };

        let contour_ends = match (&tuple.points, contour_ends) {
            (PointNumbers::Explicit(_), Some(ends)) => ends,
            _ => {
                for (i, dx, dy) in tuple.deltas() {
                    if let Some(delta) = deltas.get_mut(i) {
                        delta.x += dx;
                        delta.y += dy;
                    }
                }
                continue;
            }
        };

        tuple_deltas.clear();
        tuple_deltas.resize(points.len(), ContourPoint::default());
        referenced.clear();
        referenced.resize(points.len(), false);
        for (i, dx, dy) in tuple.deltas() {
            if let Some(delta) = tuple_deltas.get_mut(i) {
                *delta = ContourPoint::new(dx, dy);
                referenced[i] = true;
            }
        }

        infer_deltas(
            &points[..outline_len],
            contour_ends,
            &referenced[..outline_len],
            &mut tuple_deltas[..outline_len],
        );

        for (delta, tuple_delta) in deltas.iter_mut().zip(&tuple_deltas) {
            delta.x += tuple_delta.x;
            delta.y += tuple_delta.y;
        }
    }

    Ok(())
}

/// Infers deltas of unreferenced points from their referenced neighbors.
///
/// Works per contour, wrapping around its end. Interpolation uses the
/// original coordinates. A contour with a single referenced point is
/// shifted by its delta, a contour without one is left alone.
fn infer_deltas(
    points: &[ContourPoint],
    contour_ends: &[u16],
    referenced: &[bool],
    deltas: &mut [ContourPoint],
) {
    let mut start = 0;
    for &end in contour_ends {
        let end = usize::from(end);
        if end < start || end >= points.len() {
            log::debug!("contour end {} is out of bounds", end);
            break;
        }

        let Some(first) = (start..=end).find(|&i| referenced[i]) else {
            start = end + 1;
            continue;
        };

        let mut prev = first;
        loop {
            let mut next = next_in_contour(prev, start, end);
            while !referenced[next] {
                next = next_in_contour(next, start, end);
            }

            let mut i = next_in_contour(prev, start, end);
            while i != next {
                deltas[i] = ContourPoint {
                    x: infer_axis(
                        points[i].x,
                        (points[prev].x, deltas[prev].x),
                        (points[next].x, deltas[next].x),
                    ),
                    y: infer_axis(
                        points[i].y,
                        (points[prev].y, deltas[prev].y),
                        (points[next].y, deltas[next].y),
                    ),
                };
                i = next_in_contour(i, start, end);
            }

            if next == first {
                break;
            }

            prev = next;
        }

        start = end + 1;
    }
}

#[inline]
fn next_in_contour(i: usize, start: usize, end: usize) -> usize {
    if i == end {
        start
    } else {
        i + 1
    }
}

/// Infers a delta on one axis from `(coordinate, delta)` of two references.
///
/// References sharing a coordinate only move the gap when their deltas agree.
fn infer_axis(target: f32, prev: (f32, f32), next: (f32, f32)) -> f32 {
    if prev.0 == next.0 {
        return if prev.1 == next.1 { prev.1 } else { 0.0 };
    }

    let (lo, hi) = if prev.0 < next.0 {
        (prev, next)
    } else {
        (next, prev)
    };

    if target <= lo.0 {
        lo.1
    } else if target >= hi.0 {
        hi.1
    } else {
        lo.1 + (target - lo.0) * (hi.1 - lo.1) / (hi.0 - lo.0)
    }
}
