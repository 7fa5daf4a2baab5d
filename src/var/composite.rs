use alloc::vec::Vec;

use core_maths::CoreFloat;
use ttf_parser::GlyphId;

use super::deltas::{apply_simple_deltas, glyph_deltas};
use super::*;
use crate::tables::gvar;

/// Resolves glyph outlines into varied flat point arrays.
pub(crate) struct Resolver<'a, 'b> {
    pub gvar: Option<&'b gvar::Table<'a>>,
    pub coords: &'b [i16],
    pub source: &'b dyn OutlineSource,
    pub max_depth: usize,
}

/// Resolves a glyph, recursing into composite components.
///
/// Returns `None` when a glyph is missing or composites are nested deeper
/// than `max_depth`.
pub(crate) fn resolve(resolver: &Resolver, glyph: GlyphId) -> Option<GlyphPoints> {
    resolver.resolve_at(glyph, 0)
}

impl Resolver<'_, '_> {
    fn resolve_at(&self, glyph: GlyphId, depth: usize) -> Option<GlyphPoints> {
        if depth > self.max_depth {
            log::debug!("glyph {} exceeds the composite depth limit", glyph.0);
            return None;
        }

        let outline = self.source.outline(glyph)?;
        match outline.kind {
            OutlineKind::Simple {
                points,
                contour_ends,
            } => {
                let mut glyph_points = GlyphPoints::new(points, contour_ends, outline.phantom);
                if let Some(table) = self.gvar {
                    let result = apply_simple_deltas(
                        table,
                        glyph,
                        self.coords,
                        &mut glyph_points.points,
                        &glyph_points.contour_ends,
                    );

                    if let Err(e) = result {
                        log::debug!("glyph {}: {}", glyph.0, e);
                    }
                }

                Some(glyph_points)
            }
            OutlineKind::Composite(components) => {
                self.resolve_composite(glyph, &components, outline.phantom, depth)
            }
        }
    }

    fn resolve_composite(
        &self,
        glyph: GlyphId,
        components: &[Component],
        phantom: PhantomPoints,
        depth: usize,
    ) -> Option<GlyphPoints> {
        let deltas = self.component_deltas(glyph, components, phantom);
        let phantom_deltas = deltas.get(components.len()..).unwrap_or_default();
        let mut phantom = match PhantomPoints::from_slice(phantom_deltas) {
            Some(d) => PhantomPoints {
                left: translate(phantom.left, d.left),
                right: translate(phantom.right, d.right),
                top: translate(phantom.top, d.top),
                bottom: translate(phantom.bottom, d.bottom),
            },
            None => phantom,
        };

        let mut points: Vec<ContourPoint> = Vec::new();
        let mut contour_ends = Vec::new();
        for (i, component) in components.iter().enumerate() {
            let sub = self.resolve_at(component.glyph_id, depth + 1)?;
            if component.flags.contains(ComponentFlags::USE_MY_METRICS) {
                phantom = sub.phantom_points();
            }

            let mut component_points = sub.outline_points().to_vec();
            let transform = component.transform;
            let delta = deltas.get(i).copied().unwrap_or_default();
            match component.placement {
                ComponentPlacement::Offset { x, y } => {
                    let offset = ContourPoint::new(f32::from(x) + delta.x, f32::from(y) + delta.y);
                    let scaled = component
                        .flags
                        .contains(ComponentFlags::SCALED_COMPONENT_OFFSET);
                    for p in &mut component_points {
                        *p = if scaled {
                            transform.apply(translate(*p, offset))
                        } else {
                            translate(transform.apply(*p), offset)
                        };
                    }
                }
                ComponentPlacement::Anchor {
                    parent_point,
                    component_point,
                } => {
                    if !transform.is_identity() {
                        for p in &mut component_points {
                            *p = transform.apply(*p);
                        }
                    }

                    let parent = points.get(usize::from(parent_point)).copied();
                    let child = component_points.get(usize::from(component_point)).copied();
                    if let (Some(parent), Some(child)) = (parent, child) {
                        let offset = ContourPoint::new(parent.x - child.x, parent.y - child.y);
                        for p in &mut component_points {
                            *p = translate(*p, offset);
                        }
                    } else {
                        log::debug!(
                            "glyph {}: anchor points {}/{} are out of range",
                            glyph.0,
                            parent_point,
                            component_point
                        );
                    }
                }
            }

            let base = u16::try_from(points.len()).ok()?;
            for end in &sub.contour_ends {
                contour_ends.push(end.checked_add(base)?);
            }

            points.extend_from_slice(&component_points);
        }

        Some(GlyphPoints::new(points, contour_ends, phantom))
    }

    /// Returns rounded deltas for each component followed by four phantom deltas.
    fn component_deltas(
        &self,
        glyph: GlyphId,
        components: &[Component],
        phantom: PhantomPoints,
    ) -> Vec<ContourPoint> {
        let Some(table) = self.gvar else {
            return Vec::new();
        };

        // Component offsets act as points. Their values only matter for the count.
        let mut pseudo_points: Vec<ContourPoint> = components
            .iter()
            .map(|c| match c.placement {
                ComponentPlacement::Offset { x, y } => ContourPoint::new(f32::from(x), f32::from(y)),
                ComponentPlacement::Anchor { .. } => ContourPoint::default(),
            })
            .collect();
        pseudo_points.extend_from_slice(&phantom.to_array());

        let mut deltas = alloc::vec![ContourPoint::default(); pseudo_points.len()];
        match glyph_deltas(table, glyph, self.coords, &pseudo_points, None, &mut deltas) {
            Ok(()) => {}
            Err(VariationError::UnsupportedConfiguration) => {
                log::debug!("glyph {}: {}", glyph.0, VariationError::UnsupportedConfiguration);
                return Vec::new();
            }
            Err(e) => log::debug!("glyph {}: {}", glyph.0, e),
        }

        for d in &mut deltas {
            d.x = d.x.round();
            d.y = d.y.round();
        }

        deltas
    }
}

#[inline]
fn translate(p: ContourPoint, offset: ContourPoint) -> ContourPoint {
    ContourPoint::new(p.x + offset.x, p.y + offset.y)
}
