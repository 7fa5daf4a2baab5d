//! Glyph outline variations.
//!
//! Applies `gvar` tuple deltas to flat contour-point arrays, infers deltas of
//! untouched points and resolves composite glyphs.

mod composite;
mod deltas;

use alloc::vec::Vec;
use core::fmt;

use ttf_parser::GlyphId;

pub(crate) use composite::{resolve, Resolver};
pub(crate) use deltas::apply_simple_deltas;

/// Number of phantom points trailing every point array.
pub const PHANTOM_POINT_COUNT: usize = 4;

/// A variation application error.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VariationError {
    /// Variation data is truncated or points outside its bounds.
    ///
    /// Tuples decoded before the malformed one are still applied.
    MalformedData,
    /// The input cannot be varied, like an axis count mismatch,
    /// an out of range component point or too deeply nested composites.
    ///
    /// The glyph is left unvaried.
    UnsupportedConfiguration,
}

impl fmt::Display for VariationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VariationError::MalformedData => write!(f, "malformed variation data"),
            VariationError::UnsupportedConfiguration => {
                write!(f, "unsupported variation configuration")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VariationError {}

/// A contour point in font design units.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct ContourPoint {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl ContourPoint {
    /// Creates a new point.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        ContourPoint { x, y }
    }
}

/// Phantom points in array order.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct PhantomPoints {
    /// The horizontal origin, `x_min - lsb`.
    pub left: ContourPoint,
    /// The horizontal advance point, `left.x + advance`.
    pub right: ContourPoint,
    /// The vertical origin, `y_max + tsb`.
    pub top: ContourPoint,
    /// The vertical advance point, `top.y - advance`.
    pub bottom: ContourPoint,
}

impl PhantomPoints {
    fn to_array(self) -> [ContourPoint; PHANTOM_POINT_COUNT] {
        [self.left, self.right, self.top, self.bottom]
    }

    fn from_slice(points: &[ContourPoint]) -> Option<Self> {
        match *points {
            [left, right, top, bottom] => Some(PhantomPoints {
                left,
                right,
                top,
                bottom,
            }),
            _ => None,
        }
    }
}

/// A 2x2 component transform.
///
/// Maps `(x, y)` to `(xx * x + xy * y, yx * x + yy * y)`.
#[derive(Clone, Copy, PartialEq, Debug)]
#[allow(missing_docs)]
pub struct Transform {
    pub xx: f32,
    pub yx: f32,
    pub xy: f32,
    pub yy: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            xx: 1.0,
            yx: 0.0,
            xy: 0.0,
            yy: 1.0,
        }
    }
}

impl Transform {
    #[inline]
    fn is_identity(&self) -> bool {
        *self == Transform::default()
    }

    #[inline]
    fn apply(&self, p: ContourPoint) -> ContourPoint {
        ContourPoint {
            x: self.xx * p.x + self.xy * p.y,
            y: self.yx * p.x + self.yy * p.y,
        }
    }
}

/// How a component is placed inside its composite.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ComponentPlacement {
    /// Translated by a variable offset.
    #[allow(missing_docs)]
    Offset { x: i16, y: i16 },
    /// Moved so that its `component_point` lands on the composite's `parent_point`.
    #[allow(missing_docs)]
    Anchor {
        parent_point: u16,
        component_point: u16,
    },
}

bitflags::bitflags! {
    /// Component flags relevant to variations.
    #[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
    #[allow(missing_docs)]
    pub struct ComponentFlags: u16 {
        const USE_MY_METRICS = 0x0200;
        const SCALED_COMPONENT_OFFSET = 0x0800;
    }
}

/// A composite glyph component.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Component {
    /// The referenced glyph.
    pub glyph_id: GlyphId,
    /// Applied to the component points before placement.
    pub transform: Transform,
    #[allow(missing_docs)]
    pub placement: ComponentPlacement,
    #[allow(missing_docs)]
    pub flags: ComponentFlags,
}

/// A decoded glyph outline.
#[derive(Clone, PartialEq, Debug)]
pub enum OutlineKind {
    /// Contours of a simple glyph.
    Simple {
        /// Points without phantom points.
        points: Vec<ContourPoint>,
        /// Index of the last point of each contour.
        contour_ends: Vec<u16>,
    },
    /// Components in drawing order.
    Composite(Vec<Component>),
}

/// A decoded glyph outline with its unvaried phantom points.
#[derive(Clone, PartialEq, Debug)]
pub struct Outline {
    pub kind: OutlineKind,
    pub phantom: PhantomPoints,
}

/// A glyph outline decoder.
///
/// Implemented by the caller on top of `glyf` or any other outline storage.
pub trait OutlineSource {
    /// Returns the outline of a glyph or `None` when the glyph doesn't exist.
    fn outline(&self, glyph: GlyphId) -> Option<Outline>;
}

/// Varied glyph points.
#[derive(Clone, PartialEq, Debug)]
pub struct GlyphPoints {
    /// Outline points followed by four phantom points.
    pub points: Vec<ContourPoint>,
    /// Index of the last point of each contour.
    pub contour_ends: Vec<u16>,
}

impl GlyphPoints {
    fn new(mut points: Vec<ContourPoint>, contour_ends: Vec<u16>, phantom: PhantomPoints) -> Self {
        points.extend_from_slice(&phantom.to_array());
        GlyphPoints {
            points,
            contour_ends,
        }
    }

    /// Returns outline points without phantom points.
    pub fn outline_points(&self) -> &[ContourPoint] {
        let len = self.points.len().saturating_sub(PHANTOM_POINT_COUNT);
        &self.points[..len]
    }

    /// Returns the trailing phantom points.
    pub fn phantom_points(&self) -> PhantomPoints {
        let len = self.points.len();
        len.checked_sub(PHANTOM_POINT_COUNT)
            .and_then(|start| PhantomPoints::from_slice(&self.points[start..]))
            .unwrap_or_default()
    }

    /// Computes metrics from the phantom points and the outline bounds.
    pub fn metrics(&self) -> GlyphMetrics {
        let phantom = self.phantom_points();
        let bbox = BoundingBox::from_points(self.outline_points());
        let (lsb, tsb) = match bbox {
            Some(bbox) => (bbox.x_min - phantom.left.x, phantom.top.y - bbox.y_max),
            None => (0.0, 0.0),
        };

        GlyphMetrics {
            h_advance: round(phantom.right.x - phantom.left.x),
            v_advance: round(phantom.top.y - phantom.bottom.y),
            lsb: round(lsb),
            tsb: round(tsb),
            bbox,
        }
    }
}

/// A bounding box in font design units.
#[derive(Clone, Copy, PartialEq, Debug)]
#[allow(missing_docs)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    fn from_points(points: &[ContourPoint]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = BoundingBox {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };

        for p in rest {
            bbox.x_min = bbox.x_min.min(p.x);
            bbox.y_min = bbox.y_min.min(p.y);
            bbox.x_max = bbox.x_max.max(p.x);
            bbox.y_max = bbox.y_max.max(p.y);
        }

        Some(bbox)
    }
}

/// Glyph metrics derived from varied phantom points.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct GlyphMetrics {
    /// Horizontal advance.
    pub h_advance: i32,
    /// Vertical advance.
    pub v_advance: i32,
    /// Left side bearing.
    pub lsb: i32,
    /// Top side bearing.
    pub tsb: i32,
    /// `None` for glyphs without outline points.
    pub bbox: Option<BoundingBox>,
}

#[inline]
fn round(v: f32) -> i32 {
    use core_maths::CoreFloat;
    v.round() as i32
}
