/*!
`otpos` applies OpenType GPOS lookups to a glyph buffer and `gvar` deltas to glyph outlines.

Substitution, outline decoding and axis normalization are left to the caller:
positioning takes already-substituted glyphs and a resolved lookup list,
while variations consume outlines through [`OutlineSource`].
*/

#![no_std]
#![warn(missing_docs)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod buffer;
mod common;
mod face;
mod ot;
mod set_digest;
mod tables;
mod var;

pub use ttf_parser::GlyphId;

pub use crate::buffer::{
    Buffer, BufferFlags, GlyphFlags, GlyphInfo, GlyphPosition,
};
pub use crate::common::Direction;
pub use crate::face::{ContourPointSource, Face, FaceTables, Font, Limits};
pub use crate::ot::{position, position_all, LookupMap};
pub use crate::tables::gdef::GlyphClass;
pub use crate::var::{
    BoundingBox, Component, ComponentFlags, ComponentPlacement, ContourPoint, GlyphMetrics,
    GlyphPoints, Outline, OutlineKind, OutlineSource, PhantomPoints, Transform, VariationError,
    PHANTOM_POINT_COUNT,
};
