use alloc::vec::Vec;

use core_maths::CoreFloat;
use ttf_parser::{GlyphId, RawFace, Tag};

use crate::buffer::glyph_props_for_class;
use crate::tables::gdef::DefinitionTable;
use crate::tables::gpos::PosTable;
use crate::tables::gvar;
use crate::tables::parser::Stream;
use crate::var::{self, ContourPoint, GlyphMetrics, GlyphPoints, OutlineSource, VariationError};

const HEAD: Tag = Tag::from_bytes(b"head");
const GDEF: Tag = Tag::from_bytes(b"GDEF");
const GPOS: Tag = Tag::from_bytes(b"GPOS");
const GVAR: Tag = Tag::from_bytes(b"gvar");

/// Raw table data a [`Face`] is built from.
#[derive(Clone, Copy, Default, Debug)]
pub struct FaceTables<'a> {
    /// `unitsPerEm` from the `head` table.
    pub units_per_em: u16,
    /// Glyph definitions.
    pub gdef: Option<&'a [u8]>,
    /// Glyph positioning.
    pub gpos: Option<&'a [u8]>,
    /// Glyph variations.
    pub gvar: Option<&'a [u8]>,
}

/// A font face with parsed positioning and variation tables.
///
/// All lookups are parsed eagerly, so a face can be shared between threads.
#[derive(Clone, Debug)]
pub struct Face<'a> {
    units_per_em: u16,
    pub(crate) gdef: DefinitionTable<'a>,
    pub(crate) gpos: Option<PosTable<'a>>,
    pub(crate) gvar: Option<gvar::Table<'a>>,
}

impl<'a> Face<'a> {
    /// Creates a new `Face` from font data.
    ///
    /// Data will be referenced, not owned.
    pub fn from_slice(data: &'a [u8], face_index: u32) -> Option<Self> {
        let raw = RawFace::parse(data, face_index).ok()?;
        let units_per_em = Stream::read_at::<u16>(raw.table(HEAD)?, 18)?;
        Self::from_tables(FaceTables {
            units_per_em,
            gdef: raw.table(GDEF),
            gpos: raw.table(GPOS),
            gvar: raw.table(GVAR),
        })
    }

    /// Creates a new `Face` from raw tables.
    ///
    /// Returns `None` only for an invalid units per EM value.
    /// A malformed table is treated as missing.
    pub fn from_tables(tables: FaceTables<'a>) -> Option<Self> {
        // Same range as in ttf-parser.
        if !(16..=16384).contains(&tables.units_per_em) {
            return None;
        }

        let gdef = match tables.gdef.map(DefinitionTable::parse) {
            Some(Some(table)) => table,
            Some(None) => {
                log::debug!("GDEF table is malformed");
                DefinitionTable::default()
            }
            None => DefinitionTable::default(),
        };

        let gpos = tables.gpos.and_then(|data| {
            let table = PosTable::parse(data);
            if table.is_none() {
                log::debug!("GPOS table is malformed");
            }
            table
        });

        let gvar = tables.gvar.and_then(|data| {
            let table = gvar::Table::parse(data);
            if table.is_none() {
                log::debug!("gvar table is malformed");
            }
            table
        });

        Some(Face {
            units_per_em: tables.units_per_em,
            gdef,
            gpos,
            gvar,
        })
    }

    /// Returns units per EM.
    #[inline]
    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Returns the number of GPOS lookups.
    pub fn lookup_count(&self) -> u16 {
        self.gpos
            .as_ref()
            .map_or(0, |table| table.lookups.len() as u16)
    }

    /// Returns the variation axis count declared by `gvar`.
    pub fn variation_axis_count(&self) -> u16 {
        self.gvar.as_ref().map_or(0, |table| table.axis_count())
    }

    #[inline]
    pub(crate) fn has_glyph_classes(&self) -> bool {
        self.gdef.has_glyph_classes()
    }

    /// Glyph props derived from GDEF.
    pub(crate) fn glyph_props(&self, glyph: GlyphId) -> u16 {
        let class = self.gdef.glyph_class(glyph);
        let mark_class = self.gdef.glyph_mark_attachment_class(glyph);
        glyph_props_for_class(class, (mark_class & 0xFF) as u8)
    }
}

/// A hinted contour point provider.
///
/// Used by anchors that reference a glyph contour point.
pub trait ContourPointSource {
    /// Returns the hinted position of a glyph point in scaled units.
    fn contour_point(&self, glyph: GlyphId, point_index: u16) -> Option<(i32, i32)>;
}

/// Processing limits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Limits {
    /// Maximum depth of nested contextual lookups.
    pub max_nesting_level: usize,
    /// Maximum number of links followed in a single attachment chain.
    pub max_attachment_depth: usize,
    /// Maximum depth of nested composite glyphs.
    pub max_composite_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_nesting_level: 6,
            max_attachment_depth: 1024,
            max_composite_depth: 64,
        }
    }
}

/// A font instance: a face with a scale, a size and variation coordinates.
#[derive(Clone)]
pub struct Font<'a> {
    face: &'a Face<'a>,
    x_scale: i32,
    y_scale: i32,
    x_mult: i64,
    y_mult: i64,
    pixels_per_em: Option<(u16, u16)>,
    coords: Vec<i16>,
    contour_points: Option<&'a dyn ContourPointSource>,
    limits: Limits,
}

impl core::fmt::Debug for Font<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Font")
            .field("x_scale", &self.x_scale)
            .field("y_scale", &self.y_scale)
            .field("pixels_per_em", &self.pixels_per_em)
            .field("coords", &self.coords)
            .field("limits", &self.limits)
            .finish()
    }
}

impl<'a> Font<'a> {
    /// Creates an unscaled instance, i.e. the scale equals units per EM.
    pub fn new(face: &'a Face<'a>) -> Self {
        let upem = i32::from(face.units_per_em());
        let mut font = Font {
            face,
            x_scale: upem,
            y_scale: upem,
            x_mult: 0,
            y_mult: 0,
            pixels_per_em: None,
            coords: Vec::new(),
            contour_points: None,
            limits: Limits::default(),
        };
        font.set_scale(upem, upem);
        font
    }

    /// Returns the underlying face.
    #[inline]
    pub fn face(&self) -> &'a Face<'a> {
        self.face
    }

    /// Sets the output scale, in units per EM.
    pub fn set_scale(&mut self, x_scale: i32, y_scale: i32) {
        let upem = i64::from(self.face.units_per_em());
        self.x_scale = x_scale;
        self.y_scale = y_scale;
        self.x_mult = (i64::from(x_scale) << 16) / upem;
        self.y_mult = (i64::from(y_scale) << 16) / upem;
    }

    /// Returns the horizontal and vertical scale.
    #[inline]
    pub fn scale(&self) -> (i32, i32) {
        (self.x_scale, self.y_scale)
    }

    /// Sets pixels per EM.
    ///
    /// Enables hinting device tables and contour point anchors.
    ///
    /// `None` by default.
    #[inline]
    pub fn set_pixels_per_em(&mut self, ppem: Option<(u16, u16)>) {
        self.pixels_per_em = ppem;
    }

    /// Returns pixels per EM.
    #[inline]
    pub fn pixels_per_em(&self) -> Option<(u16, u16)> {
        self.pixels_per_em
    }

    /// Sets normalized variation coordinates in F2DOT14.
    ///
    /// Trailing zeros are kept, since the axis count must match the font.
    pub fn set_normalized_coords(&mut self, coords: &[i16]) {
        self.coords.clear();
        self.coords.extend_from_slice(coords);
    }

    /// Returns normalized variation coordinates.
    #[inline]
    pub fn normalized_coords(&self) -> &[i16] {
        &self.coords
    }

    /// Sets the provider of hinted contour points.
    #[inline]
    pub fn set_contour_points(&mut self, source: &'a dyn ContourPointSource) {
        self.contour_points = Some(source);
    }

    /// Sets processing limits.
    #[inline]
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    /// Returns processing limits.
    #[inline]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    #[inline]
    pub(crate) fn ppem(&self) -> (u16, u16) {
        self.pixels_per_em.unwrap_or((0, 0))
    }

    #[inline]
    pub(crate) fn is_varied(&self) -> bool {
        !self.coords.is_empty()
    }

    #[inline]
    pub(crate) fn em_scale_x(&self, v: i16) -> i32 {
        em_mult(v, self.x_mult)
    }

    #[inline]
    pub(crate) fn em_scale_y(&self, v: i16) -> i32 {
        em_mult(v, self.y_mult)
    }

    #[inline]
    pub(crate) fn em_fscale_x(&self, v: i16) -> f32 {
        em_fscale(v, self.x_scale, self.face.units_per_em())
    }

    #[inline]
    pub(crate) fn em_fscale_y(&self, v: i16) -> f32 {
        em_fscale(v, self.y_scale, self.face.units_per_em())
    }

    /// Scales a variation delta along x, rounding to an integer.
    pub(crate) fn em_scalef_x(&self, v: f32) -> i32 {
        (v * self.x_scale as f32 / f32::from(self.face.units_per_em())).round() as i32
    }

    /// Scales a variation delta along y, rounding to an integer.
    pub(crate) fn em_scalef_y(&self, v: f32) -> i32 {
        (v * self.y_scale as f32 / f32::from(self.face.units_per_em())).round() as i32
    }

    pub(crate) fn contour_point(&self, glyph: GlyphId, point_index: u16) -> Option<(i32, i32)> {
        self.contour_points?.contour_point(glyph, point_index)
    }

    /// Returns the varied points of a glyph, resolving composite glyphs.
    ///
    /// Returns `None` when the outline source has no such glyph or composite
    /// glyphs are nested too deep.
    pub fn glyph_points(&self, glyph: GlyphId, source: &dyn OutlineSource) -> Option<GlyphPoints> {
        let resolver = var::Resolver {
            gvar: self.face.gvar.as_ref(),
            coords: &self.coords,
            source,
            max_depth: self.limits.max_composite_depth,
        };
        var::resolve(&resolver, glyph)
    }

    /// Applies glyph variations to the points of a simple glyph in place.
    ///
    /// `points` must end with four phantom points.
    pub fn apply_glyph_variations(
        &self,
        glyph: GlyphId,
        points: &mut [ContourPoint],
        contour_ends: &[u16],
    ) -> Result<(), VariationError> {
        match self.face.gvar {
            Some(ref table) => {
                var::apply_simple_deltas(table, glyph, &self.coords, points, contour_ends)
            }
            None => Ok(()),
        }
    }

    /// Returns metrics of a varied glyph.
    pub fn glyph_metrics(
        &self,
        glyph: GlyphId,
        source: &dyn OutlineSource,
    ) -> Option<GlyphMetrics> {
        self.glyph_points(glyph, source).map(|points| points.metrics())
    }
}

#[inline]
fn em_mult(v: i16, mult: i64) -> i32 {
    ((i64::from(v) * mult + 0x8000) >> 16) as i32
}

#[inline]
fn em_fscale(v: i16, scale: i32, upem: u16) -> f32 {
    f32::from(v) * scale as f32 / f32::from(upem)
}
