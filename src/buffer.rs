use alloc::vec::Vec;

use ttf_parser::GlyphId;

use crate::common::Direction;
use crate::tables::gdef::GlyphClass;

const MAX_OPS_FACTOR: i32 = 64;
const MAX_OPS_MIN: i32 = 16384;

/// Holds the positions of the glyph in both horizontal and vertical directions.
///
/// All positions are relative to the current point.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct GlyphPosition {
    /// How much the line advances after drawing this glyph when setting text in
    /// horizontal direction.
    pub x_advance: i32,
    /// How much the line advances after drawing this glyph when setting text in
    /// vertical direction.
    pub y_advance: i32,
    /// How much the glyph moves on the X-axis before drawing it, this should not
    /// affect how much the line advances.
    pub x_offset: i32,
    /// How much the glyph moves on the Y-axis before drawing it, this should
    /// not affect how much the line advances.
    pub y_offset: i32,
}

unsafe impl bytemuck::Zeroable for GlyphPosition {}
unsafe impl bytemuck::Pod for GlyphPosition {}

impl GlyphPosition {
    /// Creates a position with the given advances and no offsets.
    pub fn with_advance(x_advance: i32, y_advance: i32) -> Self {
        GlyphPosition {
            x_advance,
            y_advance,
            ..GlyphPosition::default()
        }
    }
}

/// A glyph info.
///
/// Carries the glyph id and the per-glyph state produced by the substitution stage.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct GlyphInfo {
    /// A glyph id.
    pub glyph_id: u32,
    /// A lookup mask. Lookups apply only to glyphs whose mask intersects theirs.
    pub mask: u32,
    /// An index to the start of the grapheme cluster in the original string.
    pub cluster: u32,
    // glyph props, aux flags
    pub(crate) var1: u32,
    // lig props, syllable, glyph flags, unused
    pub(crate) var2: u32,
}

unsafe impl bytemuck::Zeroable for GlyphInfo {}
unsafe impl bytemuck::Pod for GlyphInfo {}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct GlyphPropsFlags: u16 {
        // The following three match LookupFlags::Ignore* numbers.
        const BASE_GLYPH    = 0x02;
        const LIGATURE      = 0x04;
        const MARK          = 0x08;
        const CLASS_MASK    = Self::BASE_GLYPH.bits() | Self::LIGATURE.bits() | Self::MARK.bits();

        // The following are used internally; not derived from GDEF.
        const SUBSTITUTED   = 0x10;
        const LIGATED       = 0x20;
        const MULTIPLIED    = 0x40;

        const PRESERVE      = Self::SUBSTITUTED.bits() | Self::LIGATED.bits() | Self::MULTIPLIED.bits();
    }
}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    struct AuxFlags: u16 {
        const DEFAULT_IGNORABLE = 0x01;
        const ZWJ               = 0x02;
        const ZWNJ              = 0x04;
        const HIDDEN            = 0x08;
    }
}

bitflags::bitflags! {
    /// Flags produced by positioning for each glyph.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GlyphFlags: u8 {
        /// Breaking the text before this glyph and shaping the parts separately
        /// would give a different result.
        const UNSAFE_TO_BREAK = 0x01;
        /// Concatenating text around this glyph would give a different result.
        const UNSAFE_TO_CONCAT = 0x02;
        const DEFINED = Self::UNSAFE_TO_BREAK.bits() | Self::UNSAFE_TO_CONCAT.bits();
    }
}

const IS_LIG_BASE: u8 = 0x10;

impl GlyphInfo {
    /// Creates a glyph info with all lookup mask bits set.
    pub fn new(glyph_id: u32, cluster: u32) -> Self {
        GlyphInfo {
            glyph_id,
            mask: u32::MAX,
            cluster,
            ..GlyphInfo::default()
        }
    }

    #[inline]
    pub(crate) fn as_glyph(&self) -> GlyphId {
        debug_assert!(self.glyph_id <= u32::from(u16::MAX));
        GlyphId(self.glyph_id as u16)
    }

    #[inline]
    fn aux(&self) -> &[u16; 2] {
        bytemuck::cast_ref(&self.var1)
    }

    #[inline]
    fn aux_mut(&mut self) -> &mut [u16; 2] {
        bytemuck::cast_mut(&mut self.var1)
    }

    #[inline]
    fn bytes(&self) -> &[u8; 4] {
        bytemuck::cast_ref(&self.var2)
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8; 4] {
        bytemuck::cast_mut(&mut self.var2)
    }

    #[inline]
    pub(crate) fn glyph_props(&self) -> u16 {
        self.aux()[0]
    }

    #[inline]
    pub(crate) fn set_glyph_props(&mut self, n: u16) {
        self.aux_mut()[0] = n;
    }

    #[inline]
    fn aux_flags(&self) -> AuxFlags {
        AuxFlags::from_bits_truncate(self.aux()[1])
    }

    fn set_aux_flag(&mut self, flag: AuxFlags, value: bool) {
        let mut flags = self.aux_flags();
        flags.set(flag, value);
        self.aux_mut()[1] = flags.bits();
    }

    #[inline]
    pub(crate) fn lig_props(&self) -> u8 {
        self.bytes()[0]
    }

    #[inline]
    pub(crate) fn set_lig_props(&mut self, n: u8) {
        self.bytes_mut()[0] = n;
    }

    /// Returns the syllable index set by the substitution stage.
    #[inline]
    pub fn syllable(&self) -> u8 {
        self.bytes()[1]
    }

    /// Sets the syllable index used by per-syllable lookups.
    #[inline]
    pub fn set_syllable(&mut self, n: u8) {
        self.bytes_mut()[1] = n;
    }

    /// Returns flags computed by positioning.
    #[inline]
    pub fn glyph_flags(&self) -> GlyphFlags {
        GlyphFlags::from_bits_truncate(self.bytes()[2])
    }

    #[inline]
    pub(crate) fn add_glyph_flags(&mut self, flags: GlyphFlags) {
        self.bytes_mut()[2] |= flags.bits();
    }

    /// Indicates that if input text is broken at the beginning of the cluster
    /// this glyph is part of, then both sides need to be re-shaped.
    #[inline]
    pub fn unsafe_to_break(&self) -> bool {
        self.glyph_flags().contains(GlyphFlags::UNSAFE_TO_BREAK)
    }

    /// Indicates that if input text is changed on one side of the beginning of
    /// the cluster this glyph is part of, then the shaping results for the
    /// other side might change.
    #[inline]
    pub fn unsafe_to_concat(&self) -> bool {
        self.glyph_flags().contains(GlyphFlags::UNSAFE_TO_CONCAT)
    }

    /// Sets the glyph class guessed by the substitution stage.
    ///
    /// A GDEF glyph class definition overrides it during positioning.
    /// `mark_attachment_class` is only used for marks.
    pub fn set_glyph_class(&mut self, class: Option<GlyphClass>, mark_attachment_class: u8) {
        let props = glyph_props_for_class(class, mark_attachment_class);
        let preserved = self.glyph_props() & GlyphPropsFlags::PRESERVE.bits();
        self.set_glyph_props(preserved | props);
    }

    /// Marks the glyph as a ligature produced by the substitution stage.
    pub fn set_ligature_base(&mut self, lig_id: u8, num_comps: u8) {
        self.set_lig_props((lig_id << 5) | IS_LIG_BASE | (num_comps & 0x0F));
        let props = self.glyph_props() | GlyphPropsFlags::SUBSTITUTED.bits();
        self.set_glyph_props(props | GlyphPropsFlags::LIGATED.bits());
    }

    /// Attaches the glyph to a component of a ligature.
    ///
    /// A zero `lig_id` with a non-zero `comp` describes the glyphs of a
    /// multiple substitution sequence.
    pub fn set_ligature_component(&mut self, lig_id: u8, comp: u8) {
        self.set_lig_props((lig_id << 5) | (comp & 0x0F));
    }

    /// Marks the glyph as produced by a multiple substitution.
    pub fn set_multiplied(&mut self, value: bool) {
        let mut props = self.glyph_props() | GlyphPropsFlags::SUBSTITUTED.bits();
        if value {
            props |= GlyphPropsFlags::MULTIPLIED.bits();
        } else {
            props &= !GlyphPropsFlags::MULTIPLIED.bits();
        }
        self.set_glyph_props(props);
    }

    /// Marks the glyph as default ignorable.
    pub fn set_default_ignorable(&mut self, value: bool) {
        self.set_aux_flag(AuxFlags::DEFAULT_IGNORABLE, value);
    }

    /// Marks the glyph as a zero width joiner. Implies default ignorable.
    pub fn set_zwj(&mut self, value: bool) {
        self.set_aux_flag(AuxFlags::ZWJ, value);
        if value {
            self.set_default_ignorable(true);
        }
    }

    /// Marks the glyph as a zero width non-joiner. Implies default ignorable.
    pub fn set_zwnj(&mut self, value: bool) {
        self.set_aux_flag(AuxFlags::ZWNJ, value);
        if value {
            self.set_default_ignorable(true);
        }
    }

    /// Marks the glyph as hidden, like CGJ. Implies default ignorable.
    pub fn set_hidden(&mut self, value: bool) {
        self.set_aux_flag(AuxFlags::HIDDEN, value);
        if value {
            self.set_default_ignorable(true);
        }
    }

    #[inline]
    pub(crate) fn is_default_ignorable(&self) -> bool {
        self.aux_flags().contains(AuxFlags::DEFAULT_IGNORABLE) && !self.is_substituted()
    }

    #[inline]
    pub(crate) fn is_zwj(&self) -> bool {
        self.aux_flags().contains(AuxFlags::ZWJ)
    }

    #[inline]
    pub(crate) fn is_zwnj(&self) -> bool {
        self.aux_flags().contains(AuxFlags::ZWNJ)
    }

    #[inline]
    pub(crate) fn is_mark(&self) -> bool {
        self.glyph_props() & GlyphPropsFlags::MARK.bits() != 0
    }

    #[inline]
    pub(crate) fn is_ligature(&self) -> bool {
        self.glyph_props() & GlyphPropsFlags::LIGATURE.bits() != 0
    }

    #[inline]
    pub(crate) fn is_substituted(&self) -> bool {
        self.glyph_props() & GlyphPropsFlags::SUBSTITUTED.bits() != 0
    }

    #[inline]
    pub(crate) fn is_multiplied(&self) -> bool {
        self.glyph_props() & GlyphPropsFlags::MULTIPLIED.bits() != 0
    }

    #[inline]
    pub(crate) fn lig_id(&self) -> u8 {
        self.lig_props() >> 5
    }

    #[inline]
    fn is_ligated_internal(&self) -> bool {
        self.lig_props() & IS_LIG_BASE != 0
    }

    #[inline]
    pub(crate) fn lig_comp(&self) -> u8 {
        if self.is_ligated_internal() {
            0
        } else {
            self.lig_props() & 0x0F
        }
    }

    #[inline]
    pub(crate) fn lig_num_comps(&self) -> u8 {
        if self.is_ligature() && self.is_ligated_internal() {
            self.lig_props() & 0x0F
        } else {
            1
        }
    }
}

/// Maps a glyph class to the class bits of glyph props.
pub(crate) fn glyph_props_for_class(class: Option<GlyphClass>, mark_attachment_class: u8) -> u16 {
    match class {
        Some(GlyphClass::Base) => GlyphPropsFlags::BASE_GLYPH.bits(),
        Some(GlyphClass::Ligature) => GlyphPropsFlags::LIGATURE.bits(),
        Some(GlyphClass::Mark) => {
            GlyphPropsFlags::MARK.bits() | (u16::from(mark_attachment_class) << 8)
        }
        Some(GlyphClass::Component) | None => 0,
    }
}

bitflags::bitflags! {
    /// Flags for buffers.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// Compute the unsafe-to-concat glyph flag.
        const PRODUCE_UNSAFE_TO_CONCAT = 0x00000040;
    }
}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct BufferScratchFlags: u32 {
        const HAS_GLYPH_FLAGS       = 0x00000001;
        const HAS_GPOS_ATTACHMENT   = 0x00000002;
    }
}

/// A glyph buffer: glyph infos, positions and a run direction.
///
/// Owned by the caller and mutated in place by positioning.
#[derive(Clone, Debug)]
pub struct Buffer {
    pub(crate) direction: Direction,
    pub(crate) flags: BufferFlags,
    pub(crate) info: Vec<GlyphInfo>,
    pub(crate) pos: Vec<GlyphPosition>,
    pub(crate) idx: usize,
    pub(crate) scratch_flags: BufferScratchFlags,
    pub(crate) max_ops: i32,
}

impl Buffer {
    /// Creates an empty buffer for a run in the given direction.
    pub fn new(direction: Direction) -> Self {
        Buffer {
            direction,
            flags: BufferFlags::empty(),
            info: Vec::new(),
            pos: Vec::new(),
            idx: 0,
            scratch_flags: BufferScratchFlags::empty(),
            max_ops: MAX_OPS_MIN,
        }
    }

    /// Appends a glyph with its default (unpositioned) advances.
    pub fn push(&mut self, info: GlyphInfo, position: GlyphPosition) {
        self.info.push(info);
        self.pos.push(position);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.info.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    #[inline]
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    #[inline]
    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.flags = flags;
    }

    #[inline]
    pub fn glyph_infos(&self) -> &[GlyphInfo] {
        &self.info
    }

    #[inline]
    pub fn glyph_infos_mut(&mut self) -> &mut [GlyphInfo] {
        &mut self.info
    }

    #[inline]
    pub fn glyph_positions(&self) -> &[GlyphPosition] {
        &self.pos
    }

    #[inline]
    pub fn glyph_positions_mut(&mut self) -> &mut [GlyphPosition] {
        &mut self.pos
    }

    /// Removes all glyphs, keeping the direction and flags.
    pub fn clear(&mut self) {
        self.info.clear();
        self.pos.clear();
        self.idx = 0;
        self.scratch_flags = BufferScratchFlags::empty();
    }

    pub(crate) fn reset_max_ops(&mut self) {
        let len = i32::try_from(self.len()).unwrap_or(i32::MAX);
        self.max_ops = len.saturating_mul(MAX_OPS_FACTOR).max(MAX_OPS_MIN);
    }

    #[inline]
    pub(crate) fn cur(&self, i: usize) -> &GlyphInfo {
        &self.info[self.idx + i]
    }

    #[inline]
    pub(crate) fn cur_pos_mut(&mut self) -> &mut GlyphPosition {
        &mut self.pos[self.idx]
    }

    #[inline]
    pub(crate) fn next_glyph(&mut self) {
        self.idx += 1;
    }

    /// Moves the cursor. Positioning is in place, so this never copies glyphs.
    pub(crate) fn move_to(&mut self, i: usize) -> bool {
        if i > self.len() {
            return false;
        }

        self.idx = i;
        true
    }

    pub(crate) fn unsafe_to_break(&mut self, start: usize, end: usize) {
        self.set_glyph_flags(GlyphFlags::DEFINED, start, end, true, false);
    }

    pub(crate) fn unsafe_to_break_from_outbuffer(&mut self, start: usize, end: usize) {
        self.set_glyph_flags(GlyphFlags::DEFINED, start, end, true, true);
    }

    pub(crate) fn unsafe_to_concat(&mut self, start: usize, end: usize) {
        if !self.flags.contains(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT) {
            return;
        }

        self.set_glyph_flags(GlyphFlags::UNSAFE_TO_CONCAT, start, end, false, false);
    }

    pub(crate) fn unsafe_to_concat_from_outbuffer(&mut self, start: usize, end: usize) {
        if !self.flags.contains(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT) {
            return;
        }

        self.set_glyph_flags(GlyphFlags::UNSAFE_TO_CONCAT, start, end, false, true);
    }

    fn set_glyph_flags(
        &mut self,
        mask: GlyphFlags,
        start: usize,
        end: usize,
        interior: bool,
        from_out_buffer: bool,
    ) {
        let end = end.min(self.len());
        if start >= end {
            return;
        }

        if interior && !from_out_buffer && end - start < 2 {
            return;
        }

        self.scratch_flags |= BufferScratchFlags::HAS_GLYPH_FLAGS;

        if !interior {
            for info in &mut self.info[start..end] {
                info.add_glyph_flags(mask);
            }
        } else {
            let cluster = self.info[start].cluster.min(self.info[end - 1].cluster);
            self.set_interior_glyph_flags(start, end, cluster, mask);
        }
    }

    fn set_interior_glyph_flags(
        &mut self,
        start: usize,
        end: usize,
        cluster: u32,
        mask: GlyphFlags,
    ) {
        let infos = &mut self.info;
        let cluster_first = infos[start].cluster;
        let cluster_last = infos[end - 1].cluster;

        if cluster != cluster_first && cluster != cluster_last {
            for info in &mut infos[start..end] {
                if info.cluster != cluster {
                    info.add_glyph_flags(mask);
                }
            }
            return;
        }

        // Monotone clusters.
        if cluster == cluster_first {
            let mut i = end;
            while start < i && infos[i - 1].cluster != cluster_first {
                infos[i - 1].add_glyph_flags(mask);
                i -= 1;
            }
        } else {
            let mut i = start;
            while i < end && infos[i].cluster != cluster_last {
                infos[i].add_glyph_flags(mask);
                i += 1;
            }
        }
    }
}
