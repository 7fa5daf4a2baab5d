//! A compact, lossy summary of a glyph set.
//!
//! The digest answers "definitely not present" or "maybe present". It is
//! used to reject whole lookups that can not apply to the glyphs in a buffer.

use ttf_parser::GlyphId;

type Mask = u32;

const MASK_BITS: u32 = Mask::BITS;

// Three bit patterns combined, each looking at a different slice of the glyph id.
const SHIFTS: [u32; 3] = [4, 0, 9];

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SetDigest {
    masks: [Mask; 3],
}

#[inline]
fn mask_for(g: GlyphId, shift: u32) -> Mask {
    1 << ((u32::from(g.0) >> shift) & (MASK_BITS - 1))
}

impl SetDigest {
    pub fn new() -> Self {
        Self { masks: [0; 3] }
    }

    pub fn full() -> Self {
        Self { masks: [Mask::MAX; 3] }
    }

    pub fn union(&mut self, o: &SetDigest) {
        for (mask, other) in self.masks.iter_mut().zip(o.masks) {
            *mask |= other;
        }
    }

    pub fn add(&mut self, g: GlyphId) {
        for (mask, shift) in self.masks.iter_mut().zip(SHIFTS) {
            *mask |= mask_for(g, shift);
        }
    }

    pub fn add_array(&mut self, array: impl IntoIterator<Item = GlyphId>) {
        for g in array {
            self.add(g);
        }
    }

    pub fn add_range(&mut self, a: GlyphId, b: GlyphId) {
        if b < a {
            return;
        }

        for (mask, shift) in self.masks.iter_mut().zip(SHIFTS) {
            if *mask == Mask::MAX {
                continue;
            }

            if (u32::from(b.0) >> shift) - (u32::from(a.0) >> shift) >= MASK_BITS - 1 {
                *mask = Mask::MAX;
            } else {
                let ma = mask_for(a, shift);
                let mb = mask_for(b, shift);
                *mask |= mb
                    .wrapping_add(mb.wrapping_sub(ma))
                    .wrapping_sub(u32::from(mb < ma));
            }
        }
    }

    pub fn may_have(&self, o: &SetDigest) -> bool {
        self.masks
            .iter()
            .zip(o.masks)
            .all(|(mask, other)| mask & other != 0)
    }

    pub fn may_have_glyph(&self, g: GlyphId) -> bool {
        self.masks
            .iter()
            .zip(SHIFTS)
            .all(|(mask, shift)| mask & mask_for(g, shift) != 0)
    }
}
