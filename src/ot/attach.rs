//! Attachment bookkeeping of a positioning pass.

use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::buffer::GlyphPosition;
use crate::common::Direction;

pub mod attach_type {
    pub const MARK: u8 = 1;
    pub const CURSIVE: u8 = 2;
}

/// Per-glyph attachment links.
///
/// `chain` is the signed distance to the glyph this one is attached to.
/// Zero, or a target outside of the buffer, means no attachment.
#[derive(Clone, Default, Debug)]
pub(crate) struct Attachments {
    chains: Vec<i32>,
    kinds: Vec<u8>,
}

impl Attachments {
    pub fn reset(&mut self, len: usize) {
        self.chains.clear();
        self.chains.resize(len, 0);
        self.kinds.clear();
        self.kinds.resize(len, 0);
    }

    #[inline]
    pub fn chain(&self, i: usize) -> i32 {
        self.chains.get(i).copied().unwrap_or(0)
    }

    #[inline]
    pub fn kind(&self, i: usize) -> u8 {
        self.kinds.get(i).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set(&mut self, i: usize, kind: u8, chain: i32) {
        if let (Some(k), Some(c)) = (self.kinds.get_mut(i), self.chains.get_mut(i)) {
            *k = kind;
            *c = chain;
        }
    }

    #[inline]
    pub fn set_chain(&mut self, i: usize, chain: i32) {
        if let Some(c) = self.chains.get_mut(i) {
            *c = chain;
        }
    }

    /// Returns the index a glyph is attached to.
    #[inline]
    fn target(&self, i: usize) -> Option<usize> {
        let chain = self.chain(i);
        if chain == 0 {
            return None;
        }

        let j = usize::try_from(i as i64 + i64::from(chain)).ok()?;
        if j < self.chains.len() {
            Some(j)
        } else {
            None
        }
    }
}

/// Reverses the cursive chain starting at `child`,
/// so that its previous tree hangs off `child` once it gets a new parent.
///
/// Stops at `new_parent` to avoid a cycle.
pub(crate) fn reverse_cursive_chain(
    pos: &mut [GlyphPosition],
    attachments: &mut Attachments,
    child: usize,
    new_parent: usize,
    direction: Direction,
    max_depth: usize,
) {
    let mut links: SmallVec<[(usize, usize, i32, u8); 8]> = SmallVec::new();
    let mut i = child;
    loop {
        let chain = attachments.chain(i);
        let kind = attachments.kind(i);
        if chain == 0 || kind & attach_type::CURSIVE == 0 {
            break;
        }

        let Some(j) = attachments.target(i) else {
            attachments.set_chain(i, 0);
            break;
        };

        attachments.set_chain(i, 0);
        if j == new_parent {
            break;
        }

        if links.len() >= max_depth {
            log::warn!("cursive chain at glyph {} is too long", child);
            break;
        }

        links.push((i, j, chain, kind));
        i = j;
    }

    for &(i, j, chain, kind) in links.iter().rev() {
        if direction.is_horizontal() {
            pos[j].y_offset = -pos[i].y_offset;
        } else {
            pos[j].x_offset = -pos[i].x_offset;
        }

        attachments.set(j, kind, -chain);
    }
}

/// Accumulates offsets of attached glyphs, so that each one is
/// positioned relative to the glyph it is attached to.
///
/// Consumes the links, leaving `attachments` empty.
pub(crate) fn propagate_offsets(
    pos: &mut [GlyphPosition],
    attachments: &mut Attachments,
    direction: Direction,
    max_depth: usize,
) {
    let len = pos.len().min(attachments.chains.len());
    let mut path: SmallVec<[(usize, usize, u8); 8]> = SmallVec::new();
    for start in 0..len {
        path.clear();
        let mut i = start;
        while attachments.chain(i) != 0 {
            let target = attachments.target(i);
            let kind = attachments.kind(i);
            attachments.set_chain(i, 0);

            let Some(j) = target else {
                break;
            };

            if path.len() >= max_depth {
                log::warn!("attachment chain at glyph {} is too long", start);
                break;
            }

            path.push((i, j, kind));
            i = j;
        }

        for &(i, j, kind) in path.iter().rev() {
            apply_link(pos, i, j, kind, direction);
        }
    }
}

fn apply_link(pos: &mut [GlyphPosition], i: usize, j: usize, kind: u8, direction: Direction) {
    let parent = pos[j];
    match kind {
        attach_type::MARK => {
            let mut x_offset = pos[i].x_offset + parent.x_offset;
            let mut y_offset = pos[i].y_offset + parent.y_offset;

            if direction.is_forward() {
                for p in pos.get(j..i).unwrap_or_default() {
                    x_offset -= p.x_advance;
                    y_offset -= p.y_advance;
                }
            } else {
                for p in pos.get(j + 1..i + 1).unwrap_or_default() {
                    x_offset += p.x_advance;
                    y_offset += p.y_advance;
                }
            }

            pos[i].x_offset = x_offset;
            pos[i].y_offset = y_offset;
        }
        attach_type::CURSIVE => {
            if direction.is_horizontal() {
                pos[i].y_offset += parent.y_offset;
            } else {
                pos[i].x_offset += parent.x_offset;
            }
        }
        _ => {}
    }
}
