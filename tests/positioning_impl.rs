#![allow(dead_code)]

use otpos::{
    Buffer, BufferFlags, ContourPointSource, Direction, Face, FaceTables, Font, GlyphClass,
    GlyphId, GlyphInfo, GlyphPosition, LookupMap,
};

/// A binary table under construction.
///
/// Offsets are written as placeholders and patched in `build`,
/// where children are appended after the parent data.
#[derive(Default)]
pub struct Table {
    data: Vec<u8>,
    children: Vec<(usize, bool, Table)>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i16(mut self, v: i16) -> Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn offset(mut self, child: Table) -> Self {
        self.children.push((self.data.len(), false, child));
        self.u16(0)
    }

    pub fn offset32(mut self, child: Table) -> Self {
        self.children.push((self.data.len(), true, child));
        self.u32(0)
    }

    pub fn build(self) -> Vec<u8> {
        let mut data = self.data;
        for (pos, long, child) in self.children {
            let offset = data.len();
            if long {
                data[pos..pos + 4].copy_from_slice(&(offset as u32).to_be_bytes());
            } else {
                data[pos..pos + 2].copy_from_slice(&(offset as u16).to_be_bytes());
            }
            data.extend(child.build());
        }
        data
    }
}

pub fn coverage(glyphs: &[u16]) -> Table {
    let mut t = Table::new().u16(1).u16(glyphs.len() as u16);
    for g in glyphs {
        t = t.u16(*g);
    }
    t
}

pub fn anchor(x: i16, y: i16) -> Table {
    Table::new().u16(1).i16(x).i16(y)
}

/// An anchor that moves to a hinted contour point.
pub fn contour_anchor(x: i16, y: i16, point: u16) -> Table {
    Table::new().u16(2).i16(x).i16(y).u16(point)
}

/// A hinting device with one 8-bit pixel adjustment per size.
pub fn hinting_device(start_size: u16, pixels: &[i8]) -> Table {
    let end_size = start_size + pixels.len() as u16 - 1;
    let mut t = Table::new().u16(start_size).u16(end_size).u16(3);
    for chunk in pixels.chunks(2) {
        let high = u16::from(chunk[0] as u8) << 8;
        let low = chunk.get(1).map_or(0, |v| u16::from(*v as u8));
        t = t.u16(high | low);
    }
    t
}

pub fn variation_device(outer_index: u16, inner_index: u16) -> Table {
    Table::new().u16(outer_index).u16(inner_index).u16(0x8000)
}

pub fn lookup(kind: u16, flags: u16, subtables: Vec<Table>) -> Table {
    let mut t = Table::new()
        .u16(kind)
        .u16(flags)
        .u16(subtables.len() as u16);
    for subtable in subtables {
        t = t.offset(subtable);
    }
    t
}

/// A lookup that uses a GDEF mark glyph set.
pub fn filtered_lookup(kind: u16, set: u16, subtables: Vec<Table>) -> Table {
    let mut t = Table::new()
        .u16(kind)
        .u16(0x0010)
        .u16(subtables.len() as u16);
    for subtable in subtables {
        t = t.offset(subtable);
    }
    t.u16(set)
}

pub fn gpos(lookups: Vec<Table>) -> Vec<u8> {
    let mut list = Table::new().u16(lookups.len() as u16);
    for lookup in lookups {
        list = list.offset(lookup);
    }

    Table::new()
        .u16(1)
        .u16(0)
        .u16(0) // script list
        .u16(0) // feature list
        .offset(list)
        .build()
}

/// GDEF 1.2 with glyph classes and mark glyph sets.
///
/// `classes` must be sorted by glyph.
pub fn gdef(classes: &[(u16, u16)], mark_sets: &[&[u16]]) -> Vec<u8> {
    let mut class_def = Table::new().u16(2).u16(classes.len() as u16);
    for &(glyph, class) in classes {
        class_def = class_def.u16(glyph).u16(glyph).u16(class);
    }

    let mut sets = Table::new().u16(1).u16(mark_sets.len() as u16);
    for set in mark_sets {
        sets = sets.offset32(coverage(set));
    }

    Table::new()
        .u32(0x00010002)
        .offset(class_def)
        .u16(0)
        .u16(0)
        .u16(0)
        .offset(sets)
        .build()
}

/// GDEF 1.3 with a single-axis item variation store.
///
/// Each item of the only data set is varied by one region peaking at the
/// maximum of the axis.
pub fn gdef_with_deltas(deltas: &[i16]) -> Vec<u8> {
    let regions = Table::new()
        .u16(1) // axis count
        .u16(1) // region count
        .i16(0)
        .i16(0x4000)
        .i16(0x4000);

    let mut items = Table::new()
        .u16(deltas.len() as u16)
        .u16(1) // word deltas
        .u16(1)
        .u16(0);
    for delta in deltas {
        items = items.i16(*delta);
    }

    let store = Table::new()
        .u16(1)
        .offset32(regions)
        .u16(1)
        .offset32(items);

    Table::new()
        .u32(0x00010003)
        .u16(0) // glyph classes
        .u16(0)
        .u16(0)
        .u16(0)
        .u16(0) // mark glyph sets
        .offset32(store)
        .build()
}

/// Single adjustment format 1 with an x placement and an x advance.
pub fn single(glyphs: &[u16], x_placement: i16, x_advance: i16) -> Table {
    Table::new()
        .u16(1)
        .offset(coverage(glyphs))
        .u16(0x0001 | 0x0004)
        .i16(x_placement)
        .i16(x_advance)
}

/// Single adjustment format 1 with an x advance and its device.
pub fn single_with_device(glyphs: &[u16], x_advance: i16, device: Table) -> Table {
    Table::new()
        .u16(1)
        .offset(coverage(glyphs))
        .u16(0x0004 | 0x0040)
        .i16(x_advance)
        .offset(device)
}

fn first_glyphs(rules: &[(u16, u16, i16)]) -> Vec<u16> {
    let mut glyphs: Vec<u16> = rules.iter().map(|r| r.0).collect();
    glyphs.sort_unstable();
    glyphs.dedup();
    glyphs
}

fn second_glyphs(rules: &[(u16, u16, i16)]) -> Vec<u16> {
    let mut glyphs: Vec<u16> = rules.iter().map(|r| r.1).collect();
    glyphs.sort_unstable();
    glyphs.dedup();
    glyphs
}

/// Pair adjustment format 1 built from `(first, second, x_advance)` rules.
pub fn glyph_pairs(rules: &[(u16, u16, i16)]) -> Table {
    let firsts = first_glyphs(rules);
    let mut t = Table::new()
        .u16(1)
        .offset(coverage(&firsts))
        .u16(0x0004)
        .u16(0)
        .u16(firsts.len() as u16);
    for first in &firsts {
        let mut seconds: Vec<(u16, i16)> = rules
            .iter()
            .filter(|r| r.0 == *first)
            .map(|r| (r.1, r.2))
            .collect();
        seconds.sort_unstable();

        let mut set = Table::new().u16(seconds.len() as u16);
        for (glyph, x_advance) in seconds {
            set = set.u16(glyph).i16(x_advance);
        }
        t = t.offset(set);
    }
    t
}

/// Pair adjustment format 2 built from the same rules as [`glyph_pairs`].
///
/// Every glyph gets a class of its own.
pub fn class_pairs(rules: &[(u16, u16, i16)]) -> Table {
    let class_def = |glyphs: &[u16]| {
        let mut t = Table::new().u16(2).u16(glyphs.len() as u16);
        for (i, g) in glyphs.iter().enumerate() {
            t = t.u16(*g).u16(*g).u16(i as u16 + 1);
        }
        t
    };

    let firsts = first_glyphs(rules);
    let seconds = second_glyphs(rules);
    let mut t = Table::new()
        .u16(2)
        .offset(coverage(&firsts))
        .u16(0x0004)
        .u16(0)
        .offset(class_def(&firsts[..]))
        .offset(class_def(&seconds[..]))
        .u16(firsts.len() as u16 + 1)
        .u16(seconds.len() as u16 + 1);

    // Class 0 rows and columns stay empty.
    for class1 in 0..=firsts.len() {
        for class2 in 0..=seconds.len() {
            let x_advance = match (class1.checked_sub(1), class2.checked_sub(1)) {
                (Some(i), Some(j)) => rules
                    .iter()
                    .find(|r| r.0 == firsts[i] && r.1 == seconds[j])
                    .map_or(0, |r| r.2),
                _ => 0,
            };
            t = t.i16(x_advance);
        }
    }
    t
}

/// Pair adjustment format 1 with an x advance for the first glyph.
pub fn pair(first: u16, second: u16, x_advance: i16) -> Table {
    let set = Table::new().u16(1).u16(second).i16(x_advance);
    Table::new()
        .u16(1)
        .offset(coverage(&[first]))
        .u16(0x0004)
        .u16(0)
        .u16(1)
        .offset(set)
}

/// Pair adjustment format 2 with a single class pair (1, 1).
pub fn class_pair(firsts: &[u16], seconds: &[u16], x_advance: i16) -> Table {
    let class_def = |glyphs: &[u16]| {
        let mut t = Table::new().u16(2).u16(glyphs.len() as u16);
        for g in glyphs {
            t = t.u16(*g).u16(*g).u16(1);
        }
        t
    };

    Table::new()
        .u16(2)
        .offset(coverage(firsts))
        .u16(0x0004)
        .u16(0)
        .offset(class_def(firsts))
        .offset(class_def(seconds))
        .u16(2)
        .u16(2)
        // (0, 0), (0, 1), (1, 0), (1, 1)
        .i16(0)
        .i16(0)
        .i16(0)
        .i16(x_advance)
}

/// Cursive attachment with one entry/exit pair per glyph.
pub fn cursive(records: &[(u16, Option<(i16, i16)>, Option<(i16, i16)>)]) -> Table {
    let glyphs: Vec<u16> = records.iter().map(|r| r.0).collect();
    let mut t = Table::new()
        .u16(1)
        .offset(coverage(&glyphs))
        .u16(records.len() as u16);
    for (_, entry, exit) in records {
        t = match entry {
            Some((x, y)) => t.offset(anchor(*x, *y)),
            None => t.u16(0),
        };
        t = match exit {
            Some((x, y)) => t.offset(anchor(*x, *y)),
            None => t.u16(0),
        };
    }
    t
}

fn mark_array(marks: &[(u16, i16, i16)]) -> Table {
    let mut t = Table::new().u16(marks.len() as u16);
    for &(_, x, y) in marks {
        t = t.u16(0).offset(anchor(x, y));
    }
    t
}

/// Mark-to-base attachment with a single mark class.
pub fn mark_base(marks: &[(u16, i16, i16)], bases: &[(u16, i16, i16)]) -> Table {
    let bases = bases
        .iter()
        .map(|&(glyph, x, y)| (glyph, anchor(x, y)))
        .collect();
    mark_base_anchors(marks, bases)
}

/// Mark-to-base attachment with a single mark class and arbitrary base anchors.
pub fn mark_base_anchors(marks: &[(u16, i16, i16)], bases: Vec<(u16, Table)>) -> Table {
    let mark_glyphs: Vec<u16> = marks.iter().map(|m| m.0).collect();
    let base_glyphs: Vec<u16> = bases.iter().map(|b| b.0).collect();

    let mut base_array = Table::new().u16(bases.len() as u16);
    for (_, anchor) in bases {
        base_array = base_array.offset(anchor);
    }

    Table::new()
        .u16(1)
        .offset(coverage(&mark_glyphs))
        .offset(coverage(&base_glyphs))
        .u16(1)
        .offset(mark_array(marks))
        .offset(base_array)
}

/// Mark-to-ligature attachment for one ligature with an anchor per component.
pub fn mark_lig(marks: &[(u16, i16, i16)], ligature: u16, components: &[(i16, i16)]) -> Table {
    let mark_glyphs: Vec<u16> = marks.iter().map(|m| m.0).collect();

    let mut attach = Table::new().u16(components.len() as u16);
    for &(x, y) in components {
        attach = attach.offset(anchor(x, y));
    }

    let lig_array = Table::new().u16(1).offset(attach);

    Table::new()
        .u16(1)
        .offset(coverage(&mark_glyphs))
        .offset(coverage(&[ligature]))
        .u16(1)
        .offset(mark_array(marks))
        .offset(lig_array)
}

/// Mark-to-mark attachment with a single mark class.
///
/// The layout is the same as mark-to-base, only the lookup type differs.
pub fn mark_mark(marks: &[(u16, i16, i16)], mark2s: &[(u16, i16, i16)]) -> Table {
    mark_base(marks, mark2s)
}

/// Chained context format 3 applying `nested` to the first input glyph.
pub fn chain_context(
    backtrack: &[&[u16]],
    input: &[&[u16]],
    lookahead: &[&[u16]],
    nested: u16,
) -> Table {
    let mut t = Table::new().u16(3).u16(backtrack.len() as u16);
    for glyphs in backtrack {
        t = t.offset(coverage(glyphs));
    }

    t = t.u16(input.len() as u16);
    for glyphs in input {
        t = t.offset(coverage(glyphs));
    }

    t = t.u16(lookahead.len() as u16);
    for glyphs in lookahead {
        t = t.offset(coverage(glyphs));
    }

    t.u16(1).u16(0).u16(nested)
}

/// Context format 1 with one rule of `input` glyphs, applying `nested` at `sequence_index`.
pub fn context(input: &[u16], sequence_index: u16, nested: u16) -> Table {
    let mut rule = Table::new().u16(input.len() as u16).u16(1);
    for g in &input[1..] {
        rule = rule.u16(*g);
    }
    rule = rule.u16(sequence_index).u16(nested);

    let rule_set = Table::new().u16(1).offset(rule);
    Table::new()
        .u16(1)
        .offset(coverage(&input[..1]))
        .u16(1)
        .offset(rule_set)
}

pub fn base(gid: u32, advance: i32) -> (GlyphInfo, GlyphPosition) {
    let mut info = GlyphInfo::new(gid, 0);
    info.set_glyph_class(Some(GlyphClass::Base), 0);
    (info, GlyphPosition::with_advance(advance, 0))
}

pub fn mark(gid: u32) -> (GlyphInfo, GlyphPosition) {
    let mut info = GlyphInfo::new(gid, 0);
    info.set_glyph_class(Some(GlyphClass::Mark), 0);
    (info, GlyphPosition::default())
}

/// Hinted contour points as `(glyph, point, x, y)`.
pub struct ContourPoints(pub Vec<(u16, u16, i32, i32)>);

impl ContourPointSource for ContourPoints {
    fn contour_point(&self, glyph: GlyphId, point_index: u16) -> Option<(i32, i32)> {
        self.0
            .iter()
            .find(|p| p.0 == glyph.0 && p.1 == point_index)
            .map(|p| (p.2, p.3))
    }
}

struct Args {
    direction: Option<Direction>,
    font_scale: Option<i32>,
    ppem: Option<u16>,
    coords: Vec<i16>,
    lookups: Option<Vec<u16>>,
    unsafe_to_concat: bool,
    show_flags: bool,
}

fn parse_args(args: Vec<std::ffi::OsString>) -> Result<Args, pico_args::Error> {
    let mut parser = pico_args::Arguments::from_vec(args);
    let args = Args {
        direction: parser.opt_value_from_str("--direction")?,
        font_scale: parser.opt_value_from_str("--font-scale")?,
        ppem: parser.opt_value_from_str("--ppem")?,
        coords: parser.opt_value_from_fn("--coords", parse_list)?.unwrap_or_default(),
        lookups: parser.opt_value_from_fn("--lookups", parse_list)?,
        unsafe_to_concat: parser.contains("--unsafe-to-concat"),
        show_flags: parser.contains("--show-flags"),
    };

    parser.finish()?;

    Ok(args)
}

fn parse_list<T: std::str::FromStr>(s: &str) -> Result<Vec<T>, String> {
    s.split(',')
        .map(|v| v.parse().map_err(|_| format!("invalid list item '{}'", v)))
        .collect()
}

/// Positions glyphs and serializes them as `gid=cluster@x_offset,y_offset+x_advance`.
///
/// Clusters are the glyph indices. The offset part is omitted when both
/// offsets are zero and a non-zero y advance is appended after a comma.
pub fn position(
    tables: FaceTables,
    glyphs: Vec<(GlyphInfo, GlyphPosition)>,
    options: &str,
) -> String {
    position_with_points(tables, glyphs, options, None)
}

/// Like [`position`], with hinted contour points for the font.
pub fn position_with_points(
    tables: FaceTables,
    glyphs: Vec<(GlyphInfo, GlyphPosition)>,
    options: &str,
    points: Option<&ContourPoints>,
) -> String {
    let args = options
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(std::ffi::OsString::from)
        .collect();
    let args = parse_args(args).unwrap();

    let face = Face::from_tables(tables).unwrap();
    let mut font = Font::new(&face);
    if let Some(scale) = args.font_scale {
        font.set_scale(scale, scale);
    }
    if let Some(ppem) = args.ppem {
        font.set_pixels_per_em(Some((ppem, ppem)));
    }
    if !args.coords.is_empty() {
        font.set_normalized_coords(&args.coords);
    }
    if let Some(points) = points {
        font.set_contour_points(points);
    }

    let mut buffer = Buffer::new(args.direction.unwrap_or(Direction::LeftToRight));
    if args.unsafe_to_concat {
        buffer.set_flags(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT);
    }

    for (i, (mut info, pos)) in glyphs.into_iter().enumerate() {
        info.cluster = i as u32;
        buffer.push(info, pos);
    }

    match args.lookups {
        Some(indices) => {
            let maps: Vec<LookupMap> = indices.into_iter().map(LookupMap::new).collect();
            otpos::position(&font, &maps, &mut buffer);
        }
        None => otpos::position_all(&font, &mut buffer),
    }

    serialize(&buffer, args.show_flags)
}

fn serialize(buffer: &Buffer, show_flags: bool) -> String {
    let mut out = Vec::new();
    for (info, pos) in buffer.glyph_infos().iter().zip(buffer.glyph_positions()) {
        let mut s = format!("{}={}", info.glyph_id, info.cluster);
        if pos.x_offset != 0 || pos.y_offset != 0 {
            s.push_str(&format!("@{},{}", pos.x_offset, pos.y_offset));
        }
        s.push_str(&format!("+{}", pos.x_advance));
        if pos.y_advance != 0 {
            s.push_str(&format!(",{}", pos.y_advance));
        }
        if show_flags && info.glyph_flags().bits() != 0 {
            s.push_str(&format!("#{:X}", info.glyph_flags().bits()));
        }
        out.push(s);
    }
    out.join("|")
}

pub fn tables<'a>(gpos: &'a [u8], gdef: Option<&'a [u8]>) -> FaceTables<'a> {
    FaceTables {
        units_per_em: 1000,
        gdef,
        gpos: Some(gpos),
        gvar: None,
    }
}
