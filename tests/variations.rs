use otpos::{
    Component, ComponentFlags, ComponentPlacement, ContourPoint, Face, FaceTables, Font, GlyphId,
    Outline, OutlineKind, OutlineSource, PhantomPoints, Transform, VariationError,
};

const EMBEDDED_PEAK_TUPLE: u16 = 0x8000;
const PRIVATE_POINT_NUMBERS: u16 = 0x2000;

/// A tuple with an embedded single-axis peak.
struct Tuple {
    peak: i16,
    points: Option<Vec<u16>>,
    x: Vec<i16>,
    y: Vec<i16>,
}

fn pack_points(points: &[u16]) -> Vec<u8> {
    let mut out = vec![points.len() as u8];
    let mut prev = 0;
    for chunk in points.chunks(128) {
        out.push(chunk.len() as u8 - 1);
        for &p in chunk {
            out.push((p - prev) as u8);
            prev = p;
        }
    }
    out
}

fn pack_deltas(values: &[i16]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in values.chunks(64) {
        if chunk.iter().all(|v| *v == 0) {
            out.push(0x80 | (chunk.len() as u8 - 1));
        } else {
            out.push(0x40 | (chunk.len() as u8 - 1));
            for v in chunk {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    out
}

fn glyph_data(tuples: &[Tuple]) -> Vec<u8> {
    let mut headers = Vec::new();
    let mut serialized = Vec::new();
    for tuple in tuples {
        let mut data = Vec::new();
        let mut index = EMBEDDED_PEAK_TUPLE;
        if let Some(ref points) = tuple.points {
            index |= PRIVATE_POINT_NUMBERS;
            data.extend(pack_points(points));
        }
        data.extend(pack_deltas(&tuple.x));
        data.extend(pack_deltas(&tuple.y));

        headers.extend_from_slice(&(data.len() as u16).to_be_bytes());
        headers.extend_from_slice(&index.to_be_bytes());
        headers.extend_from_slice(&tuple.peak.to_be_bytes());
        serialized.extend(data);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&(tuples.len() as u16).to_be_bytes());
    out.extend_from_slice(&(4 + headers.len() as u16).to_be_bytes());
    out.extend(headers);
    out.extend(serialized);
    if out.len() % 2 != 0 {
        out.push(0);
    }
    out
}

/// A single-axis gvar table with short offsets.
fn gvar(glyphs: &[Vec<u8>]) -> Vec<u8> {
    let array_offset = 20 + (glyphs.len() as u32 + 1) * 2;
    let mut out = Vec::new();
    out.extend_from_slice(&0x00010000u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // axis count
    out.extend_from_slice(&0u16.to_be_bytes()); // shared tuple count
    out.extend_from_slice(&array_offset.to_be_bytes());
    out.extend_from_slice(&(glyphs.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // flags
    out.extend_from_slice(&array_offset.to_be_bytes());

    let mut offset = 0;
    out.extend_from_slice(&0u16.to_be_bytes());
    for data in glyphs {
        offset += data.len();
        out.extend_from_slice(&((offset / 2) as u16).to_be_bytes());
    }

    for data in glyphs {
        out.extend_from_slice(data);
    }
    out
}

fn shift_point_zero() -> Vec<u8> {
    glyph_data(&[Tuple {
        peak: 0x4000,
        points: Some(vec![0]),
        x: vec![50],
        y: vec![0],
    }])
}

struct Outlines(Vec<(u16, Outline)>);

impl OutlineSource for Outlines {
    fn outline(&self, glyph: GlyphId) -> Option<Outline> {
        self.0
            .iter()
            .find(|(id, _)| *id == glyph.0)
            .map(|(_, outline)| outline.clone())
    }
}

fn phantom(advance: f32) -> PhantomPoints {
    PhantomPoints {
        right: ContourPoint::new(advance, 0.0),
        ..PhantomPoints::default()
    }
}

fn triangle() -> Outline {
    Outline {
        kind: OutlineKind::Simple {
            points: vec![
                ContourPoint::new(0.0, 0.0),
                ContourPoint::new(100.0, 0.0),
                ContourPoint::new(50.0, 100.0),
            ],
            contour_ends: vec![2],
        },
        phantom: phantom(200.0),
    }
}

fn square() -> Outline {
    Outline {
        kind: OutlineKind::Simple {
            points: vec![
                ContourPoint::new(0.0, 0.0),
                ContourPoint::new(10.0, 0.0),
                ContourPoint::new(10.0, 10.0),
                ContourPoint::new(0.0, 10.0),
            ],
            contour_ends: vec![3],
        },
        phantom: phantom(100.0),
    }
}

fn triangle_points() -> Vec<ContourPoint> {
    let mut points = vec![
        ContourPoint::new(0.0, 0.0),
        ContourPoint::new(100.0, 0.0),
        ContourPoint::new(50.0, 100.0),
    ];
    points.extend_from_slice(&[
        ContourPoint::default(),
        ContourPoint::new(200.0, 0.0),
        ContourPoint::default(),
        ContourPoint::default(),
    ]);
    points
}

fn face_tables(gvar: &[u8]) -> FaceTables {
    FaceTables {
        units_per_em: 1000,
        gvar: Some(gvar),
        ..FaceTables::default()
    }
}

fn varied(gvar: &[u8], coords: &[i16]) -> (Result<(), VariationError>, Vec<ContourPoint>) {
    let face = Face::from_tables(face_tables(gvar)).unwrap();
    let mut font = Font::new(&face);
    font.set_normalized_coords(coords);
    let mut points = triangle_points();
    let result = font.apply_glyph_variations(GlyphId(0), &mut points, &[2]);
    (result, points)
}

#[test]
fn single_reference_shifts_whole_contour() {
    let gvar = gvar(&[shift_point_zero()]);
    let (result, points) = varied(&gvar, &[0x4000]);
    assert_eq!(result, Ok(()));
    assert_eq!(points[0], ContourPoint::new(50.0, 0.0));
    assert_eq!(points[1], ContourPoint::new(150.0, 0.0));
    assert_eq!(points[2], ContourPoint::new(100.0, 100.0));
    // Phantom points are never inferred.
    assert_eq!(points[4], ContourPoint::new(200.0, 0.0));
}

#[test]
fn deltas_are_scaled_by_the_tuple_scalar() {
    let gvar = gvar(&[shift_point_zero()]);
    let (_, points) = varied(&gvar, &[0x2000]);
    assert_eq!(points[0], ContourPoint::new(25.0, 0.0));
    assert_eq!(points[2], ContourPoint::new(75.0, 100.0));
}

#[test]
fn default_and_opposite_coordinates_are_neutral() {
    let gvar = gvar(&[shift_point_zero()]);
    assert_eq!(varied(&gvar, &[0]).1, triangle_points());
    assert_eq!(varied(&gvar, &[-0x4000]).1, triangle_points());
}

#[test]
fn axis_count_mismatch() {
    let gvar = gvar(&[shift_point_zero()]);
    let (result, points) = varied(&gvar, &[0x4000, 0]);
    assert_eq!(result, Err(VariationError::UnsupportedConfiguration));
    assert_eq!(points, triangle_points());
}

#[test]
fn malformed_tuple_keeps_previous_ones() {
    let mut data = shift_point_zero();
    // Declare a second tuple that is not there.
    data[1] = 2;
    let gvar = gvar(&[data]);
    let (result, points) = varied(&gvar, &[0x4000]);
    assert_eq!(result, Err(VariationError::MalformedData));
    assert_eq!(points[0], ContourPoint::new(50.0, 0.0));
}

#[test]
fn missing_gvar_is_noop() {
    let face = Face::from_tables(FaceTables {
        units_per_em: 1000,
        ..FaceTables::default()
    })
    .unwrap();
    let mut font = Font::new(&face);
    font.set_normalized_coords(&[0x4000]);
    let mut points = triangle_points();
    assert_eq!(font.apply_glyph_variations(GlyphId(0), &mut points, &[2]), Ok(()));
    assert_eq!(points, triangle_points());
    assert_eq!(face.variation_axis_count(), 0);
}

#[test]
fn simple_glyph_metrics() {
    let gvar = gvar(&[shift_point_zero()]);
    let face = Face::from_tables(face_tables(&gvar)).unwrap();
    assert_eq!(face.variation_axis_count(), 1);

    let mut font = Font::new(&face);
    font.set_normalized_coords(&[0x4000]);
    let source = Outlines(vec![(0, triangle())]);
    let metrics = font.glyph_metrics(GlyphId(0), &source).unwrap();
    assert_eq!(metrics.h_advance, 200);
    assert_eq!(metrics.lsb, 50);
    assert_eq!(metrics.bbox.map(|b| (b.x_min, b.x_max)), Some((50.0, 150.0)));
}

#[test]
fn composite_offsets_and_phantom_points_vary() {
    // One component and four phantom points.
    let composite_data = glyph_data(&[Tuple {
        peak: 0x4000,
        points: None,
        x: vec![20, 0, 30, 0, 0],
        y: vec![0; 5],
    }]);
    let gvar = gvar(&[shift_point_zero(), Vec::new(), composite_data]);
    let face = Face::from_tables(face_tables(&gvar)).unwrap();
    let mut font = Font::new(&face);
    font.set_normalized_coords(&[0x4000]);

    let source = Outlines(vec![
        (1, square()),
        (
            2,
            Outline {
                kind: OutlineKind::Composite(vec![Component {
                    glyph_id: GlyphId(1),
                    transform: Transform::default(),
                    placement: ComponentPlacement::Offset { x: 100, y: 0 },
                    flags: ComponentFlags::empty(),
                }]),
                phantom: phantom(300.0),
            },
        ),
    ]);

    let glyph = font.glyph_points(GlyphId(2), &source).unwrap();
    assert_eq!(glyph.contour_ends, vec![3]);
    assert_eq!(glyph.points[0], ContourPoint::new(120.0, 0.0));
    assert_eq!(glyph.points[2], ContourPoint::new(130.0, 10.0));

    let metrics = glyph.metrics();
    assert_eq!(metrics.h_advance, 330);
    assert_eq!(metrics.lsb, 120);

    // The default instance keeps the composite as is.
    font.set_normalized_coords(&[0]);
    let glyph = font.glyph_points(GlyphId(2), &source).unwrap();
    assert_eq!(glyph.points[0], ContourPoint::new(100.0, 0.0));
    assert_eq!(glyph.metrics().h_advance, 300);
}

#[test]
fn missing_component_fails() {
    let face = Face::from_tables(FaceTables {
        units_per_em: 1000,
        ..FaceTables::default()
    })
    .unwrap();
    let font = Font::new(&face);
    let source = Outlines(vec![(
        2,
        Outline {
            kind: OutlineKind::Composite(vec![Component {
                glyph_id: GlyphId(9),
                transform: Transform::default(),
                placement: ComponentPlacement::Offset { x: 0, y: 0 },
                flags: ComponentFlags::empty(),
            }]),
            phantom: phantom(300.0),
        },
    )]);
    assert!(font.glyph_points(GlyphId(2), &source).is_none());
}
