//! End-to-end scenarios driven through the public session API.

use chisel_config::{AutomaskingFlags, BrushSettings, FalloffCurve, SymmetryFlags, ToolSettings};
use glam::{Vec3, Vec4};
use sculpting::{
    Backing, BackingKind, ColorFilter, ColorFilterSettings, ColorFilterType, FloodFill, MaskFilterSettings,
    MaskFilterType, Mesh, MeshFilter, MeshFilterSettings, MeshFilterType, MultiresGrids, NullHost, ObjectId,
    RecordingHost, SculptSession, SculptStroke, StrokeSample, UndoStack, apply_mask_filter,
    filter::OrientationFrame,
};

fn session(mesh: Mesh) -> SculptSession {
    SculptSession::from_mesh(ObjectId(1), mesh, ToolSettings::default()).unwrap()
}

fn sample(x: f32, y: f32) -> StrokeSample {
    StrokeSample::new(Vec3::new(x, y, 0.0), Vec3::Z, 1.0)
}

fn one_dab(session: &mut SculptSession, brush: &BrushSettings, at: StrokeSample) {
    let mut undo = UndoStack::new();
    let stroke = SculptStroke::begin(session, brush, at, &mut undo, &NullHost).unwrap();
    stroke.end(session, &mut undo);
}

fn mask_filter(filter_type: MaskFilterType) -> MaskFilterSettings {
    MaskFilterSettings {
        filter_type,
        ..Default::default()
    }
}

#[test]
fn test_grow_on_cube_reaches_edge_neighbors() {
    let mut session = session(Mesh::cube(2.0));
    session.write_attrs(&[]).masks[0] = 1.0;

    apply_mask_filter(
        &mut session,
        &mask_filter(MaskFilterType::Grow),
        &mut UndoStack::new(),
        &NullHost,
    )
    .unwrap();

    let masks = &session.attrs().masks;
    for v in [0, 1, 3, 4] {
        assert_eq!(masks[v], 1.0, "vertex {v}");
    }
    for v in [2, 5, 6, 7] {
        assert_eq!(masks[v], 0.0, "vertex {v}");
    }
}

#[test]
fn test_repeated_grow_is_monotonic_and_fills() {
    let mut session = session(Mesh::grid(6, 6, 1.0));
    session.write_attrs(&[]).masks[0] = 1.0;
    let mut undo = UndoStack::new();

    let mut previous = session.attrs().masks.clone();
    for _ in 0..12 {
        apply_mask_filter(&mut session, &mask_filter(MaskFilterType::Grow), &mut undo, &NullHost).unwrap();
        let current = &session.attrs().masks;
        assert!(current.iter().zip(&previous).all(|(now, before)| now >= before));
        previous = current.clone();
    }
    // Twelve passes cover the grid diagonal
    assert!(session.attrs().masks.iter().all(|&m| m == 1.0));
    assert_eq!(undo.len(), 12);
}

#[test]
fn test_repeated_shrink_is_monotonic_and_settles() {
    let mut session = session(Mesh::grid(6, 6, 1.0));
    for m in session.write_attrs(&[]).masks.iter_mut() {
        *m = 1.0;
    }
    session.write_attrs(&[]).masks[0] = 0.0;
    let mut undo = UndoStack::new();

    let mut previous = session.attrs().masks.clone();
    for _ in 0..12 {
        apply_mask_filter(&mut session, &mask_filter(MaskFilterType::Shrink), &mut undo, &NullHost).unwrap();
        let current = &session.attrs().masks;
        assert!(current.iter().zip(&previous).all(|(now, before)| now <= before));
        previous = current.clone();
    }
    assert!(session.attrs().masks.iter().all(|&m| m == 0.0));

    let host = RecordingHost::new();
    let written = apply_mask_filter(&mut session, &mask_filter(MaskFilterType::Shrink), &mut undo, &host).unwrap();
    assert_eq!(written, 0);
    assert!(host.notifications().is_empty());
}

#[test]
fn test_zero_strength_contrast_leaves_masks_untouched() {
    let mut session = session(Mesh::grid(4, 4, 1.0));
    let masks: Vec<f32> = (0..session.attrs().len()).map(|i| i as f32 / 25.0).collect();
    session.write_attrs(&[]).masks = masks.clone();

    let settings = MaskFilterSettings {
        filter_type: MaskFilterType::ContrastIncrease,
        strength: 0.0,
        ..Default::default()
    };
    let host = RecordingHost::new();
    let written = apply_mask_filter(&mut session, &settings, &mut UndoStack::new(), &host).unwrap();

    assert_eq!(written, 0);
    assert!(host.notifications().is_empty());
    let bits = |values: &[f32]| values.iter().map(|m| m.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&session.attrs().masks), bits(&masks));
}

#[test]
fn test_surface_smooth_full_shape_preservation_holds_sphere() {
    let mut session = session(Mesh::uv_sphere(12, 8, 1.0));
    let before = session.attrs().positions.clone();
    let settings = MeshFilterSettings {
        filter_type: MeshFilterType::SurfaceSmooth,
        surface_smooth_shape_preservation: 1.0,
        iterations: 3,
        ..Default::default()
    };
    let mut undo = UndoStack::new();
    let mut filter = MeshFilter::start(&mut session, settings, &OrientationFrame::default(), &mut undo).unwrap();
    filter.update(&mut session, 1.0, &mut undo, &NullHost).unwrap();
    filter.finish(&mut session, &mut undo);

    for (after, before) in session.attrs().positions.iter().zip(&before) {
        assert!((*after - *before).length() < 1e-6);
    }
}

#[test]
fn test_color_fill_is_exact_at_full_strength() {
    let mut session = session(Mesh::grid(3, 3, 1.0));
    session.write_attrs(&[]).ensure_colors(Vec4::new(0.2, 0.3, 0.4, 0.5));
    let settings = ColorFilterSettings {
        filter_type: ColorFilterType::Fill,
        fill_color: [1.0, 0.0, 0.25],
    };
    let mut undo = UndoStack::new();
    let host = RecordingHost::new();
    let mut filter = ColorFilter::start(&mut session, settings, &mut undo, &host).unwrap();
    filter.update(&mut session, 1.0, &mut undo, &host).unwrap();
    filter.finish(&mut session, &mut undo);

    let colors = session.attrs().colors.as_deref().unwrap();
    assert!(colors.iter().all(|&c| c == Vec4::new(1.0, 0.0, 0.25, 1.0)));
    assert_eq!(undo.len(), 1);
}

#[test]
fn test_flood_fill_visits_in_layer_order() {
    let session = session(Mesh::grid(4, 4, 1.0));
    let mut fill = FloodFill::new(session.attrs().len());
    fill.add_initial(0);

    let mut order = Vec::new();
    fill.execute_on(session.topology(), session.attrs(), |_from, to, _duplicate| {
        order.push(to);
        true
    });

    // Edge distance from the corner is the Manhattan distance on the grid
    let layer = |v: u32| v % 5 + v / 5;
    assert_eq!(order.len(), 24);
    assert!(order.windows(2).all(|pair| layer(pair[0]) <= layer(pair[1])));
    assert!(fill.is_visited(24));
}

#[test]
fn test_face_set_automasking_holds_other_sets() {
    let mut mesh = Mesh::grid(8, 8, 2.0);
    for face in 0..64 {
        if face % 8 < 4 {
            mesh.face_sets[face] = 2;
        }
    }
    let mut session = session(mesh);
    let brush = BrushSettings {
        radius: 3.0,
        strength: 0.5,
        falloff: FalloffCurve::Constant,
        automasking: AutomaskingFlags::FACE_SETS,
        ..BrushSettings::draw()
    };
    one_dab(&mut session, &brush, sample(-0.5, 0.0));
    assert_eq!(session.active_face_set, 2);

    let positions = &session.attrs().positions;
    for row in 0..9 {
        for column in 0..9 {
            let z = positions[row * 9 + column].z;
            match column {
                0..=4 => assert!(z > 0.0, "vertex ({column}, {row}) did not move"),
                _ => assert_eq!(z, 0.0, "vertex ({column}, {row}) moved"),
            }
        }
    }
}

#[test]
fn test_x_symmetry_moves_mirror_equally() {
    let tool = ToolSettings {
        symmetry: SymmetryFlags::X,
        ..Default::default()
    };
    let mut session = SculptSession::from_mesh(ObjectId(1), Mesh::grid(8, 8, 2.0), tool).unwrap();
    let brush = BrushSettings {
        radius: 0.3,
        ..BrushSettings::draw()
    };
    one_dab(&mut session, &brush, sample(0.5, 0.0));

    let positions = &session.attrs().positions;
    assert!(positions[42].z > 0.0);
    assert!((positions[42].z - positions[38].z).abs() < 1e-5);
    assert!((positions[42].x + positions[38].x).abs() < 1e-5);
}

#[test]
fn test_dyntopo_undo_restores_every_attribute() {
    let mut mesh = Mesh::grid(4, 4, 2.0);
    let count = mesh.vertex_count();
    mesh.verts.colors = Some((0..count).map(|i| Vec4::new(i as f32 / count as f32, 0.2, 0.7, 1.0)).collect());
    mesh.verts.masks[7] = 0.5;
    for face in 0..8 {
        mesh.face_sets[face] = 3;
    }
    let mut session = session(mesh);
    let before = session.mesh().unwrap().clone();
    session.tool.dyntopo.detail_size = 0.2;
    let mut undo = UndoStack::new();

    session.enable_dyntopo(&mut undo).unwrap();
    assert_eq!(undo.last().map(|step| step.label.as_str()), Some("Dynamic Topology Toggle"));

    let draw = BrushSettings {
        radius: 0.6,
        ..BrushSettings::draw()
    };
    let mut stroke = SculptStroke::begin(&mut session, &draw, sample(0.1, 0.1), &mut undo, &NullHost).unwrap();
    stroke.update(&mut session, sample(0.4, 0.1), &mut undo, &NullHost).unwrap();
    stroke.end(&mut session, &mut undo);
    let topo = session.dyntopo().unwrap();
    assert!(topo.mesh().face_count() > before.face_count() * 2);

    let mask = BrushSettings {
        radius: 0.5,
        ..BrushSettings::mask()
    };
    one_dab(&mut session, &mask, sample(-0.5, -0.5));
    assert!(session.attrs().masks.iter().any(|&m| m > 0.5));

    let fill = ColorFilterSettings {
        filter_type: ColorFilterType::Fill,
        fill_color: [1.0, 0.0, 0.0],
    };
    let mut filter = ColorFilter::start(&mut session, fill, &mut undo, &NullHost).unwrap();
    filter.update(&mut session, 1.0, &mut undo, &NullHost).unwrap();
    filter.finish(&mut session, &mut undo);

    while undo.undo(&mut session).unwrap() {}
    assert_eq!(session.kind(), BackingKind::Faces);
    assert_eq!(session.mesh().unwrap(), &before);
}

#[test]
fn test_grid_duplicates_stay_stitched_after_stroke() {
    let base = Mesh::grid(2, 2, 2.0);
    let grids = MultiresGrids::from_mesh(&base, 2);
    let mut session = SculptSession::new(ObjectId(1), Backing::Grids(grids), ToolSettings::default());
    let brush = BrushSettings {
        radius: 0.8,
        ..BrushSettings::draw()
    };
    one_dab(&mut session, &brush, sample(0.1, 0.1));

    let grids = session.grids().unwrap();
    let positions = &session.attrs().positions;
    assert!(positions.iter().any(|p| p.z > 0.0));
    for v in 0..positions.len() as u32 {
        for &dup in grids.duplicates(v) {
            let delta = positions[v as usize] - positions[dup as usize];
            assert!(delta.length() < 1e-6, "vertex {v} and duplicate {dup} diverged");
        }
    }
}
