//! End-to-end tests of the remeshing pipeline.

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use nalgebra::Point3;
use quadflow::field::{CompactQuadMesh, Hierarchy};
use quadflow::mesh::CompactMesh;
use quadflow::prelude::*;

fn cube() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let faces = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [2, 3, 7],
        [2, 7, 6],
        [1, 2, 6],
        [1, 6, 5],
        [3, 0, 4],
        [3, 4, 7],
    ];
    (vertices, faces)
}

fn grid(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n * 2);
    for j in 0..=n {
        for i in 0..=n {
            vertices.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;
            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }
    (vertices, faces)
}

fn icosahedron() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let t = (1.0 + 5f64.sqrt()) / 2.0;
    let vertices = vec![
        Point3::new(-1.0, t, 0.0),
        Point3::new(1.0, t, 0.0),
        Point3::new(-1.0, -t, 0.0),
        Point3::new(1.0, -t, 0.0),
        Point3::new(0.0, -1.0, t),
        Point3::new(0.0, 1.0, t),
        Point3::new(0.0, -1.0, -t),
        Point3::new(0.0, 1.0, -t),
        Point3::new(t, 0.0, -1.0),
        Point3::new(t, 0.0, 1.0),
        Point3::new(-t, 0.0, -1.0),
        Point3::new(-t, 0.0, 1.0),
    ];
    let faces = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    (vertices, faces)
}

fn flatten<T: Copy, const N: usize>(rows: &[[T; N]]) -> Vec<T> {
    rows.iter().flatten().copied().collect()
}

fn assert_valid(mesh: &QuadMesh) {
    assert!(mesh.num_vertices() > 0);
    assert!(mesh.num_faces() > 0);
    assert_eq!(mesh.vertices().len(), mesh.num_vertices() * 3);
    assert_eq!(mesh.faces().len(), mesh.num_faces() * 4);
    for &index in mesh.faces() {
        assert!((index as usize) < mesh.num_vertices());
    }
    assert!(mesh.vertices().iter().all(|x| x.is_finite()));
}

// ============================================================================
// Bundled engine
// ============================================================================

#[test]
fn test_cube_end_to_end() {
    let (vertices, faces) = cube();
    let options = RemeshOptions::new(20).with_seed(0);

    let first = quad_remesh(&vertices, &faces, &options).unwrap();
    assert_valid(&first);

    let second = quad_remesh(&vertices, &faces, &options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_cube_through_arrays() {
    let (vertices, faces) = cube();
    let flat_vertices = flatten(&vertices.iter().map(|p| [p.x, p.y, p.z]).collect::<Vec<_>>());
    let flat_faces: Vec<i32> = flatten(&faces).into_iter().map(|i| i as i32).collect();
    let options = RemeshOptions::new(20);

    let from_arrays = quad_remesh_arrays(
        ArrayView::new(&flat_vertices, 3),
        ArrayView::new(&flat_faces, 3),
        &options,
    )
    .unwrap();
    let typed = quad_remesh(&vertices, &faces, &options).unwrap();
    assert_eq!(from_arrays, typed);
}

#[test]
fn test_output_stays_near_input() {
    let (vertices, faces) = cube();
    let mesh = quad_remesh(&vertices, &faces, &RemeshOptions::new(20)).unwrap();
    for i in 0..mesh.num_vertices() {
        let p = mesh.position(i);
        for k in 0..3 {
            assert!(p[k] > -0.5 && p[k] < 1.5, "vertex {i} at {p:?}");
        }
    }
}

#[test]
fn test_icosahedron_with_seed() {
    let (vertices, faces) = icosahedron();
    let options = RemeshOptions::new(100).with_seed(42);
    let a = quad_remesh(&vertices, &faces, &options).unwrap();
    let b = quad_remesh(&vertices, &faces, &options).unwrap();
    assert_valid(&a);
    assert_eq!(a, b);
}

#[test]
fn test_every_flag_runs() {
    let (vertices, faces) = cube();
    let options = RemeshOptions::new(20)
        .with_preserve_sharp(true)
        .with_preserve_boundary(true)
        .with_adaptive_scale(true)
        .with_aggressive_sat(true)
        .with_minimum_cost_flow(true);
    let mesh = quad_remesh(&vertices, &faces, &options).unwrap();
    assert_valid(&mesh);
    assert_eq!(mesh, quad_remesh(&vertices, &faces, &options).unwrap());
}

#[test]
fn test_open_grid_with_boundary() {
    let (vertices, faces) = grid(6);
    let options = RemeshOptions::new(16).with_preserve_boundary(true);
    let mesh = quad_remesh(&vertices, &faces, &options).unwrap();
    assert_valid(&mesh);
    // Lattice spacing for 16 quads over a 6 x 6 grid
    let spacing = (36.0f64 / 16.0).sqrt();
    let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
    let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
    for i in 0..mesh.num_vertices() {
        let p = mesh.position(i);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-9);
        min = min.inf(&p);
        max = max.sup(&p);
    }
    for k in 0..2 {
        assert!(min[k] >= -spacing && min[k] <= spacing, "min {min:?}");
        assert!(max[k] >= 6.0 - spacing && max[k] <= 6.0 + spacing, "max {max:?}");
    }
}

#[test]
fn test_sequential_engine_matches_parallel() {
    let (vertices, faces) = icosahedron();
    let options = RemeshOptions::new(60).with_seed(5);
    let parallel = CrossFieldEngine::new(EngineOptions::default());
    let sequential = CrossFieldEngine::new(EngineOptions::default().sequential());

    let a = quad_remesh_with_engine(&vertices, &faces, &options, &parallel).unwrap();
    let b = quad_remesh_with_engine(&vertices, &faces, &options, &sequential).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_independent_runs_on_threads() {
    let (vertices, faces) = cube();
    let options = RemeshOptions::new(20);
    let expected = quad_remesh(&vertices, &faces, &options).unwrap();

    let (vertices, faces, options) = (&vertices, &faces, &options);
    let results: Vec<QuadMesh> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..3)
            .map(|_| scope.spawn(move || quad_remesh(vertices, faces, options).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for result in results {
        assert_eq!(result, expected);
    }
}

// ============================================================================
// Input validation
// ============================================================================

#[test]
fn test_rejects_two_column_vertices() {
    let err = quad_remesh_arrays(
        ArrayView::new(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0], 2),
        ArrayView::new(&[0, 1, 2], 3),
        &RemeshOptions::new(10),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.to_string().contains("vertices"));
}

#[test]
fn test_rejects_five_column_faces() {
    let err = quad_remesh_arrays(
        ArrayView::new(&[0.0; 15], 3),
        ArrayView::new(&[0, 1, 2, 3, 4], 5),
        &RemeshOptions::new(10),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.to_string().contains("faces"));
}

#[test]
fn test_rejects_non_positive_target() {
    let (vertices, faces) = cube();
    for target in [0, -5] {
        let err = quad_remesh(&vertices, &faces, &RemeshOptions::new(target)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
    }
}

#[test]
fn test_rejects_empty_input() {
    let options = RemeshOptions::new(10);
    let empty_vertices: [f64; 0] = [];
    let empty_faces: [i32; 0] = [];

    let err = quad_remesh_arrays(
        ArrayView::new(&empty_vertices, 3),
        ArrayView::new(&[0, 1, 2], 3),
        &options,
    )
    .unwrap_err();
    assert!(matches!(err, RemeshError::EmptyInput { vertices: 0, .. }));

    let err = quad_remesh_arrays(
        ArrayView::new(&[0.0; 9], 3),
        ArrayView::new(&empty_faces, 3),
        &options,
    )
    .unwrap_err();
    assert!(matches!(err, RemeshError::EmptyInput { faces: 0, .. }));
}

#[test]
fn test_rejects_out_of_range_index() {
    let (vertices, mut faces) = cube();
    faces[3] = [4, 6, 8];
    let err = quad_remesh(&vertices, &faces, &RemeshOptions::new(20)).unwrap_err();
    assert!(matches!(err, RemeshError::InvalidVertexIndex { face: 3, vertex: 8 }));
}

// ============================================================================
// Stage sequencing (recording engine)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Initialize(usize),
    Propagate { constrained: bool },
    Orientations,
    OrientationSingularities,
    Slope,
    Scale(bool),
    Positions(bool),
    PositionSingularities,
    IndexMap,
}

/// Engine that builds a plain hierarchy, records every call and returns the
/// ingested triangles as degenerate quads.
#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<Call>>,
    empty: bool,
    fail_orientations: bool,
}

impl RecordingEngine {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl FieldEngine for RecordingEngine {
    fn initialize(&self, state: &mut FieldState, mesh: &CompactMesh, target_faces: usize) -> Result<()> {
        self.record(Call::Initialize(target_faces));
        state.hierarchy.build(&mesh.positions, mesh.faces.clone(), 1.0);
        Ok(())
    }

    fn propagate_constraints(&self, hierarchy: &mut Hierarchy) -> Result<()> {
        let constrained = hierarchy.finest().constraints.any();
        self.record(Call::Propagate { constrained });
        hierarchy.propagate_constraints();
        Ok(())
    }

    fn optimize_orientations(&self, _state: &mut FieldState) -> Result<()> {
        self.record(Call::Orientations);
        if self.fail_orientations {
            return Err(RemeshError::engine(Stage::OrientationOptimized, "diverged"));
        }
        Ok(())
    }

    fn compute_orientation_singularities(&self, _state: &mut FieldState) -> Result<()> {
        self.record(Call::OrientationSingularities);
        Ok(())
    }

    fn estimate_slope(&self, _state: &mut FieldState) -> Result<()> {
        self.record(Call::Slope);
        Ok(())
    }

    fn optimize_scale(&self, _state: &mut FieldState, adaptive: bool) -> Result<()> {
        self.record(Call::Scale(adaptive));
        Ok(())
    }

    fn optimize_positions(&self, _state: &mut FieldState, adaptive: bool) -> Result<()> {
        self.record(Call::Positions(adaptive));
        Ok(())
    }

    fn compute_position_singularities(&self, _state: &mut FieldState) -> Result<()> {
        self.record(Call::PositionSingularities);
        Ok(())
    }

    fn compute_index_map(&self, state: &mut FieldState) -> Result<()> {
        self.record(Call::IndexMap);
        if self.empty {
            state.quads = CompactQuadMesh::default();
            return Ok(());
        }
        let finest = state.hierarchy.finest();
        state.quads = CompactQuadMesh {
            positions: finest.positions.iter().map(|&p| Point3::from(p)).collect(),
            faces: state
                .hierarchy
                .faces
                .iter()
                .map(|&[a, b, c]| [a, b, c, c])
                .collect(),
        };
        Ok(())
    }
}

#[test]
fn test_default_stage_order() {
    let (vertices, faces) = cube();
    let engine = RecordingEngine::default();
    quad_remesh_with_engine(&vertices, &faces, &RemeshOptions::new(20), &engine).unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            Call::Initialize(20),
            Call::Orientations,
            Call::OrientationSingularities,
            Call::Scale(false),
            Call::Positions(true),
            Call::PositionSingularities,
            Call::IndexMap,
        ]
    );
}

#[test]
fn test_adaptive_stage_order() {
    let (vertices, faces) = cube();
    let engine = RecordingEngine::default();
    let options = RemeshOptions::new(20).with_adaptive_scale(true);
    quad_remesh_with_engine(&vertices, &faces, &options, &engine).unwrap();

    let calls = engine.calls();
    assert_eq!(calls[2], Call::OrientationSingularities);
    assert_eq!(calls[3], Call::Slope);
    assert_eq!(calls[4], Call::Scale(true));
    assert_eq!(calls[5], Call::Positions(true));
}

#[test]
fn test_boundary_constraints_propagate_once() {
    let (vertices, faces) = grid(3);
    let engine = RecordingEngine::default();
    let options = RemeshOptions::new(10).with_preserve_boundary(true);
    quad_remesh_with_engine(&vertices, &faces, &options, &engine).unwrap();

    let calls = engine.calls();
    assert_eq!(calls[1], Call::Propagate { constrained: true });
    assert_eq!(calls[2], Call::Orientations);
    let propagations = calls
        .iter()
        .filter(|c| matches!(c, Call::Propagate { .. }))
        .count();
    assert_eq!(propagations, 1);
}

#[test]
fn test_no_propagation_without_boundary_flag() {
    let (vertices, faces) = grid(3);
    let engine = RecordingEngine::default();
    quad_remesh_with_engine(&vertices, &faces, &RemeshOptions::new(10), &engine).unwrap();
    assert!(!engine
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Propagate { .. })));
}

#[test]
fn test_empty_index_map_is_an_error() {
    let (vertices, faces) = cube();
    let engine = RecordingEngine {
        empty: true,
        ..RecordingEngine::default()
    };
    let err = quad_remesh_with_engine(&vertices, &faces, &RemeshOptions::new(20), &engine)
        .unwrap_err();
    assert!(matches!(err, RemeshError::EmptyResult { vertices: 0, faces: 0 }));
    assert_eq!(err.kind(), ErrorKind::EmptyResult);
}

#[test]
fn test_engine_error_is_propagated() {
    let (vertices, faces) = cube();
    let engine = RecordingEngine {
        fail_orientations: true,
        ..RecordingEngine::default()
    };
    let err = quad_remesh_with_engine(&vertices, &faces, &RemeshOptions::new(20), &engine)
        .unwrap_err();
    assert!(matches!(
        err,
        RemeshError::Engine {
            stage: Stage::OrientationOptimized,
            ..
        }
    ));
    assert_eq!(engine.calls().last(), Some(&Call::Orientations));
}

#[test]
fn test_parameter_error_before_any_stage() {
    let (vertices, faces) = cube();
    let engine = RecordingEngine::default();
    let err = quad_remesh_with_engine(&vertices, &faces, &RemeshOptions::new(0), &engine)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parameter);
    assert!(engine.calls().is_empty());
}

#[test]
fn test_input_error_before_any_stage() {
    let (vertices, faces) = cube();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = RemeshOptions::new(20).with_progress(Progress::new(move |_, _, name| {
        sink.lock().unwrap().push(name.to_string());
    }));
    let engine = RecordingEngine::default();

    let err = quad_remesh_with_engine(&vertices[..1], &[], &options, &engine).unwrap_err();
    assert!(matches!(err, RemeshError::EmptyInput { vertices: 1, faces: 0 }));

    let mut bad = faces.clone();
    bad[0] = [0, 1, 8];
    let err = quad_remesh_with_engine(&vertices, &bad, &options, &engine).unwrap_err();
    assert!(matches!(err, RemeshError::InvalidVertexIndex { face: 0, vertex: 8 }));

    assert!(engine.calls().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_dedup_and_denormalization() {
    // Vertex 0 is referenced by no face and must disappear
    let vertices = vec![
        Point3::new(100.0, 100.0, 100.0),
        Point3::new(2.0, 3.0, 4.0),
        Point3::new(6.0, 3.0, 4.0),
        Point3::new(2.0, 7.0, 4.0),
    ];
    let faces = vec![[3, 1, 2]];
    let engine = RecordingEngine::default();
    let mesh = quad_remesh_with_engine(&vertices, &faces, &RemeshOptions::new(1), &engine).unwrap();

    assert_eq!(mesh.num_vertices(), 3);
    assert_eq!(mesh.faces(), &[0, 1, 2, 2]);
    // First-reference order: 3, 1, 2
    assert_relative_eq!(mesh.position(0), vertices[3], epsilon = 1e-12);
    assert_relative_eq!(mesh.position(1), vertices[1], epsilon = 1e-12);
    assert_relative_eq!(mesh.position(2), vertices[2], epsilon = 1e-12);
}

#[test]
fn test_progress_reports_each_stage() {
    let (vertices, faces) = cube();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = RemeshOptions::new(20).with_progress(Progress::new(move |current, total, name| {
        sink.lock().unwrap().push((current, total, name.to_string()));
    }));
    quad_remesh_with_engine(&vertices, &faces, &options, &RecordingEngine::default()).unwrap();

    let seen = seen.lock().unwrap();
    let names: Vec<&str> = seen.iter().map(|(_, _, name)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "configuration",
            "ingestion",
            "initialization",
            "orientation optimization",
            "orientation singularities",
            "scale optimization",
            "adaptive scale pin",
            "position optimization",
            "position singularities",
            "index map",
        ]
    );
    assert!(seen.iter().all(|&(_, total, _)| total == 12));
}
