use std::f64::consts::TAU;

use crate::geom::{
    Point3, SweepCaps, SweepError, Tolerance, helix_parameters, helix_points,
    sweep_closed_profile, sweep_profile_along_helix,
};

fn square_ring(z: f64) -> Vec<Point3> {
    vec![
        Point3::new(-1.0, -1.0, z),
        Point3::new(1.0, -1.0, z),
        Point3::new(1.0, 1.0, z),
        Point3::new(-1.0, 1.0, z),
    ]
}

#[test]
fn sweep_straight_square_rings_with_caps() {
    let rings = vec![square_ring(0.0), square_ring(1.0), square_ring(2.0)];
    let (mesh, diag) = sweep_closed_profile(&rings, SweepCaps::BOTH, Tolerance::default_geom())
        .expect("sweep should succeed");

    // Two bands of four quads plus two quad caps.
    assert_eq!(mesh.triangle_count(), 2 * 4 * 2 + 2 * 2);
    assert_eq!(diag.open_edge_count, 0, "expected watertight mesh");
    assert_eq!(diag.non_manifold_edge_count, 0, "expected manifold mesh");
    assert!((mesh.volume() - 8.0).abs() < 1e-12);
}

#[test]
fn sweep_without_caps_is_open() {
    let rings = vec![square_ring(0.0), square_ring(1.0)];
    let (mesh, diag) = sweep_closed_profile(&rings, SweepCaps::NONE, Tolerance::default_geom())
        .expect("sweep");
    assert_eq!(mesh.triangle_count(), 8);
    assert_eq!(diag.open_edge_count, 8);

    let (_, diag) = sweep_closed_profile(&rings, SweepCaps::START, Tolerance::default_geom())
        .expect("sweep");
    assert_eq!(diag.open_edge_count, 4);
}

#[test]
fn sweep_rejects_bad_rings() {
    let tol = Tolerance::default_geom();
    assert_eq!(
        sweep_closed_profile(&[square_ring(0.0)], SweepCaps::BOTH, tol).unwrap_err(),
        SweepError::NotEnoughRings { min: 2 }
    );

    let mut short = square_ring(1.0);
    short.pop();
    assert_eq!(
        sweep_closed_profile(&[square_ring(0.0), short], SweepCaps::BOTH, tol).unwrap_err(),
        SweepError::RingSizeMismatch {
            ring: 1,
            expected: 4,
            got: 3
        }
    );

    let mut bad = square_ring(1.0);
    bad[2].x = f64::NAN;
    assert_eq!(
        sweep_closed_profile(&[square_ring(0.0), bad], SweepCaps::BOTH, tol).unwrap_err(),
        SweepError::NonFiniteInput
    );
}

#[test]
fn helix_parameters_span_all_turns() {
    let t = helix_parameters(2.5, 10).expect("parameters");
    assert_eq!(t.len(), 25);
    assert_eq!(t[0], 0.0);
    assert!((t[24] - TAU * 2.5).abs() < 1e-12);

    // Very short helices still get two samples.
    assert_eq!(helix_parameters(0.01, 10).expect("parameters").len(), 2);
    assert!(matches!(
        helix_parameters(0.0, 10),
        Err(SweepError::InvalidHelix { name: "turns", .. })
    ));
}

#[test]
fn helix_points_rise_one_pitch_per_turn() {
    let points = helix_points(5.0, 2.0, 1.0, 8).expect("helix");
    assert_eq!(points.len(), 8);
    let first = points[0];
    let last = points[points.len() - 1];
    assert!(first.distance_to(Point3::new(5.0, 0.0, 0.0)) < 1e-12);
    assert!(last.distance_to(Point3::new(5.0, 0.0, 2.0)) < 1e-9);
    for p in &points {
        assert!((p.radial_distance() - 5.0).abs() < 1e-12);
    }
    assert!(helix_points(-1.0, 2.0, 1.0, 8).is_err());
}

#[test]
fn helix_sweep_of_thread_profile_is_closed_solid() {
    let (radius, pitch, thickness, turns) = (10.0, 2.0, 1.0, 2.5);
    let profile = [[0.0, -pitch / 2.0], [0.0, pitch / 2.0], [thickness, 0.0]];
    let (mesh, diag) = sweep_profile_along_helix(
        &profile,
        radius,
        pitch,
        turns,
        24,
        SweepCaps::BOTH,
        Tolerance::default_geom(),
    )
    .expect("helix sweep");

    assert!(diag.is_watertight(), "{}", diag.summary());
    assert_eq!(diag.welded_vertex_count, 0);

    // Screw motion: profile area times the centroid's angular travel.
    let area = 0.5 * pitch * thickness;
    let expected = area * TAU * (radius + thickness / 3.0) * turns;
    let volume = mesh.volume();
    assert!(volume > 0.0);
    assert!((volume - expected).abs() / expected < 0.02, "volume {volume}, expected {expected}");

    let bounds = mesh.bounds().expect("bounds");
    assert!((bounds.min.z + pitch / 2.0).abs() < 1e-9);
    assert!((mesh.max_radial_distance() - (radius + thickness)).abs() < 1e-9);
}

#[test]
fn helix_sweep_rejects_invalid_input() {
    let profile = [[0.0, -1.0], [0.0, 1.0], [1.0, 0.0]];
    let tol = Tolerance::default_geom();
    assert!(matches!(
        sweep_profile_along_helix(&profile, 0.0, 2.0, 1.0, 10, SweepCaps::BOTH, tol),
        Err(SweepError::InvalidHelix { name: "radius", .. })
    ));
    assert!(matches!(
        sweep_profile_along_helix(&profile, 5.0, f64::NAN, 1.0, 10, SweepCaps::BOTH, tol),
        Err(SweepError::InvalidHelix { name: "pitch", .. })
    ));
    assert_eq!(
        sweep_profile_along_helix(&[[0.0, f64::INFINITY], [0.0, 1.0], [1.0, 0.0]], 5.0, 2.0, 1.0, 10, SweepCaps::BOTH, tol)
            .unwrap_err(),
        SweepError::NonFiniteInput
    );
}
