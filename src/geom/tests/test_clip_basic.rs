use crate::geom::{
    ClipError, Point3, SliceSide, Tolerance, Vec3, box_mesh, clip_to_half_space, keep_z_band,
    slice_plane_x, torus,
};

#[test]
fn clip_cube_keeps_back_side_and_caps_cut() {
    let cube = box_mesh(Vec3::new(2.0, 2.0, 2.0)).expect("cube");
    let (clipped, diag) = clip_to_half_space(
        &cube,
        Point3::new(0.0, 0.0, 0.3),
        Vec3::Z,
        Tolerance::default_geom(),
    )
    .expect("clip");

    assert!(diag.is_watertight(), "{}", diag.summary());
    assert!((clipped.volume() - 2.0 * 2.0 * 1.3).abs() < 1e-9);
    let bounds = clipped.bounds().expect("bounds");
    assert!((bounds.max.z - 0.3).abs() < 1e-12);
    assert!((bounds.min.z + 1.0).abs() < 1e-12);
}

#[test]
fn clip_on_existing_face_plane_snaps() {
    let cube = box_mesh(Vec3::new(2.0, 2.0, 2.0)).expect("cube");
    let tol = Tolerance::default_geom();

    // The whole cube is on the kept side.
    let (kept, _) = clip_to_half_space(&cube, Point3::new(0.0, 0.0, 1.0), Vec3::Z, tol).expect("clip");
    assert_eq!(kept.triangle_count(), cube.triangle_count());

    // Nothing is on the kept side.
    let (gone, _) = clip_to_half_space(&cube, Point3::new(0.0, 0.0, -1.0), Vec3::Z, tol).expect("clip");
    assert!(gone.is_empty());
}

#[test]
fn clip_torus_cap_has_hole() {
    let ring = torus(3.0, 1.0, 48, 16).expect("torus");
    let (lower, diag) = clip_to_half_space(
        &ring,
        Point3::new(0.0, 0.0, 0.25),
        Vec3::Z,
        Tolerance::default_geom(),
    )
    .expect("clip");

    assert!(diag.is_watertight(), "{}", diag.summary());
    let full = ring.volume();
    let volume = lower.volume();
    assert!(volume > full * 0.5 && volume < full);

    // The cap is an annulus: nothing near the axis.
    let near_axis = lower
        .positions
        .iter()
        .any(|p| p[0].hypot(p[1]) < 1.5);
    assert!(!near_axis);
}

#[test]
fn slice_plane_x_keeps_requested_side() {
    let cube = box_mesh(Vec3::new(2.0, 2.0, 2.0)).expect("cube");
    let tol = Tolerance::default_geom();

    let (left, _) = slice_plane_x(&cube, 0.5, SliceSide::Left, tol).expect("left");
    let bounds = left.bounds().expect("bounds");
    assert!((bounds.max.x - 0.5).abs() < 1e-12);
    assert!((left.volume() - 1.5 * 4.0).abs() < 1e-9);

    let (right, _) = slice_plane_x(&cube, 0.5, SliceSide::Right, tol).expect("right");
    let bounds = right.bounds().expect("bounds");
    assert!((bounds.min.x - 0.5).abs() < 1e-12);
    assert!((right.volume() - 0.5 * 4.0).abs() < 1e-9);
    assert!(right.is_watertight());
}

#[test]
fn keep_z_band_clips_both_ends() {
    let cube = box_mesh(Vec3::new(2.0, 2.0, 2.0)).expect("cube");
    let tol = Tolerance::default_geom();
    let (band, diag) = keep_z_band(&cube, -0.25, 0.5, tol).expect("band");
    assert!(diag.is_watertight());
    assert!((band.volume() - 4.0 * 0.75).abs() < 1e-9);

    assert_eq!(keep_z_band(&cube, 1.0, 0.0, tol).unwrap_err(), ClipError::InvalidPlane);
}

#[test]
fn clip_rejects_degenerate_plane() {
    let cube = box_mesh(Vec3::new(2.0, 2.0, 2.0)).expect("cube");
    assert_eq!(
        clip_to_half_space(&cube, Point3::ORIGIN, Vec3::ZERO, Tolerance::default_geom()).unwrap_err(),
        ClipError::InvalidPlane
    );
}
