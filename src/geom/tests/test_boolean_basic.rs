use crate::geom::{
    BooleanOp, GeomMesh, Point3, PointContainment, Tolerance, Transform, Vec3, boolean_meshes,
    box_from_bounds, box_mesh, classify_point_in_mesh, cylinder, union_all,
};

fn box_a() -> GeomMesh {
    box_from_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0)).expect("box A")
}

// Overlaps the +x face of A without sharing any plane with it.
fn box_b() -> GeomMesh {
    box_from_bounds(Point3::new(1.0, 0.3, 0.45), Point3::new(3.0, 1.4, 1.3)).expect("box B")
}

fn assert_closed_solid(mesh: &GeomMesh, expected_volume: f64) {
    mesh.validate().expect("valid mesh");
    assert!(mesh.is_watertight(), "{}", mesh.diagnostics().summary());
    let volume = mesh.volume();
    assert!(
        (volume - expected_volume).abs() < 1e-9,
        "volume {volume}, expected {expected_volume}"
    );
}

#[test]
fn classify_point_in_mesh_cube_inside_outside() {
    let cube = box_a();
    let tol = Tolerance::default_geom();
    assert_eq!(
        classify_point_in_mesh(Point3::new(0.5, 0.5, 0.5), &cube, tol),
        PointContainment::Inside
    );
    assert_eq!(
        classify_point_in_mesh(Point3::new(2.5, 0.5, 0.5), &cube, tol),
        PointContainment::Outside
    );
    assert_eq!(
        classify_point_in_mesh(Point3::new(2.0, 0.5, 1.2), &cube, tol),
        PointContainment::OnSurface
    );
}

#[test]
fn boolean_union_of_overlapping_boxes() {
    let result = boolean_meshes(&box_a(), &box_b(), BooleanOp::Union, Tolerance::default_geom())
        .expect("union");
    assert_closed_solid(&result.mesh, 8.935);
    assert!(result.diagnostics.intersection_segment_count > 0);
    assert_eq!(result.diagnostics.unresolved_intersection_count, 0);
    assert!(result.diagnostics.warnings.is_empty());

    let bounds = result.mesh.bounds().expect("bounds");
    assert!((bounds.max.x - 3.0).abs() < 1e-12);
    assert!(bounds.min.x.abs() < 1e-12);
}

#[test]
fn boolean_difference_of_overlapping_boxes() {
    let result = boolean_meshes(
        &box_a(),
        &box_b(),
        BooleanOp::Difference,
        Tolerance::default_geom(),
    )
    .expect("difference");
    assert_closed_solid(&result.mesh, 7.065);

    let tol = Tolerance::default_geom();
    assert_eq!(
        classify_point_in_mesh(Point3::new(1.5, 1.0, 1.0), &result.mesh, tol),
        PointContainment::Outside
    );
    assert_eq!(
        classify_point_in_mesh(Point3::new(0.5, 1.0, 1.0), &result.mesh, tol),
        PointContainment::Inside
    );
}

#[test]
fn boolean_intersection_of_overlapping_boxes() {
    let result = boolean_meshes(
        &box_a(),
        &box_b(),
        BooleanOp::Intersection,
        Tolerance::default_geom(),
    )
    .expect("intersection");
    assert_closed_solid(&result.mesh, 0.935);
    assert!(result.diagnostics.kept_triangle_count_a > 0);
    assert!(result.diagnostics.kept_triangle_count_b > 0);
}

#[test]
fn boolean_with_empty_or_disjoint_operand_is_trivial() {
    let tol = Tolerance::default_geom();
    let a = box_a();
    let empty = GeomMesh::default();

    let union = boolean_meshes(&a, &empty, BooleanOp::Union, tol).expect("union");
    assert_closed_solid(&union.mesh, 8.0);
    let difference = boolean_meshes(&a, &empty, BooleanOp::Difference, tol).expect("difference");
    assert_closed_solid(&difference.mesh, 8.0);
    let intersection = boolean_meshes(&a, &empty, BooleanOp::Intersection, tol).expect("intersection");
    assert!(intersection.mesh.is_empty());

    let far = a.translated(Vec3::new(10.0, 0.0, 0.0));
    let union = boolean_meshes(&a, &far, BooleanOp::Union, tol).expect("disjoint union");
    assert_eq!(union.mesh.triangle_count(), a.triangle_count() * 2);
    assert!((union.mesh.volume() - 16.0).abs() < 1e-9);
    assert_eq!(union.diagnostics.candidate_pair_count, 0);
}

#[test]
fn boolean_subtracting_contained_solid_makes_cavity() {
    let outer = box_mesh(Vec3::new(4.0, 4.0, 4.0)).expect("outer");
    let inner = box_mesh(Vec3::new(2.0, 2.0, 2.0)).expect("inner");
    let result = boolean_meshes(&outer, &inner, BooleanOp::Difference, Tolerance::default_geom())
        .expect("difference");
    assert_closed_solid(&result.mesh, 64.0 - 8.0);
    assert_eq!(result.diagnostics.intersection_segment_count, 0);
    assert_eq!(result.mesh.triangle_count(), 24);
}

#[test]
fn boolean_handles_rotated_cylinders() {
    let tol = Tolerance::default_geom();
    let a = cylinder(1.0, 4.0, 24).expect("cylinder");
    let b = a.transformed(Transform::rotate_x(std::f64::consts::FRAC_PI_2).then(Transform::rotate_z(0.1)));
    let result = boolean_meshes(&a, &b, BooleanOp::Union, tol).expect("union");

    assert!(result.mesh.is_watertight(), "{}", result.mesh_diagnostics.summary());
    let volume = result.mesh.volume();
    assert!(volume > a.volume());
    assert!(volume < a.volume() * 2.0);
}

#[test]
fn union_all_accumulates_left_to_right() {
    let tol = Tolerance::default_geom();
    let meshes: Vec<GeomMesh> = (0..3)
        .map(|i| {
            let offset = f64::from(i) * 1.5;
            box_from_bounds(
                Point3::new(offset, 0.1 * f64::from(i), 0.2 * f64::from(i)),
                Point3::new(offset + 2.0, 2.0 + 0.1 * f64::from(i), 2.0 + 0.2 * f64::from(i)),
            )
            .expect("box")
        })
        .collect();
    let result = union_all(&meshes, tol).expect("union all");
    assert!(result.mesh.is_watertight());
    assert!(result.mesh.volume() > 8.0);
    assert!(result.mesh.volume() < 24.0);

    let none = union_all(&[], tol).expect("empty union");
    assert!(none.mesh.is_empty());
}

/// Area of a regular polygon with `n` sides and circumradius `r`.
fn polygon_area(n: usize, r: f64) -> f64 {
    0.5 * n as f64 * r * r * (std::f64::consts::TAU / n as f64).sin()
}

// Every primitive shares the same section angles, so the vertical edges of
// one run exactly along the cap fan edges of the other.
fn cup() -> GeomMesh {
    let tol = Tolerance::default_geom();
    let outer = cylinder(43.1, 74.5, 64)
        .expect("outer")
        .translated(Vec3::new(0.0, 0.0, 37.25));
    let cavity = cylinder(38.1, 70.0, 64)
        .expect("cavity")
        .translated(Vec3::new(0.0, 0.0, 40.0));
    let cup = boolean_meshes(&outer, &cavity, BooleanOp::Difference, tol).expect("cup");
    assert!(cup.mesh.is_watertight(), "{}", cup.mesh_diagnostics.summary());
    cup.mesh
}

#[test]
fn boolean_on_boolean_result_stays_closed() {
    let tol = Tolerance::default_geom();
    let cup = cup();
    let cup_volume = polygon_area(64, 43.1) * 74.5 - polygon_area(64, 38.1) * 69.5;
    assert!((cup.volume() - cup_volume).abs() < 1e-6 * cup_volume);

    let plug = cylinder(38.7, 6.4, 64)
        .expect("plug")
        .translated(Vec3::new(0.0, 0.0, 71.5));
    let result = boolean_meshes(&cup, &plug, BooleanOp::Difference, tol).expect("difference");
    assert!(result.mesh.is_watertight(), "{}", result.mesh_diagnostics.summary());
    assert_eq!(result.diagnostics.unresolved_intersection_count, 0);

    let removed = (polygon_area(64, 38.7) - polygon_area(64, 38.1)) * (74.5 - 68.3);
    let volume = result.mesh.volume();
    assert!(
        (volume - (cup_volume - removed)).abs() < 1e-6 * cup_volume,
        "volume {volume}, expected {}",
        cup_volume - removed
    );
}

#[test]
fn boolean_union_on_boolean_result_stays_closed() {
    let tol = Tolerance::default_geom();
    let cup = cup();
    // A ring of small pins straddling the rim, one on every other section.
    let mut pins = GeomMesh::default();
    for i in 0..32 {
        let angle = std::f64::consts::TAU * f64::from(i) / 32.0;
        let pin = cylinder(0.5, 3.0, 12).expect("pin").translated(Vec3::new(
            43.1 * angle.cos(),
            43.1 * angle.sin(),
            73.5,
        ));
        pins.append(&pin);
    }
    let result = boolean_meshes(&cup, &pins, BooleanOp::Union, tol).expect("union");
    assert!(result.mesh.is_watertight(), "{}", result.mesh_diagnostics.summary());
    assert_eq!(result.diagnostics.unresolved_intersection_count, 0);
    assert!(result.mesh.volume() > cup.volume());
}
