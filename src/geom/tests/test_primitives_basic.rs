use std::f64::consts::{PI, TAU};

use crate::geom::{
    PrimitiveError, Vec3, box_mesh, cylinder, extrude_polygon, regular_prism, rounded_rectangle,
    rounded_rectangle_outline, torus, uv_sphere,
};

#[test]
fn cylinder_is_centred_polygonal_prism() {
    let sections = 32;
    let mesh = cylinder(2.0, 5.0, sections).expect("cylinder");
    assert!(mesh.is_watertight());
    assert_eq!(mesh.vertex_count(), sections * 2 + 2);
    assert_eq!(mesh.triangle_count(), sections * 4);

    let n = sections as f64;
    let expected = 0.5 * n * 4.0 * (TAU / n).sin() * 5.0;
    assert!((mesh.volume() - expected).abs() < 1e-9);

    let bounds = mesh.bounds().expect("bounds");
    assert!((bounds.min.z + 2.5).abs() < 1e-12);
    assert!((bounds.max.z - 2.5).abs() < 1e-12);
    assert!((bounds.max.x - 2.0).abs() < 1e-12);
}

#[test]
fn hexagonal_prism_area_matches_circumradius() {
    let mesh = regular_prism(6, 5.0, 4.0).expect("prism");
    assert!(mesh.is_watertight());
    let area = 1.5 * 3.0_f64.sqrt() * 25.0;
    assert!((mesh.volume() - area * 4.0).abs() < 1e-9);
}

#[test]
fn torus_volume_approaches_pappus() {
    let mesh = torus(4.0, 1.0, 96, 48).expect("torus");
    assert!(mesh.is_watertight());
    let exact = 2.0 * PI * PI * 4.0;
    let volume = mesh.volume();
    assert!(volume < exact);
    assert!((exact - volume) / exact < 0.01);

    assert!(matches!(
        torus(1.0, 2.0, 16, 8),
        Err(PrimitiveError::InvalidDimension { .. })
    ));
}

#[test]
fn sphere_is_closed() {
    let mesh = uv_sphere(3.0, 24, 12).expect("sphere");
    assert!(mesh.is_watertight());
    let exact = 4.0 / 3.0 * PI * 27.0;
    assert!(mesh.volume() < exact && mesh.volume() > exact * 0.95);
}

#[test]
fn extrusion_with_hole_subtracts_hole_area() {
    let outline = [[-2.0, -2.0], [2.0, -2.0], [2.0, 2.0], [-2.0, 2.0]];
    // Clockwise on purpose; loop orientation is normalised.
    let hole = vec![[-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0], [1.0, -1.0]];
    let mesh = extrude_polygon(&outline, &[hole], 1.5).expect("extrusion");
    assert!(mesh.is_watertight());
    assert!((mesh.volume() - 12.0 * 1.5).abs() < 1e-12);

    let bounds = mesh.bounds().expect("bounds");
    assert_eq!(bounds.min.z, 0.0);
    assert_eq!(bounds.max.z, 1.5);
}

#[test]
fn extrusion_rejects_degenerate_outline() {
    assert_eq!(
        extrude_polygon(&[[0.0, 0.0], [1.0, 0.0], [1.0, 0.0]], &[], 1.0).unwrap_err(),
        PrimitiveError::DegenerateOutline
    );
    assert!(matches!(
        extrude_polygon(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]], &[], -1.0),
        Err(PrimitiveError::InvalidDimension { .. })
    ));
}

#[test]
fn rounded_rectangle_has_rounded_corners() {
    let outline = rounded_rectangle_outline(40.0, 20.0, 5.0, 8);
    assert_eq!(outline.len(), 4 * 9);
    for p in &outline {
        assert!(p[0].abs() <= 20.0 + 1e-12);
        assert!(p[1].abs() <= 10.0 + 1e-12);
    }

    let mesh = rounded_rectangle(40.0, 20.0, 5.0, 3.0, 8).expect("plate");
    assert!(mesh.is_watertight());
    let sharp = 40.0 * 20.0 * 3.0;
    let round = (40.0 * 20.0 - (4.0 - PI) * 25.0) * 3.0;
    let volume = mesh.volume();
    assert!(volume < sharp);
    assert!(volume > round - 2.0);

    // Zero radius degrades to a plain box.
    let square = rounded_rectangle_outline(2.0, 2.0, 0.0, 8);
    assert_eq!(square.len(), 4);
}

#[test]
fn primitives_reject_invalid_dimensions() {
    assert!(matches!(
        box_mesh(Vec3::new(1.0, 0.0, 1.0)),
        Err(PrimitiveError::InvalidDimension { .. })
    ));
    assert!(matches!(
        cylinder(1.0, f64::NAN, 16),
        Err(PrimitiveError::InvalidDimension { name: "height", .. })
    ));
    assert_eq!(
        cylinder(1.0, 1.0, 2).unwrap_err(),
        PrimitiveError::TooFewSegments {
            name: "sections",
            min: 3,
            got: 2
        }
    );
}
