use crate::geom::{
    GeomMesh, Point3, Tolerance, box_from_bounds, fill_holes, fix_inversion, fix_normals,
    fix_winding, validate_and_repair_mesh_with_report,
};

fn cube() -> GeomMesh {
    box_from_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0)).expect("cube")
}

fn without_triangles(mesh: &GeomMesh, drop: std::ops::Range<usize>) -> GeomMesh {
    let indices = mesh
        .indices
        .chunks_exact(3)
        .enumerate()
        .filter(|(t, _)| !drop.contains(t))
        .flat_map(|(_, tri)| tri.iter().copied())
        .collect();
    GeomMesh::new(mesh.positions.clone(), indices)
}

#[test]
fn fix_winding_flips_single_bad_triangle() {
    let mut mesh = cube();
    mesh.indices.swap(5 * 3 + 1, 5 * 3 + 2);
    assert!(!mesh.diagnostics().is_watertight());

    assert_eq!(fix_winding(&mut mesh), 1);
    assert!(mesh.is_watertight());
    assert!((mesh.volume() - 8.0).abs() < 1e-12);
}

#[test]
fn fix_inversion_turns_mesh_outward() {
    let mut mesh = cube();
    mesh.flip_winding();
    assert!(mesh.volume() < 0.0);

    assert!(fix_inversion(&mut mesh));
    assert!(mesh.volume() > 0.0);
    assert!(!fix_inversion(&mut mesh));
}

#[test]
fn fix_normals_attaches_outward_normals() {
    let mut mesh = GeomMesh::new(cube().positions, cube().indices);
    mesh.flip_winding();
    fix_normals(&mut mesh);

    let normals = mesh.normals.as_ref().expect("normals");
    assert_eq!(normals.len(), mesh.vertex_count());
    // Corner (2, 2, 2) points away from the centre.
    let corner = mesh
        .positions
        .iter()
        .position(|p| *p == [2.0, 2.0, 2.0])
        .expect("corner");
    let n = normals[corner];
    assert!(n[0] > 0.0 && n[1] > 0.0 && n[2] > 0.0);
}

#[test]
fn fill_holes_closes_missing_face() {
    // Triangles 2 and 3 are the +z face.
    let mut mesh = without_triangles(&cube(), 2..4);
    assert!(!mesh.is_watertight());

    assert_eq!(fill_holes(&mut mesh), 1);
    assert!(mesh.is_watertight());
    assert_eq!(mesh.triangle_count(), 12);
    assert!((mesh.volume() - 8.0).abs() < 1e-12);
}

#[test]
fn repair_report_tracks_each_stage() {
    let mut open = without_triangles(&cube(), 2..4);
    open.flip_winding();

    let (repaired, report) = validate_and_repair_mesh_with_report(&open, Tolerance::default_geom());
    assert!(!report.watertight_before);
    assert!(!report.watertight_after_fixes);
    assert!(report.watertight_after);
    assert_eq!(report.filled_hole_count, 1);
    assert!(report.diagnostics.is_watertight());
    assert!((repaired.volume() - 8.0).abs() < 1e-12);
    assert!(repaired.normals.is_some());
}

#[test]
fn repair_fills_holes_then_merges_duplicates() {
    // Open top plus an unused copy of every corner.
    let mut open = without_triangles(&cube(), 2..4);
    let copies = open.positions.clone();
    open.positions.extend_from_slice(&copies);
    assert_eq!(open.vertex_count(), 16);

    let (repaired, report) = validate_and_repair_mesh_with_report(&open, Tolerance::WELD);
    assert_eq!(report.filled_hole_count, 1);
    assert_eq!(report.merged_vertex_count, 8);
    assert!(report.watertight_after);
    assert_eq!(repaired.vertex_count(), 8);
    assert_eq!(repaired.triangle_count(), 12);
    assert!((repaired.volume() - 8.0).abs() < 1e-12);
}

#[test]
fn repair_orients_once_per_stage() {
    let mut flipped = cube();
    flipped.flip_winding();
    let (repaired, report) = validate_and_repair_mesh_with_report(&flipped, Tolerance::WELD);
    assert!(report.inverted);
    assert_eq!(report.flipped_triangle_count, 0);
    assert!(report.watertight_after_fixes);
    assert_eq!(report.filled_hole_count, 0);
    assert!((repaired.volume() - 8.0).abs() < 1e-12);
}

#[test]
fn repair_leaves_closed_mesh_alone() {
    let (repaired, report) = validate_and_repair_mesh_with_report(&cube(), Tolerance::default_geom());
    assert!(report.watertight_before);
    assert!(report.watertight_after_fixes);
    assert!(!report.inverted);
    assert_eq!(report.flipped_triangle_count, 0);
    assert_eq!(report.merged_vertex_count, 0);
    assert_eq!(repaired.triangle_count(), 12);
}
