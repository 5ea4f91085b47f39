//! Mesh repair: orientation fixes, hole filling and vertex merging.
//!
//! [`validate_and_repair_mesh`] never fails. It logs watertightness before and
//! after each stage and always hands back a mesh, which may still be open;
//! callers decide whether to trust it as a boolean operand.

use std::collections::HashMap;

use super::diagnostics::GeomMeshDiagnostics;
use super::mesh::{GeomMesh, compute_smooth_normals, fix_triangle_winding_consistency, signed_volume};
use super::triangulation::{signed_area2, triangulate_loops};
use super::{Point3, Tolerance, Vec3};

/// What [`validate_and_repair_mesh_with_report`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    pub watertight_before: bool,
    pub watertight_after_fixes: bool,
    pub watertight_after: bool,
    pub flipped_triangle_count: usize,
    pub inverted: bool,
    pub filled_hole_count: usize,
    pub merged_vertex_count: usize,
    pub diagnostics: GeomMeshDiagnostics,
}

/// Makes adjacent triangles agree on winding. Returns the number flipped.
pub fn fix_winding(mesh: &mut GeomMesh) -> usize {
    let flipped = fix_triangle_winding_consistency(&mut mesh.indices);
    if flipped > 0 {
        mesh.normals = None;
    }
    flipped
}

/// Flips every triangle when the mesh encloses negative volume.
pub fn fix_inversion(mesh: &mut GeomMesh) -> bool {
    let volume = signed_volume(&mesh.points(), &mesh.indices);
    if volume.is_finite() && volume < 0.0 {
        mesh.flip_winding();
        true
    } else {
        false
    }
}

/// Consistent outward winding plus freshly computed vertex normals.
pub fn fix_normals(mesh: &mut GeomMesh) -> usize {
    orient_outward(mesh).0
}

/// Winding, then inversion, then normals; each exactly once.
fn orient_outward(mesh: &mut GeomMesh) -> (usize, bool) {
    let flipped = fix_winding(mesh);
    let inverted = fix_inversion(mesh);
    mesh.normals = Some(compute_smooth_normals(&mesh.points(), &mesh.indices));
    (flipped, inverted)
}

/// Closed loops of boundary half-edges, each listed in the direction the
/// existing triangles traverse it.
fn boundary_loops(indices: &[u32]) -> Vec<Vec<u32>> {
    let mut half_edges: HashMap<(u32, u32), usize> = HashMap::with_capacity(indices.len());
    for t in indices.chunks_exact(3) {
        for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            *half_edges.entry((a, b)).or_insert(0) += 1;
        }
    }

    let mut next: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut open: Vec<(u32, u32)> = half_edges
        .keys()
        .copied()
        .filter(|&(a, b)| !half_edges.contains_key(&(b, a)))
        .collect();
    open.sort_unstable();
    for &(a, b) in &open {
        next.entry(a).or_default().push(b);
    }

    let mut loops = Vec::new();
    for &(start, _) in &open {
        while next.get(&start).is_some_and(|n| !n.is_empty()) {
            let mut ring = vec![start];
            let mut current = start;
            loop {
                let Some(to) = next.get_mut(&current).and_then(Vec::pop) else {
                    ring.clear();
                    break;
                };
                if to == start {
                    break;
                }
                ring.push(to);
                current = to;
            }
            if ring.len() >= 3 {
                loops.push(ring);
            }
        }
    }
    loops
}

/// Triangles closing `ring` (boundary order), wound opposite to it.
fn cap_loop(points: &[Point3], ring: &[u32]) -> Vec<u32> {
    let reversed: Vec<u32> = ring.iter().rev().copied().collect();
    let fan = || {
        (1..reversed.len() - 1)
            .flat_map(|i| [reversed[0], reversed[i], reversed[i + 1]])
            .collect::<Vec<u32>>()
    };

    let mut normal = Vec3::ZERO;
    for (i, &a) in reversed.iter().enumerate() {
        let p = points[a as usize];
        let q = points[reversed[(i + 1) % reversed.len()] as usize];
        normal = normal
            + Vec3::new(
                (p.y - q.y) * (p.z + q.z),
                (p.z - q.z) * (p.x + q.x),
                (p.x - q.x) * (p.y + q.y),
            );
    }
    let Some(normal) = normal.normalized() else {
        return fan();
    };
    let Some(u) = normal.any_perpendicular() else {
        return fan();
    };
    let v = normal.cross(u);

    let origin = points[reversed[0] as usize];
    let flat: Vec<[f64; 2]> = reversed
        .iter()
        .map(|&i| {
            let d = points[i as usize].sub_point(origin);
            [d.dot(u), d.dot(v)]
        })
        .collect();
    let order: Vec<usize> = (0..reversed.len()).collect();
    let ccw = signed_area2(&flat, &order) > 0.0;

    match triangulate_loops(&flat, &[order]) {
        Ok(cap) if !cap.triangles.is_empty() && cap.merged_points == 0 => cap
            .triangles
            .iter()
            .flat_map(|&[a, b, c]| {
                let tri = if ccw { [a, b, c] } else { [a, c, b] };
                tri.map(|i| reversed[i])
            })
            .collect(),
        _ => fan(),
    }
}

/// Closes every boundary loop with a planar-projected cap. Returns the number
/// of loops closed.
pub fn fill_holes(mesh: &mut GeomMesh) -> usize {
    let loops = boundary_loops(&mesh.indices);
    if loops.is_empty() {
        return 0;
    }
    let points = mesh.points();
    for ring in &loops {
        let cap = cap_loop(&points, ring);
        mesh.indices.extend(cap);
    }
    mesh.normals = None;
    loops.len()
}

/// Repairs with [`Tolerance::WELD`] and discards the report.
#[must_use]
pub fn validate_and_repair_mesh(mesh: &GeomMesh) -> GeomMesh {
    validate_and_repair_mesh_with_report(mesh, Tolerance::WELD).0
}

/// Winding, inversion and normal fixes; then, if still open, hole filling
/// followed by vertex merging. Watertightness is logged at every stage.
pub fn validate_and_repair_mesh_with_report(mesh: &GeomMesh, tol: Tolerance) -> (GeomMesh, RepairReport) {
    let mut report = RepairReport {
        watertight_before: mesh.is_watertight(),
        ..RepairReport::default()
    };
    log::info!("Initial Mesh Validation:");
    log::info!("Is the mesh watertight? {}", report.watertight_before);
    log::info!("Number of faces: {}", mesh.triangle_count());
    log::info!("Number of vertices: {}", mesh.vertex_count());

    let mut repaired = mesh.clone();
    (report.flipped_triangle_count, report.inverted) = orient_outward(&mut repaired);

    report.watertight_after_fixes = repaired.is_watertight();
    log::info!("Is the mesh watertight after repair? {}", report.watertight_after_fixes);

    if !report.watertight_after_fixes {
        report.filled_hole_count = fill_holes(&mut repaired);
        report.merged_vertex_count = repaired.merge_vertices(tol);
        // Caps can join patches whose winding was never compared.
        let (flipped, inverted) = orient_outward(&mut repaired);
        report.flipped_triangle_count += flipped;
        report.inverted ^= inverted;
    }

    report.watertight_after = repaired.is_watertight();
    log::info!("Is the mesh watertight after filling holes? {}", report.watertight_after);

    let mut diagnostics = GeomMeshDiagnostics::from_mesh(&repaired);
    diagnostics.flipped_triangle_count = report.flipped_triangle_count;
    diagnostics.filled_hole_count = report.filled_hole_count;
    diagnostics.welded_vertex_count = report.merged_vertex_count;
    report.diagnostics = diagnostics;
    (repaired, report)
}
