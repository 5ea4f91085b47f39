//! Half-space clipping with planar caps.
//!
//! [`clip_to_half_space`] is the one trimming primitive: it keeps the part of a
//! closed mesh on the back side of a plane and closes the cut with a flat cap,
//! so the result is closed again. Thread trimming, part slicing and z-band
//! extraction are all expressed through it.

use std::collections::{HashMap, HashSet};

use super::diagnostics::GeomMeshDiagnostics;
use super::mesh::{GeomMesh, MeshError, finalize_mesh};
use super::triangulation::triangulate_even_odd;
use super::{Point3, Tolerance, Vec3};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ClipError {
    #[error("clip plane must have a finite point and a non-zero normal")]
    InvalidPlane,
    #[error("invalid mesh: {0}")]
    InvalidMesh(#[from] MeshError),
}

/// Which side of an `x = const` plane [`slice_plane_x`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SliceSide {
    /// `x <= plane`.
    Left,
    /// `x >= plane`.
    Right,
}

/// Keeps the part of `mesh` where `(p - plane_point) · plane_normal <= 0` and
/// caps the cut.
///
/// Vertices within `tol` of the plane are snapped onto it. The cap is the
/// even-odd interior of the cut boundary, so nested cross sections (a tube
/// cut across) get holes.
pub fn clip_to_half_space(
    mesh: &GeomMesh,
    plane_point: Point3,
    plane_normal: Vec3,
    tol: Tolerance,
) -> Result<(GeomMesh, GeomMeshDiagnostics), ClipError> {
    mesh.validate()?;
    let normal = plane_normal.normalized().ok_or(ClipError::InvalidPlane)?;
    if !plane_point.is_finite() {
        return Err(ClipError::InvalidPlane);
    }

    let mut points = mesh.points();
    let distance = |p: Point3| p.sub_point(plane_point).dot(normal);
    let sides: Vec<i8> = points
        .iter()
        .map(|&p| {
            let d = distance(p);
            if d.abs() <= tol.eps {
                0
            } else if d < 0.0 {
                -1
            } else {
                1
            }
        })
        .collect();

    if !sides.iter().any(|&s| s > 0) {
        return Ok((mesh.clone(), GeomMeshDiagnostics::from_mesh(mesh)));
    }
    if !sides.iter().any(|&s| s < 0) {
        log::debug!("clip removed the whole mesh");
        return Ok((GeomMesh::default(), GeomMeshDiagnostics::default()));
    }

    for (p, &side) in points.iter_mut().zip(&sides) {
        if side == 0 {
            *p = p.sub_vec(normal * distance(*p));
        }
    }

    let mut on_plane: HashSet<u32> = (0..points.len() as u32)
        .filter(|&i| sides[i as usize] == 0)
        .collect();
    let mut crossings: HashMap<(u32, u32), u32> = HashMap::new();
    let mut indices = Vec::with_capacity(mesh.indices.len());

    for tri in mesh.indices.chunks_exact(3) {
        let s = [tri[0], tri[1], tri[2]].map(|i| sides[i as usize]);
        if s.iter().all(|&v| v == 0) || !s.iter().any(|&v| v < 0) {
            continue;
        }
        if !s.iter().any(|&v| v > 0) {
            indices.extend_from_slice(tri);
            continue;
        }

        let mut polygon: Vec<u32> = Vec::with_capacity(4);
        for k in 0..3 {
            let (a, b) = (tri[k], tri[(k + 1) % 3]);
            let (sa, sb) = (s[k], s[(k + 1) % 3]);
            if sa <= 0 {
                polygon.push(a);
            }
            if sa * sb < 0 {
                let key = (a.min(b), a.max(b));
                let id = *crossings.entry(key).or_insert_with(|| {
                    let (pa, pb) = (points[key.0 as usize], points[key.1 as usize]);
                    let (da, db) = (distance(pa), distance(pb));
                    let p = pa.lerp(pb, da / (da - db));
                    points.push(p.sub_vec(normal * distance(p)));
                    (points.len() - 1) as u32
                });
                on_plane.insert(id);
                polygon.push(id);
            }
        }
        for i in 1..polygon.len().saturating_sub(1) {
            indices.extend_from_slice(&[polygon[0], polygon[i], polygon[i + 1]]);
        }
    }

    let mut warnings = Vec::new();
    let cap = cap_cut(&points, &indices, &on_plane, plane_point, normal);
    match cap {
        Ok(cap) => indices.extend(cap),
        Err(e) => warnings.push(format!("clip cap failed: {e}")),
    }

    let (clipped, mut diagnostics) = finalize_mesh(points, indices, tol);
    for warning in warnings {
        log::warn!("{warning}");
        diagnostics.add_warning(warning);
    }
    log::debug!("clip: {}", diagnostics.summary());
    Ok((clipped, diagnostics))
}

/// Cap triangles over the open edges lying in the plane, facing `normal`.
fn cap_cut(
    points: &[Point3],
    indices: &[u32],
    on_plane: &HashSet<u32>,
    origin: Point3,
    normal: Vec3,
) -> Result<Vec<u32>, super::triangulation::TriangulationError> {
    let half_edges: HashSet<(u32, u32)> = indices
        .chunks_exact(3)
        .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
        .collect();
    let mut open: Vec<(u32, u32)> = half_edges
        .iter()
        .copied()
        .filter(|&(a, b)| !half_edges.contains(&(b, a)))
        .filter(|(a, b)| on_plane.contains(a) && on_plane.contains(b))
        .collect();
    open.sort_unstable();
    if open.is_empty() {
        return Ok(Vec::new());
    }

    let Some(u) = normal.any_perpendicular() else {
        return Ok(Vec::new());
    };
    let v = normal.cross(u);

    let mut local: HashMap<u32, usize> = HashMap::new();
    let mut ids: Vec<u32> = Vec::new();
    let mut flat: Vec<[f64; 2]> = Vec::new();
    let mut edges = Vec::with_capacity(open.len());
    for &(a, b) in &open {
        let mut slot = |id: u32| {
            *local.entry(id).or_insert_with(|| {
                let d = points[id as usize].sub_point(origin);
                ids.push(id);
                flat.push([d.dot(u), d.dot(v)]);
                ids.len() - 1
            })
        };
        let la = slot(a);
        let lb = slot(b);
        edges.push([la, lb]);
    }

    let cap = triangulate_even_odd(&flat, &edges)?;
    Ok(cap
        .triangles
        .iter()
        .flat_map(|t| t.map(|i| ids[i]))
        .collect())
}

/// Keeps the part of `mesh` on `side` of the plane `x = x`.
pub fn slice_plane_x(
    mesh: &GeomMesh,
    x: f64,
    side: SliceSide,
    tol: Tolerance,
) -> Result<(GeomMesh, GeomMeshDiagnostics), ClipError> {
    let normal = match side {
        SliceSide::Left => Vec3::X,
        SliceSide::Right => -Vec3::X,
    };
    clip_to_half_space(mesh, Point3::new(x, 0.0, 0.0), normal, tol)
}

/// Keeps `z_min <= z <= z_max`.
pub fn keep_z_band(
    mesh: &GeomMesh,
    z_min: f64,
    z_max: f64,
    tol: Tolerance,
) -> Result<(GeomMesh, GeomMeshDiagnostics), ClipError> {
    if !(z_min.is_finite() && z_max.is_finite()) || z_min > z_max {
        return Err(ClipError::InvalidPlane);
    }
    let (upper, upper_diag) = clip_to_half_space(mesh, Point3::new(0.0, 0.0, z_max), Vec3::Z, tol)?;
    let (band, mut diagnostics) = clip_to_half_space(&upper, Point3::new(0.0, 0.0, z_min), -Vec3::Z, tol)?;
    diagnostics.absorb_stage(&upper_diag);
    Ok((band, diagnostics))
}
