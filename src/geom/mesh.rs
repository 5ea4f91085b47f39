use std::collections::HashMap;

use thiserror::Error;

use super::core::{BBox, Point3, Tolerance, Transform, Vec3};
use super::diagnostics::{GeomMeshDiagnostics, analyze_edge_topology};

/// Structural problems that make a mesh unusable as an operand.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("mesh indices are not a triangle list (len {0} is not a multiple of 3)")]
    NotTriangleList(usize),
    #[error("vertex {0} has non-finite coordinates")]
    NonFiniteVertex(usize),
    #[error("index {index} is out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds { index: u32, vertex_count: usize },
    #[error("normal buffer has {normals} entries for {vertices} vertices")]
    AttributeLength { normals: usize, vertices: usize },
}

/// Indexed triangle mesh.
///
/// Triangles are wound counter-clockwise when seen from outside the solid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeomMesh {
    pub positions: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
    pub normals: Option<Vec<[f64; 3]>>,
}

impl GeomMesh {
    /// Create a mesh with positions and indices only.
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            normals: None,
        }
    }

    /// Same mesh with smooth per-vertex normals attached.
    #[must_use]
    pub fn with_normals(mut self) -> Self {
        self.normals = Some(compute_smooth_normals(&self.points(), &self.indices));
        self
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns true if any vertex position contains NaN or Inf values.
    #[must_use]
    pub fn has_invalid_vertices(&self) -> bool {
        self.positions.iter().any(|p| p.iter().any(|c| !c.is_finite()))
    }

    /// Returns true if all vertex indices are within bounds.
    #[must_use]
    pub fn has_valid_indices(&self) -> bool {
        let n = self.positions.len();
        self.indices.iter().all(|&i| (i as usize) < n)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::NotTriangleList(self.indices.len()));
        }
        if let Some(bad) = self
            .positions
            .iter()
            .position(|p| p.iter().any(|c| !c.is_finite()))
        {
            return Err(MeshError::NonFiniteVertex(bad));
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.positions.len())
        {
            return Err(MeshError::IndexOutOfBounds {
                index,
                vertex_count: self.positions.len(),
            });
        }
        if let Some(normals) = &self.normals {
            if normals.len() != self.positions.len() {
                return Err(MeshError::AttributeLength {
                    normals: normals.len(),
                    vertices: self.positions.len(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn point(&self, index: u32) -> Point3 {
        Point3::from_array(self.positions[index as usize])
    }

    #[must_use]
    pub fn points(&self) -> Vec<Point3> {
        self.positions.iter().copied().map(Point3::from_array).collect()
    }

    /// Corner positions of triangle `t`, or `None` when out of range.
    #[must_use]
    pub fn triangle(&self, t: usize) -> Option<[Point3; 3]> {
        let tri = self.indices.get(t * 3..t * 3 + 3)?;
        let get = |i: u32| self.positions.get(i as usize).copied().map(Point3::from_array);
        Some([get(tri[0])?, get(tri[1])?, get(tri[2])?])
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BBox> {
        BBox::from_points(&self.points())
    }

    /// Signed enclosed volume. Positive for a closed, outward-wound mesh.
    #[must_use]
    pub fn volume(&self) -> f64 {
        signed_volume(&self.points(), &self.indices)
    }

    #[must_use]
    pub fn surface_area(&self) -> f64 {
        (0..self.triangle_count())
            .filter_map(|t| self.triangle(t))
            .map(|[a, b, c]| 0.5 * b.sub_point(a).cross(c.sub_point(a)).length())
            .sum()
    }

    /// Largest distance of any vertex from the z axis.
    #[must_use]
    pub fn max_radial_distance(&self) -> f64 {
        self.positions
            .iter()
            .map(|p| p[0].hypot(p[1]))
            .fold(0.0, f64::max)
    }

    #[must_use]
    pub fn diagnostics(&self) -> GeomMeshDiagnostics {
        GeomMeshDiagnostics::from_mesh(self)
    }

    #[must_use]
    pub fn is_watertight(&self) -> bool {
        !self.is_empty() && analyze_edge_topology(&self.indices).is_closed_manifold()
    }

    /// Applies `transform` to every vertex.
    ///
    /// Mirroring transforms (negative determinant) also reverse the winding so
    /// the result stays outward-facing.
    #[must_use]
    pub fn transformed(&self, transform: Transform) -> Self {
        let positions = self
            .positions
            .iter()
            .map(|&p| transform.apply_point(Point3::from_array(p)).to_array())
            .collect();
        let mut out = Self::new(positions, self.indices.clone());
        if transform.linear_determinant() < 0.0 {
            out.flip_winding();
        }
        if self.normals.is_some() {
            out = out.with_normals();
        }
        out
    }

    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        self.transformed(Transform::translate(offset))
    }

    #[must_use]
    pub fn scaled(&self, sx: f64, sy: f64, sz: f64) -> Self {
        self.transformed(Transform::scale(sx, sy, sz))
    }

    /// Disjoint append of `other`; no vertices are shared.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut out = Self::new(self.positions.clone(), self.indices.clone());
        out.append(other);
        out
    }

    pub fn append(&mut self, other: &Self) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|&i| i + offset));
        self.normals = None;
    }

    /// Merges vertices closer than `tol`, drops triangles that collapse and
    /// vertices that end up unused. Returns the number of merged vertices.
    pub fn merge_vertices(&mut self, tol: Tolerance) -> usize {
        let (points, indices, welded) =
            weld_mesh_vertices(self.points(), std::mem::take(&mut self.indices), tol);
        self.positions = points.into_iter().map(Point3::to_array).collect();
        self.indices = indices
            .chunks_exact(3)
            .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
            .flatten()
            .copied()
            .collect();
        self.remove_unused_vertices();
        self.normals = None;
        welded
    }

    /// Compacts the vertex buffer to the vertices referenced by triangles.
    pub fn remove_unused_vertices(&mut self) -> usize {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut positions = Vec::with_capacity(self.positions.len());
        for idx in &mut self.indices {
            let slot = &mut remap[*idx as usize];
            if *slot == u32::MAX {
                *slot = positions.len() as u32;
                positions.push(self.positions[*idx as usize]);
            }
            *idx = *slot;
        }
        let removed = self.positions.len() - positions.len();
        self.positions = positions;
        if removed > 0 {
            self.normals = None;
        }
        removed
    }

    /// Reverses the orientation of every triangle.
    pub fn flip_winding(&mut self) {
        flip_all_triangles(&mut self.indices);
        if let Some(normals) = &mut self.normals {
            for n in normals {
                *n = [-n[0], -n[1], -n[2]];
            }
        }
    }
}

/// Welds, culls, orients and attaches normals to a freshly built triangle soup.
pub(crate) fn finalize_mesh(
    points: Vec<Point3>,
    indices: Vec<u32>,
    tol: Tolerance,
) -> (GeomMesh, GeomMeshDiagnostics) {
    let (points, indices, welded_vertex_count) = weld_mesh_vertices(points, indices, tol);
    let (mut indices, degenerate_triangle_count) = cull_degenerate_triangles(&points, &indices, tol);

    let flipped_triangle_count = fix_triangle_winding_consistency(&mut indices);
    let topology = analyze_edge_topology(&indices);

    let mut warnings = Vec::new();
    if topology.is_closed_manifold() {
        let volume = signed_volume(&points, &indices);
        if volume.is_finite() && volume < 0.0 {
            flip_all_triangles(&mut indices);
            warnings.push("mesh orientation flipped (outward)".to_string());
        }
    }
    if topology.open_edge_count > 0 {
        warnings.push("mesh has open edges".to_string());
    }
    if topology.non_manifold_edge_count > 0 {
        warnings.push("mesh has non-manifold edges".to_string());
    }

    let normals = compute_smooth_normals(&points, &indices);
    let mut mesh = GeomMesh {
        positions: points.into_iter().map(Point3::to_array).collect(),
        indices,
        normals: Some(normals),
    };
    mesh.remove_unused_vertices();
    if mesh.normals.is_none() {
        mesh = mesh.with_normals();
    }

    let mut diagnostics = GeomMeshDiagnostics {
        vertex_count: mesh.vertex_count(),
        triangle_count: mesh.triangle_count(),
        welded_vertex_count,
        flipped_triangle_count,
        degenerate_triangle_count,
        warnings,
        ..GeomMeshDiagnostics::default()
    };
    diagnostics.set_topology(topology);

    (mesh, diagnostics)
}

/// Merges points within `tol` of an earlier point using a hashed grid.
///
/// Returns the deduplicated points, remapped indices and the number of
/// merged points. Non-finite points are never merged.
pub(crate) fn weld_mesh_vertices(
    points: Vec<Point3>,
    indices: Vec<u32>,
    tol: Tolerance,
) -> (Vec<Point3>, Vec<u32>, usize) {
    if !tol.eps.is_finite() || tol.eps <= 0.0 {
        return (points, indices, 0);
    }

    let inv = 1.0 / tol.eps;
    let quantize = |p: Point3| -> Option<(i64, i64, i64)> {
        if !p.is_finite() {
            return None;
        }
        let q = |v: f64| (v * inv).floor().clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Some((q(p.x), q(p.y), q(p.z)))
    };

    let mut buckets: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    let mut remap: Vec<u32> = Vec::with_capacity(points.len());
    let mut out_points: Vec<Point3> = Vec::with_capacity(points.len());

    for &p in &points {
        let key = quantize(p);
        let found = key.and_then(|(kx, ky, kz)| {
            NEIGHBOR_OFFSETS.iter().find_map(|&(dx, dy, dz)| {
                buckets.get(&(kx + dx, ky + dy, kz + dz)).and_then(|cands| {
                    cands
                        .iter()
                        .copied()
                        .find(|&c| tol.approx_eq_point3(out_points[c as usize], p))
                })
            })
        });

        let out_idx = match found {
            Some(existing) => existing,
            None => {
                let new_idx = out_points.len() as u32;
                out_points.push(p);
                if let Some(key) = key {
                    buckets.entry(key).or_default().push(new_idx);
                }
                new_idx
            }
        };
        remap.push(out_idx);
    }

    let out_indices = indices
        .into_iter()
        .map(|idx| remap.get(idx as usize).copied().unwrap_or(idx))
        .collect();

    let welded = points.len().saturating_sub(out_points.len());
    (out_points, out_indices, welded)
}

const NEIGHBOR_OFFSETS: [(i64, i64, i64); 27] = {
    let mut out = [(0, 0, 0); 27];
    let mut i = 0;
    while i < 27 {
        out[i] = ((i % 3) as i64 - 1, ((i / 3) % 3) as i64 - 1, (i / 9) as i64 - 1);
        i += 1;
    }
    out
};

pub(crate) fn cull_degenerate_triangles(
    points: &[Point3],
    indices: &[u32],
    tol: Tolerance,
) -> (Vec<u32>, usize) {
    let mut out = Vec::with_capacity(indices.len());
    let mut removed = 0usize;

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
        if i0 == i1 || i1 == i2 || i0 == i2 {
            removed += 1;
            continue;
        }

        let corners = (
            points.get(i0 as usize).copied(),
            points.get(i1 as usize).copied(),
            points.get(i2 as usize).copied(),
        );
        let (Some(a), Some(b), Some(c)) = corners else {
            removed += 1;
            continue;
        };

        let area2 = b.sub_point(a).cross(c.sub_point(a)).length_squared();
        if !area2.is_finite() || area2 <= tol.eps_squared() * tol.eps_squared() {
            removed += 1;
            continue;
        }

        out.extend_from_slice(&[i0, i1, i2]);
    }

    (out, removed)
}

/// Flood-fills orientation across manifold edges so neighbours agree.
///
/// Each connected patch keeps the orientation of its lowest-numbered
/// triangle. Returns the number of triangles flipped.
pub(crate) fn fix_triangle_winding_consistency(indices: &mut [u32]) -> usize {
    let tri_count = indices.len() / 3;
    if tri_count == 0 {
        return 0;
    }

    let mut edges: HashMap<(u32, u32), Vec<(usize, bool)>> = HashMap::with_capacity(tri_count * 3);
    for t in 0..tri_count {
        for (a, b) in tri_edges(&indices[t * 3..t * 3 + 3]) {
            edges.entry((a.min(b), a.max(b))).or_default().push((t, a <= b));
        }
    }

    let mut visited = vec![false; tri_count];
    let mut flipped = vec![false; tri_count];

    for seed in 0..tri_count {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut stack = vec![seed];

        while let Some(t) = stack.pop() {
            for (a, b) in tri_edges(&indices[t * 3..t * 3 + 3]) {
                let Some(adj) = edges.get(&(a.min(b), a.max(b))) else {
                    continue;
                };
                let [(t0, dir0), (t1, dir1)] = adj.as_slice() else {
                    continue;
                };
                let (other, dir_other) = if *t0 == t {
                    (*t1, *dir1)
                } else {
                    (*t0, *dir0)
                };
                if visited[other] {
                    continue;
                }
                // Neighbours must traverse the shared edge in opposite directions.
                visited[other] = true;
                flipped[other] = flipped[t] ^ (a <= b) ^ dir_other ^ true;
                stack.push(other);
            }
        }
    }

    let mut flipped_count = 0usize;
    for (t, &flip) in flipped.iter().enumerate() {
        if flip {
            indices.swap(t * 3 + 1, t * 3 + 2);
            flipped_count += 1;
        }
    }
    flipped_count
}

fn tri_edges(tri: &[u32]) -> [(u32, u32); 3] {
    [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])]
}

pub(crate) fn flip_all_triangles(indices: &mut [u32]) {
    for tri in indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}

pub(crate) fn signed_volume(points: &[Point3], indices: &[u32]) -> f64 {
    let mut volume = 0.0;
    for tri in indices.chunks_exact(3) {
        let (Some(a), Some(b), Some(c)) = (
            points.get(tri[0] as usize),
            points.get(tri[1] as usize),
            points.get(tri[2] as usize),
        ) else {
            continue;
        };
        volume += a.to_vec3().dot(b.to_vec3().cross(c.to_vec3()));
    }
    volume / 6.0
}

/// Area-weighted vertex normals; isolated vertices get `+z`.
pub(crate) fn compute_smooth_normals(points: &[Point3], indices: &[u32]) -> Vec<[f64; 3]> {
    let mut sums = vec![Vec3::ZERO; points.len()];

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let (Some(&a), Some(&b), Some(&c)) = (points.get(i0), points.get(i1), points.get(i2)) else {
            continue;
        };
        let n = b.sub_point(a).cross(c.sub_point(a));
        sums[i0] = sums[i0] + n;
        sums[i1] = sums[i1] + n;
        sums[i2] = sums[i2] + n;
    }

    sums.into_iter()
        .map(|n| n.normalized().unwrap_or(Vec3::Z).to_array())
        .collect()
}
