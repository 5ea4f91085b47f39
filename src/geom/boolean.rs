//! Mesh booleans: union, difference and intersection of closed triangle meshes.
//!
//! The pipeline:
//!
//! 1. **Intersect**: candidate triangle pairs come from a BVH over the second
//!    operand. Every edge of one triangle is tested against the other triangle
//!    with [`segment_crosses_triangle`]; each crossing becomes a new vertex
//!    shared by every triangle that touches the crossing edge.
//! 2. **Split**: triangles carrying crossing points are cut along their
//!    intersection curves. The faces between the curves are traced from the
//!    topology alone and ear clipped in a parameter domain.
//! 3. **Patch**: sub-triangles of each operand are flood-filled into patches
//!    bounded by intersection segments.
//! 4. **Classify**: the largest patch of each connected group is classified
//!    against the other operand by ray casting; its neighbours alternate
//!    inside/outside across every intersection segment.
//! 5. **Keep**: patches are kept (and flipped for the subtracted operand)
//!    according to [`BooleanOp`].
//!
//! All topological decisions use exact predicates with symbolic perturbation,
//! so touching and coplanar configurations produce a consistent (if
//! arbitrary) answer instead of failing. Crossing points are computed in
//! floating point only after the topology is fixed.
//!
//! Operands are expected to be closed and outward oriented. Empty operands
//! are accepted: `A ∪ ∅ = A`, `A − ∅ = A`, `A ∩ ∅ = ∅`.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::bvh::Bvh;
use super::diagnostics::GeomMeshDiagnostics;
use super::mesh::GeomMesh;
use super::predicates::{SymPoint, segment_crosses_triangle, segment_plane_parameter};
use super::triangulation::{ear_clip_polygon, signed_area2, triangulate_constrained};
use super::{BBox, Point3, Tolerance, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BooleanOp {
    Union,
    Difference,
    Intersection,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BooleanError {
    #[error("boolean operand has non-finite vertex positions")]
    InvalidGeometry,
    #[error("boolean operand has out-of-range or incomplete triangle indices")]
    InvalidIndices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointContainment {
    Inside,
    Outside,
    OnSurface,
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanDiagnostics {
    pub op: BooleanOp,
    pub input_a_vertex_count: usize,
    pub input_a_triangle_count: usize,
    pub input_b_vertex_count: usize,
    pub input_b_triangle_count: usize,
    pub candidate_pair_count: usize,
    pub intersection_segment_count: usize,
    pub intersection_point_count: usize,
    pub split_triangle_count_a: usize,
    pub split_triangle_count_b: usize,
    pub patch_count_a: usize,
    pub patch_count_b: usize,
    pub kept_triangle_count_a: usize,
    pub kept_triangle_count_b: usize,
    /// Patches whose containment could not be decided; they are treated as outside.
    pub indeterminate_patch_count: usize,
    pub unresolved_intersection_count: usize,
    /// Inside/outside propagation hit a contradiction and fell back to
    /// classifying every patch of the group by ray casting.
    pub parity_fallback_used: bool,
    pub warnings: Vec<String>,
}

impl Default for BooleanDiagnostics {
    fn default() -> Self {
        Self {
            op: BooleanOp::Union,
            input_a_vertex_count: 0,
            input_a_triangle_count: 0,
            input_b_vertex_count: 0,
            input_b_triangle_count: 0,
            candidate_pair_count: 0,
            intersection_segment_count: 0,
            intersection_point_count: 0,
            split_triangle_count_a: 0,
            split_triangle_count_b: 0,
            patch_count_a: 0,
            patch_count_b: 0,
            kept_triangle_count_a: 0,
            kept_triangle_count_b: 0,
            indeterminate_patch_count: 0,
            unresolved_intersection_count: 0,
            parity_fallback_used: false,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanResult {
    pub mesh: GeomMesh,
    pub mesh_diagnostics: GeomMeshDiagnostics,
    pub diagnostics: BooleanDiagnostics,
}

/// A validated boolean operand with its acceleration structure.
struct Operand {
    points: Vec<Point3>,
    triangles: Vec<[u32; 3]>,
    bboxes: Vec<BBox>,
    bvh: Option<Bvh>,
    bbox: Option<BBox>,
}

fn triangle_bbox(points: &[Point3], tri: [u32; 3]) -> BBox {
    let [a, b, c] = tri.map(|i| points[i as usize]);
    BBox::new(a, a).expand_point(b).expand_point(c)
}

fn prepare_operand(mesh: &GeomMesh) -> Result<Operand, BooleanError> {
    if mesh.indices.len() % 3 != 0 {
        return Err(BooleanError::InvalidIndices);
    }
    let points = mesh.points();
    if points.iter().any(|p| !p.is_finite()) {
        return Err(BooleanError::InvalidGeometry);
    }

    let mut triangles = Vec::with_capacity(mesh.triangle_count());
    for tri in mesh.indices.chunks_exact(3) {
        if tri.iter().any(|&i| i as usize >= points.len()) {
            return Err(BooleanError::InvalidIndices);
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            continue;
        }
        triangles.push([tri[0], tri[1], tri[2]]);
    }

    let bboxes: Vec<BBox> = triangles.iter().map(|&t| triangle_bbox(&points, t)).collect();
    let bvh = Bvh::build(&bboxes);
    let bbox = bboxes.iter().copied().reduce(BBox::union);
    Ok(Operand {
        points,
        triangles,
        bboxes,
        bvh,
        bbox,
    })
}

// Fixed ray directions, deliberately off-axis.
const FIXED_RAY_DIRECTIONS: [[f64; 3]; 3] = [
    [1.0, 0.234_567_89, 0.345_678_91],
    [0.345_678_91, 1.0, 0.234_567_89],
    [0.234_567_89, 0.345_678_91, 1.0],
];
const EXTRA_RAY_DIRECTIONS: usize = 8;
const RAY_SEED: u64 = 0x7468_7265_6164;

fn ray_directions() -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(RAY_SEED);
    let mut dirs: Vec<Vec3> = FIXED_RAY_DIRECTIONS
        .iter()
        .filter_map(|&d| Vec3::from_array(d).normalized())
        .collect();
    while dirs.len() < FIXED_RAY_DIRECTIONS.len() + EXTRA_RAY_DIRECTIONS {
        let d = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        if d.length_squared() > 0.01 {
            if let Some(d) = d.normalized() {
                dirs.push(d);
            }
        }
    }
    dirs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RayVote {
    Certain(PointContainment),
    Ambiguous,
}

// Relative barycentric margin below which a ray hit counts as an edge hit.
const EDGE_HIT_EPS: f64 = 1e-9;

/// Winding number of `operand` around `origin`, counted along one ray.
fn winding_vote(origin: Point3, dir: Vec3, operand: &Operand, surface_eps: f64) -> RayVote {
    let Some(bvh) = &operand.bvh else {
        return RayVote::Certain(PointContainment::Outside);
    };

    let mut winding = 0i64;
    let mut vote = None;
    bvh.query_ray(origin, dir, -surface_eps, f64::INFINITY, |t| {
        let [a, b, c] = operand.triangles[t].map(|i| operand.points[i as usize]);
        let edge1 = b.sub_point(a);
        let edge2 = c.sub_point(a);
        let h = dir.cross(edge2);
        let det = edge1.dot(h);
        let scale = edge1.length() * edge2.length();
        let s = origin.sub_point(a);

        if !det.is_finite() || det.abs() <= 1e-12 * scale {
            // Parallel ray: only matters when the origin sits in the plane.
            let n = edge1.cross(edge2);
            let n_len = n.length();
            if n_len > 0.0 && (s.dot(n) / n_len).abs() <= surface_eps {
                vote = Some(RayVote::Ambiguous);
                return false;
            }
            return true;
        }

        let inv_det = 1.0 / det;
        let u = inv_det * s.dot(h);
        let q = s.cross(edge1);
        let v = inv_det * dir.dot(q);
        let w = 1.0 - u - v;
        if u < -EDGE_HIT_EPS || v < -EDGE_HIT_EPS || w < -EDGE_HIT_EPS {
            return true;
        }
        let dist = inv_det * edge2.dot(q);
        if dist.abs() <= surface_eps {
            vote = Some(RayVote::Certain(PointContainment::OnSurface));
            return false;
        }
        if dist < 0.0 {
            return true;
        }
        if u <= EDGE_HIT_EPS || v <= EDGE_HIT_EPS || w <= EDGE_HIT_EPS {
            vote = Some(RayVote::Ambiguous);
            return false;
        }
        // det < 0 means the ray leaves through the triangle's front side.
        winding += if det < 0.0 { 1 } else { -1 };
        true
    });

    vote.unwrap_or(RayVote::Certain(if winding != 0 {
        PointContainment::Inside
    } else {
        PointContainment::Outside
    }))
}

fn classify_point_in_operand(
    point: Point3,
    operand: &Operand,
    dirs: &[Vec3],
    tol: Tolerance,
) -> PointContainment {
    let Some(bbox) = operand.bbox else {
        return PointContainment::Outside;
    };
    if !point.is_finite() {
        return PointContainment::Indeterminate;
    }
    if !bbox.expand_tolerance(tol).contains_point(point) {
        return PointContainment::Outside;
    }

    let mut inside_votes = 0usize;
    let mut outside_votes = 0usize;
    for &dir in dirs {
        match winding_vote(point, dir, operand, tol.eps) {
            RayVote::Certain(PointContainment::OnSurface) => return PointContainment::OnSurface,
            RayVote::Certain(PointContainment::Inside) => inside_votes += 1,
            RayVote::Certain(_) => outside_votes += 1,
            RayVote::Ambiguous => continue,
        }
        if inside_votes >= 2 && outside_votes == 0 {
            return PointContainment::Inside;
        }
        if outside_votes >= 2 && inside_votes == 0 {
            return PointContainment::Outside;
        }
    }

    match inside_votes.cmp(&outside_votes) {
        std::cmp::Ordering::Greater => PointContainment::Inside,
        std::cmp::Ordering::Less => PointContainment::Outside,
        std::cmp::Ordering::Equal => PointContainment::Indeterminate,
    }
}

/// Classify a point against a closed triangle mesh.
///
/// Uses the winding number along several rays, so self-overlapping but
/// consistently oriented meshes are handled. Points within `tol` of the
/// surface are [`PointContainment::OnSurface`].
#[must_use]
pub fn classify_point_in_mesh(point: Point3, mesh: &GeomMesh, tol: Tolerance) -> PointContainment {
    let Ok(operand) = prepare_operand(mesh) else {
        return PointContainment::Indeterminate;
    };
    classify_point_in_operand(point, &operand, &ray_directions(), tol)
}

/// Smallest gap kept between consecutive crossing parameters on one edge.
const MIN_PARAM_GAP: f64 = 1e-12;
/// Smallest barycentric weight of an interior crossing point.
const MIN_BARYCENTRIC: f64 = 1e-9;

/// Both operands' triangles in one index space plus everything the
/// intersection pass discovered.
struct Arrangement {
    points: Vec<Point3>,
    original_count: usize,
    triangles: Vec<[u32; 3]>,
    a_triangle_count: usize,
    /// (edge low id, edge high id, triangle) -> crossing point.
    crossings: HashMap<(u32, u32, u32), Option<u32>>,
    /// Undirected edge -> (parameter from low to high id, point).
    edge_points: HashMap<(u32, u32), Vec<(f64, u32)>>,
    interior_points: HashMap<usize, Vec<u32>>,
    segments: HashMap<usize, Vec<[u32; 2]>>,
    segment_count: usize,
    unresolved: usize,
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

impl Arrangement {
    fn new(a: &Operand, b: &Operand) -> Self {
        let offset = a.points.len() as u32;
        let mut points = a.points.clone();
        points.extend_from_slice(&b.points);
        let mut triangles = a.triangles.clone();
        triangles.extend(b.triangles.iter().map(|t| t.map(|i| i + offset)));
        Self {
            original_count: points.len(),
            points,
            triangles,
            a_triangle_count: a.triangles.len(),
            crossings: HashMap::new(),
            edge_points: HashMap::new(),
            interior_points: HashMap::new(),
            segments: HashMap::new(),
            segment_count: 0,
            unresolved: 0,
        }
    }

    fn is_from_a(&self, tri: usize) -> bool {
        tri < self.a_triangle_count
    }

    fn sym(&self, id: u32) -> SymPoint {
        SymPoint::new(id, self.points[id as usize])
    }

    fn crossing(&mut self, lo: u32, hi: u32, tri: usize) -> Option<u32> {
        let key = (lo, hi, tri as u32);
        if let Some(&hit) = self.crossings.get(&key) {
            return hit;
        }

        let corners = self.triangles[tri];
        let crosses = segment_crosses_triangle(self.sym(lo), self.sym(hi), corners.map(|i| self.sym(i)));
        let hit = crosses.then(|| {
            let (p, q) = (self.points[lo as usize], self.points[hi as usize]);
            let t = segment_plane_parameter(p, q, corners.map(|i| self.points[i as usize]));
            let id = self.points.len() as u32;
            self.points.push(p.lerp(q, t));
            self.edge_points.entry((lo, hi)).or_default().push((t, id));
            self.interior_points.entry(tri).or_default().push(id);
            id
        });
        self.crossings.insert(key, hit);
        hit
    }

    fn intersect_pair(&mut self, ta: usize, tb: usize) {
        let mut hits = Vec::with_capacity(2);
        for (edge_tri, other) in [(ta, tb), (tb, ta)] {
            let tri = self.triangles[edge_tri];
            for k in 0..3 {
                let (lo, hi) = edge_key(tri[k], tri[(k + 1) % 3]);
                if let Some(id) = self.crossing(lo, hi, other) {
                    hits.push(id);
                }
            }
        }
        match hits.as_slice() {
            [] => {}
            &[p, q] => {
                self.segments.entry(ta).or_default().push([p, q]);
                self.segments.entry(tb).or_default().push([p, q]);
                self.segment_count += 1;
            }
            _ => {
                log::warn!(
                    "boolean: triangle pair ({ta}, {tb}) has {} crossings, expected 0 or 2",
                    hits.len()
                );
                self.unresolved += 1;
            }
        }
    }

    fn order_edge_points(&mut self) {
        for list in self.edge_points.values_mut() {
            list.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut prev = 0.0;
            for (t, _) in list.iter_mut() {
                *t = t.max(prev + MIN_PARAM_GAP);
                prev = *t;
            }
        }
    }

    fn needs_split(&self, tri: usize) -> bool {
        if self.segments.contains_key(&tri) || self.interior_points.contains_key(&tri) {
            return true;
        }
        let t = self.triangles[tri];
        (0..3).any(|k| self.edge_points.contains_key(&edge_key(t[k], t[(k + 1) % 3])))
    }

    /// Corners, edge points and interior points of `tri` in its parameter
    /// domain.
    ///
    /// The triangle maps to `(0,0) (1,0) (1,1)`, which keeps points on each
    /// edge exactly collinear. Edge points keep the order shared with the
    /// neighbour across the edge.
    fn layout(&self, tri: usize) -> TriangleLayout {
        let corners = self.triangles[tri];
        let mut layout = TriangleLayout::default();
        for k in 0..3 {
            let (p, q) = (corners[k], corners[(k + 1) % 3]);
            layout.boundary.push(layout.ids.len());
            layout.ids.push(p);
            layout.uv.push(CORNER_UV[k]);
            let Some(list) = self.edge_points.get(&edge_key(p, q)) else {
                continue;
            };
            let mut along: Vec<(f64, u32)> = list
                .iter()
                .map(|&(t, id)| (if p < q { t } else { 1.0 - t }, id))
                .collect();
            if p > q {
                along.reverse();
            }
            for (s, id) in along {
                let s = s.clamp(MIN_PARAM_GAP, 1.0 - MIN_PARAM_GAP);
                layout.boundary.push(layout.ids.len());
                layout.ids.push(id);
                layout.uv.push(match k {
                    0 => [s, 0.0],
                    1 => [1.0, s],
                    _ => [1.0 - s, 1.0 - s],
                });
            }
        }

        let corner_points = corners.map(|i| self.points[i as usize]);
        for &id in self.interior_points.get(&tri).into_iter().flatten() {
            // Placement only shapes the triangles, never the topology.
            let [_, l1, l2] = barycentric(self.points[id as usize], corner_points).unwrap_or([1.0 / 3.0; 3]);
            layout.ids.push(id);
            layout.uv.push([l1 + l2, l2]);
        }

        let local: HashMap<u32, usize> = layout.ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        layout.segments = self
            .segments
            .get(&tri)
            .into_iter()
            .flatten()
            .filter_map(|&[a, b]| Some([*local.get(&a)?, *local.get(&b)?]))
            .collect();
        layout
    }

    /// Re-triangulates `tri` along its intersection curves.
    ///
    /// Faces are traced from the boundary and the segments alone, so shared
    /// edges match their twins however the crossing points land numerically.
    /// Returns the number of constraints that could not be honoured.
    fn split_triangle(
        &self,
        tri: usize,
        out: &mut Vec<SubTriangle>,
        barriers: &mut HashSet<(u32, u32)>,
    ) -> usize {
        let layout = self.layout(tri);
        let Some(faces) = layout.trace_faces() else {
            log::debug!("boolean: irregular intersection curves on triangle {tri}, using CDT split");
            return self.split_triangle_cdt(tri, &layout, out, barriers);
        };

        for face in &faces {
            for t in ear_clip_polygon(&layout.uv, &face.outer, &face.holes) {
                out.push(SubTriangle {
                    ids: t.map(|i| layout.ids[i]),
                    source: tri,
                });
            }
        }
        for &[a, b] in &layout.segments {
            barriers.insert(edge_key(layout.ids[a], layout.ids[b]));
        }
        0
    }

    /// Constrained Delaunay split for curves that do not form clean chords
    /// and loops (a pair left unresolved, an open operand).
    fn split_triangle_cdt(
        &self,
        tri: usize,
        layout: &TriangleLayout,
        out: &mut Vec<SubTriangle>,
        barriers: &mut HashSet<(u32, u32)>,
    ) -> usize {
        let Ok(result) = triangulate_constrained(&layout.uv, &layout.segments) else {
            out.push(SubTriangle {
                ids: self.triangles[tri],
                source: tri,
            });
            return layout.segments.len().max(1);
        };
        for t in &result.triangles {
            out.push(SubTriangle {
                ids: t.map(|i| layout.ids[i]),
                source: tri,
            });
        }
        for &[a, b] in &result.constraint_edges {
            barriers.insert(edge_key(layout.ids[a], layout.ids[b]));
        }
        result.rejected_constraints + result.merged_points
    }
}

const CORNER_UV: [[f64; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];

/// One region of a split triangle: a counter-clockwise outline and clockwise
/// holes, as indices into [`TriangleLayout::ids`].
#[derive(Debug, Default)]
struct Face {
    outer: Vec<usize>,
    holes: Vec<Vec<usize>>,
}

#[derive(Debug, Default)]
struct TriangleLayout {
    ids: Vec<u32>,
    uv: Vec<[f64; 2]>,
    /// Counter-clockwise from the first corner.
    boundary: Vec<usize>,
    segments: Vec<[usize; 2]>,
}

impl TriangleLayout {
    /// Faces of the planar graph made of the boundary and the segments.
    ///
    /// On a closed operand every edge point ends exactly one segment and every
    /// interior point joins exactly two, so the curves are chords between
    /// boundary points plus closed loops. Chords are followed combinatorially;
    /// only loop nesting looks at coordinates. `None` when the degrees say
    /// otherwise.
    fn trace_faces(&self) -> Option<Vec<Face>> {
        let n = self.ids.len();
        let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &[a, b] in &self.segments {
            if a == b {
                return None;
            }
            adjacent[a].push(b);
            adjacent[b].push(a);
        }
        let mut position = vec![usize::MAX; n];
        for (pos, &i) in self.boundary.iter().enumerate() {
            position[i] = pos;
        }
        let on_boundary = |i: usize| position[i] != usize::MAX;
        for (i, adj) in adjacent.iter().enumerate() {
            let expected = if on_boundary(i) { adj.len() <= 1 } else { adj.len() == 2 };
            if !expected {
                return None;
            }
        }

        // Walks from `from` through `next` along degree-two points until a
        // boundary point or `stop` is reached.
        let walk = |from: usize, next: usize, stop: usize, visited: &mut Vec<bool>| -> Option<Vec<usize>> {
            let mut path = vec![from];
            let (mut prev, mut cur) = (from, next);
            while !on_boundary(cur) && cur != stop {
                if visited[cur] || path.len() > n {
                    return None;
                }
                visited[cur] = true;
                path.push(cur);
                let adj = &adjacent[cur];
                let after = if adj[0] == prev { adj[1] } else { adj[0] };
                (prev, cur) = (cur, after);
            }
            path.push(cur);
            Some(path)
        };

        let mut visited = vec![false; n];
        let mut chords: Vec<Option<Vec<usize>>> = vec![None; n];
        for &b in &self.boundary {
            if adjacent[b].len() != 1 || chords[b].is_some() {
                continue;
            }
            let path = walk(b, adjacent[b][0], usize::MAX, &mut visited)?;
            let end = *path.last()?;
            if end == b {
                return None;
            }
            chords[end] = Some(path.iter().rev().copied().collect());
            chords[b] = Some(path);
        }

        let mut loops: Vec<Vec<usize>> = Vec::new();
        for start in 0..n {
            if on_boundary(start) || visited[start] {
                continue;
            }
            visited[start] = true;
            let mut path = walk(start, adjacent[start][0], start, &mut visited)?;
            path.pop();
            if signed_area2(&self.uv, &path) < 0.0 {
                path.reverse();
            }
            loops.push(path);
        }

        let m = self.boundary.len();
        let mut used = vec![false; m];
        let mut faces = Vec::new();
        for start in 0..m {
            let mut outer = Vec::new();
            let mut at = start;
            while !used[at] {
                used[at] = true;
                let next = (at + 1) % m;
                let arrive = self.boundary[next];
                at = match &chords[arrive] {
                    Some(path) => {
                        outer.push(self.boundary[at]);
                        outer.extend_from_slice(&path[..path.len() - 1]);
                        position[*path.last()?]
                    }
                    None => {
                        outer.push(self.boundary[at]);
                        next
                    }
                };
            }
            if outer.len() >= 3 {
                faces.push(Face { outer, holes: Vec::new() });
            }
        }

        // Each loop bounds a face of its own and is a hole in the smallest
        // region around it.
        let chord_faces = faces.len();
        faces.extend(loops.iter().map(|l| Face {
            outer: l.clone(),
            holes: Vec::new(),
        }));
        let areas: Vec<f64> = faces.iter().map(|f| signed_area2(&self.uv, &f.outer).abs()).collect();
        for (k, ring) in loops.iter().enumerate() {
            let own = chord_faces + k;
            let witness = self.uv[ring[0]];
            let host = (0..faces.len())
                .filter(|&f| f != own && point_in_ring(&self.uv, &faces[f].outer, witness))
                .min_by(|&a, &b| areas[a].total_cmp(&areas[b]))
                .or_else(|| (0..chord_faces).max_by(|&a, &b| areas[a].total_cmp(&areas[b])))?;
            faces[host].holes.push(ring.iter().rev().copied().collect());
        }
        Some(faces)
    }
}

/// Crossing-number test against a closed ring.
fn point_in_ring(points: &[[f64; 2]], ring: &[usize], p: [f64; 2]) -> bool {
    let mut inside = false;
    for (&i, &j) in ring.iter().zip(ring.iter().cycle().skip(1)) {
        let (a, b) = (points[i], points[j]);
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x = a[0] + (p[1] - a[1]) / (b[1] - a[1]) * (b[0] - a[0]);
            if p[0] < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Barycentric weights of `p` projected onto triangle `tri`, clamped to be
/// strictly positive.
fn barycentric(p: Point3, tri: [Point3; 3]) -> Option<[f64; 3]> {
    let [a, b, c] = tri;
    let n = b.sub_point(a).cross(c.sub_point(a));
    let n2 = n.length_squared();
    if !n2.is_finite() || n2 <= f64::MIN_POSITIVE {
        return None;
    }
    let (pa, pb, pc) = (a.sub_point(p), b.sub_point(p), c.sub_point(p));
    let raw = [
        n.dot(pb.cross(pc)) / n2,
        n.dot(pc.cross(pa)) / n2,
        n.dot(pa.cross(pb)) / n2,
    ];
    let clamped = raw.map(|l| l.max(MIN_BARYCENTRIC));
    let sum: f64 = clamped.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return None;
    }
    Some(clamped.map(|l| l / sum))
}

#[derive(Debug, Clone, Copy)]
struct SubTriangle {
    ids: [u32; 3],
    source: usize,
}

struct Patches {
    /// Patch index per sub-triangle.
    of_triangle: Vec<usize>,
    /// Whether the patch belongs to the first operand.
    from_a: Vec<bool>,
    area: Vec<f64>,
    /// Largest sub-triangles first, used as classification samples.
    witnesses: Vec<Vec<usize>>,
    /// Patches of the same operand across an intersection segment.
    neighbors: Vec<Vec<usize>>,
    /// A patch touches itself across an intersection segment.
    self_adjacent: Vec<bool>,
}

fn triangle_area(points: &[Point3], ids: [u32; 3]) -> f64 {
    let [a, b, c] = ids.map(|i| points[i as usize]);
    0.5 * b.sub_point(a).cross(c.sub_point(a)).length()
}

fn build_patches(
    arrangement: &Arrangement,
    subs: &[SubTriangle],
    barriers: &HashSet<(u32, u32)>,
) -> Patches {
    let mut edge_users: HashMap<(u32, u32), Vec<usize>> = HashMap::with_capacity(subs.len() * 2);
    for (i, sub) in subs.iter().enumerate() {
        for k in 0..3 {
            let key = edge_key(sub.ids[k], sub.ids[(k + 1) % 3]);
            edge_users.entry(key).or_default().push(i);
        }
    }

    let from_a = |i: usize| arrangement.is_from_a(subs[i].source);
    let mut of_triangle = vec![usize::MAX; subs.len()];
    let mut patch_from_a = Vec::new();
    let mut stack = Vec::new();
    for seed in 0..subs.len() {
        if of_triangle[seed] != usize::MAX {
            continue;
        }
        let patch = patch_from_a.len();
        patch_from_a.push(from_a(seed));
        of_triangle[seed] = patch;
        stack.push(seed);
        while let Some(i) = stack.pop() {
            let ids = subs[i].ids;
            for k in 0..3 {
                let key = edge_key(ids[k], ids[(k + 1) % 3]);
                if barriers.contains(&key) {
                    continue;
                }
                for &j in &edge_users[&key] {
                    if of_triangle[j] == usize::MAX && from_a(j) == from_a(i) {
                        of_triangle[j] = patch;
                        stack.push(j);
                    }
                }
            }
        }
    }

    let patch_count = patch_from_a.len();
    let mut area = vec![0.0; patch_count];
    let mut witnesses: Vec<Vec<usize>> = vec![Vec::new(); patch_count];
    let tri_areas: Vec<f64> = subs.iter().map(|s| triangle_area(&arrangement.points, s.ids)).collect();
    for (i, &patch) in of_triangle.iter().enumerate() {
        area[patch] += tri_areas[i];
        witnesses[patch].push(i);
    }
    for list in &mut witnesses {
        list.sort_by(|&a, &b| tri_areas[b].total_cmp(&tri_areas[a]));
        list.truncate(8);
    }

    // Ordered so propagation visits neighbours the same way on every run.
    let mut neighbors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); patch_count];
    let mut self_adjacent = vec![false; patch_count];
    for key in barriers {
        let Some(users) = edge_users.get(key) else {
            continue;
        };
        for (n, &i) in users.iter().enumerate() {
            for &j in &users[n + 1..] {
                if from_a(i) != from_a(j) {
                    continue;
                }
                let (pi, pj) = (of_triangle[i], of_triangle[j]);
                if pi == pj {
                    self_adjacent[pi] = true;
                } else {
                    neighbors[pi].insert(pj);
                    neighbors[pj].insert(pi);
                }
            }
        }
    }

    Patches {
        of_triangle,
        from_a: patch_from_a,
        area,
        witnesses,
        neighbors: neighbors.into_iter().map(|s| s.into_iter().collect()).collect(),
        self_adjacent,
    }
}

struct Classifier<'a> {
    a: &'a Operand,
    b: &'a Operand,
    dirs: Vec<Vec3>,
    tol: Tolerance,
}

impl Classifier<'_> {
    /// Whether `patch` lies inside the other operand; `None` when undecided.
    fn classify_patch(
        &self,
        patches: &Patches,
        subs: &[SubTriangle],
        points: &[Point3],
        patch: usize,
    ) -> Option<bool> {
        let other = if patches.from_a[patch] { self.b } else { self.a };
        for &sub in &patches.witnesses[patch] {
            let [a, b, c] = subs[sub].ids.map(|i| points[i as usize]);
            let centroid = Point3::new(
                (a.x + b.x + c.x) / 3.0,
                (a.y + b.y + c.y) / 3.0,
                (a.z + b.z + c.z) / 3.0,
            );
            match classify_point_in_operand(centroid, other, &self.dirs, self.tol) {
                PointContainment::Inside => return Some(true),
                PointContainment::Outside => return Some(false),
                PointContainment::OnSurface | PointContainment::Indeterminate => continue,
            }
        }
        None
    }
}

/// Inside/outside per patch: ray cast the largest patch of each group, then
/// alternate across intersection segments.
fn classify_patches(
    patches: &Patches,
    subs: &[SubTriangle],
    points: &[Point3],
    classifier: &Classifier<'_>,
    diagnostics: &mut BooleanDiagnostics,
) -> Vec<bool> {
    let count = patches.from_a.len();
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|&a, &b| patches.area[b].total_cmp(&patches.area[a]));

    let mut inside: Vec<Option<bool>> = vec![None; count];
    let classify = |patch: usize, diagnostics: &mut BooleanDiagnostics| {
        classifier
            .classify_patch(patches, subs, points, patch)
            .unwrap_or_else(|| {
                diagnostics.indeterminate_patch_count += 1;
                false
            })
    };

    for &start in &order {
        if inside[start].is_some() {
            continue;
        }
        inside[start] = Some(classify(start, diagnostics));

        let mut group = vec![start];
        let mut stack = vec![start];
        let mut conflict = patches.self_adjacent[start];
        while let Some(p) = stack.pop() {
            let expected = inside[p].map(|v| !v);
            for &n in &patches.neighbors[p] {
                match inside[n] {
                    None => {
                        inside[n] = expected;
                        group.push(n);
                        stack.push(n);
                        conflict |= patches.self_adjacent[n];
                    }
                    Some(v) if Some(v) != expected => conflict = true,
                    Some(_) => {}
                }
            }
        }

        if conflict {
            diagnostics.parity_fallback_used = true;
            log::debug!("boolean: parity conflict in a group of {} patches, ray casting each", group.len());
            for &p in &group {
                inside[p] = Some(classify(p, diagnostics));
            }
        }
    }

    inside.into_iter().map(|v| v.unwrap_or(false)).collect()
}

/// `Some(flip)` when a patch with this containment survives `op`.
fn keep_patch(op: BooleanOp, from_a: bool, inside_other: bool) -> Option<bool> {
    match (op, from_a, inside_other) {
        (BooleanOp::Union, _, false) => Some(false),
        (BooleanOp::Intersection, _, true) => Some(false),
        (BooleanOp::Difference, true, false) => Some(false),
        (BooleanOp::Difference, false, true) => Some(true),
        _ => None,
    }
}

fn result_from_mesh(mesh: GeomMesh, diagnostics: BooleanDiagnostics) -> BooleanResult {
    let mut mesh_diagnostics = GeomMeshDiagnostics::from_mesh(&mesh);
    mesh_diagnostics.unresolved_intersection_count = diagnostics.unresolved_intersection_count;
    mesh_diagnostics.boolean_fallback_used = diagnostics.parity_fallback_used;
    for warning in &diagnostics.warnings {
        mesh_diagnostics.add_warning(warning.clone());
    }
    BooleanResult {
        mesh,
        mesh_diagnostics,
        diagnostics,
    }
}

/// Result when the operands cannot interact (one is empty or their bounds
/// are disjoint).
fn trivial_result(
    mesh_a: &GeomMesh,
    mesh_b: &GeomMesh,
    op: BooleanOp,
    a_empty: bool,
    b_empty: bool,
    diagnostics: BooleanDiagnostics,
) -> BooleanResult {
    let mesh = match op {
        BooleanOp::Union if a_empty => mesh_b.clone(),
        BooleanOp::Union if b_empty => mesh_a.clone(),
        BooleanOp::Union => mesh_a.merged_with(mesh_b),
        BooleanOp::Difference => mesh_a.clone(),
        BooleanOp::Intersection => GeomMesh::default(),
    };
    result_from_mesh(mesh, diagnostics)
}

/// Computes `mesh_a op mesh_b`.
///
/// Fails only on malformed input (non-finite positions, bad indices).
/// Geometric trouble is reported through the diagnostics instead.
pub fn boolean_meshes(
    mesh_a: &GeomMesh,
    mesh_b: &GeomMesh,
    op: BooleanOp,
    tol: Tolerance,
) -> Result<BooleanResult, BooleanError> {
    let a = prepare_operand(mesh_a)?;
    let b = prepare_operand(mesh_b)?;

    let mut diagnostics = BooleanDiagnostics {
        op,
        input_a_vertex_count: mesh_a.vertex_count(),
        input_a_triangle_count: mesh_a.triangle_count(),
        input_b_vertex_count: mesh_b.vertex_count(),
        input_b_triangle_count: mesh_b.triangle_count(),
        ..BooleanDiagnostics::default()
    };

    let (a_empty, b_empty) = (a.triangles.is_empty(), b.triangles.is_empty());
    let disjoint = match (a.bbox, b.bbox) {
        (Some(ba), Some(bb)) => !ba.intersects(bb),
        _ => true,
    };
    if a_empty || b_empty || disjoint {
        return Ok(trivial_result(mesh_a, mesh_b, op, a_empty, b_empty, diagnostics));
    }

    let mut arrangement = Arrangement::new(&a, &b);
    let mut pairs = Vec::new();
    if let Some(bvh) = &b.bvh {
        for (ta, &bbox) in a.bboxes.iter().enumerate() {
            bvh.query_bbox(bbox, |tb| {
                pairs.push((ta, a.triangles.len() + tb));
                true
            });
        }
    }
    diagnostics.candidate_pair_count = pairs.len();
    for &(ta, tb) in &pairs {
        arrangement.intersect_pair(ta, tb);
    }
    arrangement.order_edge_points();
    diagnostics.intersection_segment_count = arrangement.segment_count;
    diagnostics.intersection_point_count = arrangement.points.len() - arrangement.original_count;

    let mut subs = Vec::with_capacity(arrangement.triangles.len() + arrangement.segment_count * 4);
    let mut barriers = HashSet::new();
    let mut unresolved = arrangement.unresolved;
    for tri in 0..arrangement.triangles.len() {
        if arrangement.needs_split(tri) {
            if arrangement.is_from_a(tri) {
                diagnostics.split_triangle_count_a += 1;
            } else {
                diagnostics.split_triangle_count_b += 1;
            }
            unresolved += arrangement.split_triangle(tri, &mut subs, &mut barriers);
        } else {
            subs.push(SubTriangle {
                ids: arrangement.triangles[tri],
                source: tri,
            });
        }
    }
    diagnostics.unresolved_intersection_count = unresolved;

    let patches = build_patches(&arrangement, &subs, &barriers);
    diagnostics.patch_count_a = patches.from_a.iter().filter(|&&a| a).count();
    diagnostics.patch_count_b = patches.from_a.len() - diagnostics.patch_count_a;

    let classifier = Classifier {
        a: &a,
        b: &b,
        dirs: ray_directions(),
        tol,
    };
    let inside = classify_patches(&patches, &subs, &arrangement.points, &classifier, &mut diagnostics);

    let mut remap = vec![u32::MAX; arrangement.points.len()];
    let mut positions = Vec::new();
    let mut indices = Vec::with_capacity(subs.len() * 3);
    for (i, sub) in subs.iter().enumerate() {
        let patch = patches.of_triangle[i];
        let from_a = patches.from_a[patch];
        let Some(flip) = keep_patch(op, from_a, inside[patch]) else {
            continue;
        };
        if from_a {
            diagnostics.kept_triangle_count_a += 1;
        } else {
            diagnostics.kept_triangle_count_b += 1;
        }
        let ids = if flip {
            [sub.ids[0], sub.ids[2], sub.ids[1]]
        } else {
            sub.ids
        };
        for id in ids {
            let slot = &mut remap[id as usize];
            if *slot == u32::MAX {
                *slot = positions.len() as u32;
                positions.push(arrangement.points[id as usize].to_array());
            }
            indices.push(*slot);
        }
    }

    if unresolved > 0 {
        diagnostics
            .warnings
            .push(format!("boolean left {unresolved} intersection constraints unresolved"));
    }
    if diagnostics.indeterminate_patch_count > 0 {
        diagnostics.warnings.push(format!(
            "boolean could not classify {} patches; treated as outside",
            diagnostics.indeterminate_patch_count
        ));
    }
    log::debug!(
        "boolean {:?}: {} pairs, {} segments, {}+{} patches, {} triangles kept",
        op,
        diagnostics.candidate_pair_count,
        diagnostics.intersection_segment_count,
        diagnostics.patch_count_a,
        diagnostics.patch_count_b,
        indices.len() / 3
    );

    let mesh = GeomMesh::new(positions, indices).with_normals();
    Ok(result_from_mesh(mesh, diagnostics))
}

/// Unions all meshes left to right.
pub fn union_all(meshes: &[GeomMesh], tol: Tolerance) -> Result<BooleanResult, BooleanError> {
    let Some((first, rest)) = meshes.split_first() else {
        return Ok(result_from_mesh(GeomMesh::default(), BooleanDiagnostics::default()));
    };

    let mut acc = result_from_mesh(first.clone(), BooleanDiagnostics::default());
    let mut unresolved = 0;
    let mut fallback = false;
    let mut warnings = Vec::new();
    for mesh in rest {
        let next = boolean_meshes(&acc.mesh, mesh, BooleanOp::Union, tol)?;
        unresolved += next.diagnostics.unresolved_intersection_count;
        fallback |= next.diagnostics.parity_fallback_used;
        warnings.extend(next.diagnostics.warnings.iter().cloned());
        acc = next;
    }
    acc.mesh_diagnostics.unresolved_intersection_count = unresolved;
    acc.mesh_diagnostics.boolean_fallback_used = fallback;
    acc.mesh_diagnostics.warnings = warnings;
    Ok(acc)
}
