//! Planar triangulation helpers.
//!
//! Structured ring grids (cylinders, tori, sweeps) use
//! [`triangulate_grid_wrapped`]. Everything with arbitrary planar outlines
//! (polygon extrusion caps, clip caps, hole filling) goes through spade's
//! constrained Delaunay triangulation. Boolean faces, whose outlines are fixed
//! combinatorially, are ear clipped with [`ear_clip_polygon`].

use spade::handles::FixedVertexHandle;
use spade::{ConstrainedDelaunayTriangulation, Point2, Triangulation};
use thiserror::Error;

/// Quad grid indices over `u_count * v_count` vertices stored row by row
/// (`index = v * u_count + u`).
///
/// `wrap_u` / `wrap_v` connect the last column / row back to the first. Each
/// quad `(i0, i1, i2, i3)` becomes `(i0, i1, i3)` and `(i0, i3, i2)`, which is
/// counter-clockwise seen from the side `u x v` points to.
#[must_use]
pub fn triangulate_grid_wrapped(u_count: usize, v_count: usize, wrap_u: bool, wrap_v: bool) -> Vec<u32> {
    if u_count < 2 || v_count < 2 {
        return Vec::new();
    }
    let quad_u = if wrap_u { u_count } else { u_count - 1 };
    let quad_v = if wrap_v { v_count } else { v_count - 1 };
    let mut indices = Vec::with_capacity(quad_u * quad_v * 6);

    for v in 0..quad_v {
        let v1 = (v + 1) % v_count;
        for u in 0..quad_u {
            let u1 = (u + 1) % u_count;
            let i0 = (v * u_count + u) as u32;
            let i1 = (v * u_count + u1) as u32;
            let i2 = (v1 * u_count + u) as u32;
            let i3 = (v1 * u_count + u1) as u32;
            indices.extend_from_slice(&[i0, i1, i3, i0, i3, i2]);
        }
    }
    indices
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TriangulationError {
    #[error("point {0} has non-finite or out-of-range coordinates")]
    InvalidPoint(usize),
    #[error("loop {0} has fewer than 3 vertices")]
    DegenerateLoop(usize),
}

/// Result of a constrained triangulation, in terms of the input point indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ConstrainedTriangles {
    /// Counter-clockwise triangles.
    pub triangles: Vec<[usize; 3]>,
    /// Constraint edges as they ended up in the triangulation (split where a
    /// constraint passed through another point).
    pub constraint_edges: Vec<[usize; 2]>,
    /// Constraints dropped because they crossed an earlier constraint.
    pub rejected_constraints: usize,
    /// Input points that coincided with an earlier point.
    pub merged_points: usize,
}

// spade rejects coordinates closer to zero than this.
#[allow(clippy::excessive_precision)]
const MIN_ALLOWED_VALUE: f64 = 1.793_662_034_335_766e-43;

type Cdt = ConstrainedDelaunayTriangulation<Point2<f64>>;

struct CdtBuilder {
    cdt: Cdt,
    handle_to_point: Vec<usize>,
    point_to_handle: Vec<FixedVertexHandle>,
    merged_points: usize,
    rejected_constraints: usize,
}

impl CdtBuilder {
    fn new(points: &[[f64; 2]]) -> Result<Self, TriangulationError> {
        let mut builder = Self {
            cdt: Cdt::new(),
            handle_to_point: Vec::with_capacity(points.len()),
            point_to_handle: Vec::with_capacity(points.len()),
            merged_points: 0,
            rejected_constraints: 0,
        };
        for (i, p) in points.iter().enumerate() {
            let clamp = |v: f64| if v.abs() < MIN_ALLOWED_VALUE { 0.0 } else { v };
            let handle = builder
                .cdt
                .insert(Point2::new(clamp(p[0]), clamp(p[1])))
                .map_err(|_| TriangulationError::InvalidPoint(i))?;
            if handle.index() < builder.handle_to_point.len() {
                builder.merged_points += 1;
            } else {
                builder.handle_to_point.push(i);
            }
            builder.point_to_handle.push(handle);
        }
        Ok(builder)
    }

    fn constrain(&mut self, a: usize, b: usize) {
        let (ha, hb) = (self.point_to_handle[a], self.point_to_handle[b]);
        if ha == hb {
            return;
        }
        if self.cdt.can_add_constraint(ha, hb) {
            self.cdt.add_constraint(ha, hb);
        } else {
            self.rejected_constraints += 1;
        }
    }

    fn point_of(&self, handle: FixedVertexHandle) -> usize {
        self.handle_to_point[handle.index()]
    }

    /// Keeps the faces for which `keep(face_index)` holds.
    fn finish(self, keep: impl Fn(usize) -> bool) -> ConstrainedTriangles {
        let mut out = ConstrainedTriangles {
            merged_points: self.merged_points,
            rejected_constraints: self.rejected_constraints,
            ..ConstrainedTriangles::default()
        };
        for face in self.cdt.inner_faces() {
            if !keep(face.fix().index()) {
                continue;
            }
            let [a, b, c] = face.vertices();
            out.triangles.push([
                self.point_of(a.fix()),
                self.point_of(b.fix()),
                self.point_of(c.fix()),
            ]);
        }
        for edge in self.cdt.undirected_edges() {
            if self.cdt.is_constraint_edge(edge.fix()) {
                let [a, b] = edge.vertices();
                out.constraint_edges
                    .push([self.point_of(a.fix()), self.point_of(b.fix())]);
            }
        }
        out
    }

    /// Face parity: number of constraint edges crossed on the way in from the
    /// outer face, modulo two.
    fn face_parity(&self) -> Vec<Option<bool>> {
        let mut parity = vec![None; self.cdt.num_all_faces()];
        let mut stack = Vec::new();

        for face in self.cdt.inner_faces() {
            for edge in face.adjacent_edges() {
                if edge.rev().face().as_inner().is_none() {
                    let odd = self.cdt.is_constraint_edge(edge.as_undirected().fix());
                    let slot = &mut parity[face.fix().index()];
                    if slot.is_none() {
                        *slot = Some(odd);
                        stack.push(face.fix());
                    }
                }
            }
        }

        while let Some(fixed) = stack.pop() {
            let face = self.cdt.face(fixed);
            let Some(odd) = parity[fixed.index()] else {
                continue;
            };
            for edge in face.adjacent_edges() {
                let Some(neighbor) = edge.rev().face().as_inner() else {
                    continue;
                };
                let slot = &mut parity[neighbor.fix().index()];
                if slot.is_some() {
                    continue;
                }
                let crossing = self.cdt.is_constraint_edge(edge.as_undirected().fix());
                *slot = Some(odd ^ crossing);
                stack.push(neighbor.fix());
            }
        }
        parity
    }
}

/// Triangulates the convex hull of `points` honouring `segments`.
pub(crate) fn triangulate_constrained(
    points: &[[f64; 2]],
    segments: &[[usize; 2]],
) -> Result<ConstrainedTriangles, TriangulationError> {
    let mut builder = CdtBuilder::new(points)?;
    for &[a, b] in segments {
        builder.constrain(a, b);
    }
    Ok(builder.finish(|_| true))
}

/// Triangulates the region enclosed by closed `loops` (outer boundaries and
/// holes, any orientation) using even-odd nesting.
pub(crate) fn triangulate_loops(
    points: &[[f64; 2]],
    loops: &[Vec<usize>],
) -> Result<ConstrainedTriangles, TriangulationError> {
    if let Some(bad) = loops.iter().position(|l| l.len() < 3) {
        return Err(TriangulationError::DegenerateLoop(bad));
    }
    let edges: Vec<[usize; 2]> = loops
        .iter()
        .flat_map(|ring| {
            ring.iter()
                .zip(ring.iter().cycle().skip(1))
                .map(|(&a, &b)| [a, b])
        })
        .collect();
    triangulate_even_odd(points, &edges)
}

/// Triangulates the region bounded by an unordered set of boundary edges,
/// keeping the faces enclosed by an odd number of them.
///
/// Edge direction is ignored; pinched or touching loops are fine.
pub(crate) fn triangulate_even_odd(
    points: &[[f64; 2]],
    edges: &[[usize; 2]],
) -> Result<ConstrainedTriangles, TriangulationError> {
    let mut builder = CdtBuilder::new(points)?;
    for &[a, b] in edges {
        builder.constrain(a, b);
    }
    let parity = builder.face_parity();
    Ok(builder.finish(|face| parity.get(face).copied().flatten().unwrap_or(false)))
}

fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    let pt = |p: [f64; 2]| robust::Coord { x: p[0], y: p[1] };
    robust::orient2d(pt(a), pt(b), pt(c))
}

/// Whether the open segments `p0 p1` and `q0 q1` cross at a single interior point.
fn segments_cross(p0: [f64; 2], p1: [f64; 2], q0: [f64; 2], q1: [f64; 2]) -> bool {
    let (d0, d1) = (orient(p0, p1, q0), orient(p0, p1, q1));
    let (d2, d3) = (orient(q0, q1, p0), orient(q0, q1, p1));
    d0 * d1 < 0.0 && d2 * d3 < 0.0
}

fn ring_edges(ring: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    ring.iter().copied().zip(ring.iter().copied().cycle().skip(1))
}

/// Splices `hole` into `ring` through a bridge edge travelled once each way.
fn bridge_hole(points: &[[f64; 2]], ring: &mut Vec<usize>, hole: &[usize], others: &[Vec<usize>]) {
    let Some(hi) = (0..hole.len()).max_by(|&a, &b| {
        let (pa, pb) = (points[hole[a]], points[hole[b]]);
        pa[0].total_cmp(&pb[0]).then(pa[1].total_cmp(&pb[1]))
    }) else {
        return;
    };
    let h = points[hole[hi]];
    let dist2 = |i: usize| {
        let p = points[ring[i]];
        (p[0] - h[0]).powi(2) + (p[1] - h[1]).powi(2)
    };
    let mut order: Vec<usize> = (0..ring.len()).collect();
    order.sort_by(|&a, &b| dist2(a).total_cmp(&dist2(b)));

    let visible = |oi: usize| {
        let (o_id, h_id) = (ring[oi], hole[hi]);
        let o = points[o_id];
        std::iter::once(ring.as_slice())
            .chain(std::iter::once(hole))
            .chain(others.iter().map(Vec::as_slice))
            .flat_map(ring_edges)
            .filter(|&(a, b)| a != o_id && b != o_id && a != h_id && b != h_id)
            .all(|(a, b)| !segments_cross(o, h, points[a], points[b]))
    };
    let Some(oi) = order.iter().copied().find(|&oi| visible(oi)).or(order.first().copied()) else {
        return;
    };

    let mut spliced = Vec::with_capacity(ring.len() + hole.len() + 2);
    spliced.extend_from_slice(&ring[..=oi]);
    spliced.extend(hole[hi..].iter().chain(&hole[..=hi]));
    spliced.extend_from_slice(&ring[oi..]);
    *ring = spliced;
}

fn is_ear(points: &[[f64; 2]], ring: &[usize], i: usize) -> bool {
    let n = ring.len();
    let (a, b, c) = (ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n]);
    if a == b || b == c || a == c {
        return false;
    }
    let (pa, pb, pc) = (points[a], points[b], points[c]);
    if orient(pa, pb, pc) <= 0.0 {
        return false;
    }
    ring.iter().all(|&id| {
        if id == a || id == b || id == c {
            return true;
        }
        let p = points[id];
        if p == pa || p == pb || p == pc {
            return true;
        }
        orient(pa, pb, p) < 0.0 || orient(pb, pc, p) < 0.0 || orient(pc, pa, p) < 0.0
    })
}

fn drop_repeats(ring: &mut Vec<usize>) {
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
}

/// Triangulates a polygon with holes by ear clipping.
///
/// `outer` runs counter-clockwise and every hole clockwise, all as indices
/// into `points`. Holes are bridged into the outer ring first. When no valid
/// ear exists the most convex corner is clipped anyway, so every ring edge
/// ends up in exactly one triangle whatever the coordinates.
#[must_use]
pub(crate) fn ear_clip_polygon(points: &[[f64; 2]], outer: &[usize], holes: &[Vec<usize>]) -> Vec<[usize; 3]> {
    let mut ring = outer.to_vec();
    let mut pending: Vec<&Vec<usize>> = holes.iter().filter(|h| h.len() >= 3).collect();
    let max_u = |h: &[usize]| h.iter().map(|&i| points[i][0]).fold(f64::NEG_INFINITY, f64::max);
    pending.sort_by(|a, b| max_u(b).total_cmp(&max_u(a)));
    for (n, hole) in pending.iter().enumerate() {
        let others: Vec<Vec<usize>> = pending[n + 1..].iter().map(|h| (*h).clone()).collect();
        bridge_hole(points, &mut ring, hole, &others);
    }

    let mut triangles = Vec::with_capacity(ring.len().saturating_sub(2));
    let mut cursor = 0;
    loop {
        drop_repeats(&mut ring);
        let n = ring.len();
        if n < 3 {
            break;
        }
        if n == 3 {
            if ring[0] != ring[2] {
                triangles.push([ring[0], ring[1], ring[2]]);
            }
            break;
        }
        let turn = |i: usize| {
            orient(
                points[ring[(i + n - 1) % n]],
                points[ring[i]],
                points[ring[(i + 1) % n]],
            )
        };
        let pick = (0..n)
            .map(|k| (cursor + k) % n)
            .find(|&i| is_ear(points, &ring, i))
            .or_else(|| (0..n).max_by(|&a, &b| turn(a).total_cmp(&turn(b))))
            .unwrap_or(0);
        let (a, b, c) = (ring[(pick + n - 1) % n], ring[pick], ring[(pick + 1) % n]);
        // A spike `a b a` carries a bridge out and back; it encloses nothing.
        if a != c {
            triangles.push([a, b, c]);
        }
        ring.remove(pick);
        cursor = pick.saturating_sub(1);
    }
    triangles
}

/// Twice the signed area of a closed 2D ring; positive when counter-clockwise.
#[must_use]
pub(crate) fn signed_area2(points: &[[f64; 2]], ring: &[usize]) -> f64 {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(&a, &b)| points[a][0] * points[b][1] - points[b][0] * points[a][1])
        .sum()
}
