//! Exact orientation predicates with symbolic perturbation.
//!
//! Booleans decide every topological question (does this edge cross that
//! triangle?) with [`orient3d_sos`]. The fast path is Shewchuk's adaptive
//! `orient3d` from the `robust` crate; an exact zero is broken by evaluating
//! the determinant of the perturbed points
//!
//! ```text
//! p_i' = p_i + (eps^(2^id * M^2), eps^(2^id * M), eps^(2^id))
//! ```
//!
//! where `id` is the vertex's global index and `M` is large. The
//! perturbation is a function of the vertex id only, so all predicates of one
//! boolean see the same (non-degenerate) configuration and their answers are
//! mutually consistent: an edge through a shared triangle edge crosses exactly
//! one of the two triangles, never zero or two.

use robust::{Coord, Coord3D};

use super::Point3;

/// A vertex taking part in symbolic predicates: position plus the global id
/// that fixes its perturbation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SymPoint {
    pub id: u32,
    pub p: Point3,
}

impl SymPoint {
    pub(crate) const fn new(id: u32, p: Point3) -> Self {
        Self { id, p }
    }
}

const fn coord3(p: Point3) -> Coord3D<f64> {
    Coord3D {
        x: p.x,
        y: p.y,
        z: p.z,
    }
}

/// Adaptive-exact value with the sign of `det[b - a, c - a, d - a]`.
///
/// Positive when `d` lies on the side of plane `abc` that
/// `(b - a) x (c - a)` points to.
#[must_use]
pub(crate) fn orient3d(a: Point3, b: Point3, c: Point3, d: Point3) -> f64 {
    -robust::orient3d(coord3(a), coord3(b), coord3(c), coord3(d))
}

/// Sign (`-1` or `1`) of [`orient3d`] for the perturbed points.
///
/// Returns `0` only when two arguments share an id.
#[must_use]
pub(crate) fn orient3d_sos(pts: [SymPoint; 4]) -> i8 {
    let value = orient3d(pts[0].p, pts[1].p, pts[2].p, pts[3].p);
    if value > 0.0 {
        return 1;
    }
    if value < 0.0 {
        return -1;
    }
    for i in 0..4 {
        for j in (i + 1)..4 {
            if pts[i].id == pts[j].id {
                return 0;
            }
        }
    }
    // orient3d is the negated 4x4 determinant of rows [x, y, z, 1].
    -perturbed_det4_sign(&pts)
}

/// Sign of the lowest-order non-vanishing term of the perturbed 4x4
/// determinant `det [x_i y_i z_i 1]`.
///
/// Each term replaces a set of rows by unit rows, one per perturbed
/// coordinate. Terms are ordered by the perturbation exponent, which compares
/// like the tuple (id perturbed along x, along y, along z) with absent rows
/// first.
fn perturbed_det4_sign(pts: &[SymPoint; 4]) -> i8 {
    let mut terms: Vec<([Option<usize>; 4], [Option<u32>; 3])> = Vec::with_capacity(72);

    // Base-4 digit per row: 0..=2 perturbed column, 3 untouched.
    for code in 0..256u32 {
        let mut assignment = [None; 4];
        let mut used = [false; 3];
        let mut valid = true;
        for (row, slot) in assignment.iter_mut().enumerate() {
            let digit = ((code >> (2 * row)) & 3) as usize;
            if digit == 3 {
                continue;
            }
            if used[digit] {
                valid = false;
                break;
            }
            used[digit] = true;
            *slot = Some(digit);
        }
        if !valid || assignment.iter().all(Option::is_none) {
            continue;
        }

        let mut key = [None; 3];
        for (row, col) in assignment.iter().enumerate() {
            if let Some(col) = *col {
                key[col] = Some(pts[row].id);
            }
        }
        terms.push((assignment, key));
    }
    terms.sort_by(|a, b| a.1.cmp(&b.1));

    terms
        .iter()
        .map(|(assignment, _)| term_sign(pts, assignment))
        .find(|&s| s != 0)
        .unwrap_or(0)
}

/// Sign of the determinant with the assigned rows replaced by unit rows.
fn term_sign(pts: &[SymPoint; 4], assignment: &[Option<usize>; 4]) -> i8 {
    let mut rows: Vec<usize> = (0..4).collect();
    // Column 3 is the homogeneous column of ones.
    let mut cols: Vec<usize> = (0..4).collect();
    let mut sign = 1i8;

    for (row, col) in assignment.iter().enumerate() {
        let Some(col) = *col else {
            continue;
        };
        let (Some(ri), Some(ci)) = (
            rows.iter().position(|&r| r == row),
            cols.iter().position(|&c| c == col),
        ) else {
            return 0;
        };
        if (ri + ci) % 2 == 1 {
            sign = -sign;
        }
        rows.remove(ri);
        cols.remove(ci);
    }

    let coord = |row: usize, col: usize| pts[row].p.axis(col);
    let minor = match rows.as_slice() {
        [r0, r1, r2] => {
            let pt = |r: usize| Coord {
                x: coord(r, cols[0]),
                y: coord(r, cols[1]),
            };
            robust::orient2d(pt(*r0), pt(*r1), pt(*r2))
        }
        [r0, r1] => coord(*r0, cols[0]) - coord(*r1, cols[0]),
        [_] => 1.0,
        _ => robust::orient3d(
            coord3(pts[0].p),
            coord3(pts[1].p),
            coord3(pts[2].p),
            coord3(pts[3].p),
        ),
    };

    if minor > 0.0 {
        sign
    } else if minor < 0.0 {
        -sign
    } else {
        0
    }
}

/// Whether the open segment `pq` crosses the interior of triangle `tri`
/// under the symbolic perturbation.
#[must_use]
pub(crate) fn segment_crosses_triangle(p: SymPoint, q: SymPoint, tri: [SymPoint; 3]) -> bool {
    let [a, b, c] = tri;
    let sp = orient3d_sos([a, b, c, p]);
    let sq = orient3d_sos([a, b, c, q]);
    if sp == 0 || sq == 0 || sp == sq {
        return false;
    }
    let s1 = orient3d_sos([p, q, a, b]);
    let s2 = orient3d_sos([p, q, b, c]);
    let s3 = orient3d_sos([p, q, c, a]);
    s1 != 0 && s1 == s2 && s2 == s3
}

/// Crossing point of segment `pq` with the plane of `tri`, as a parameter
/// along `pq` clamped to `[0, 1]`. Coplanar input yields the midpoint.
#[must_use]
pub(crate) fn segment_plane_parameter(p: Point3, q: Point3, tri: [Point3; 3]) -> f64 {
    let vp = orient3d(tri[0], tri[1], tri[2], p);
    let vq = orient3d(tri[0], tri[1], tri[2], q);
    let t = vp / (vp - vq);
    if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(id: u32, x: f64, y: f64, z: f64) -> SymPoint {
        SymPoint::new(id, Point3::new(x, y, z))
    }

    #[test]
    fn test_orient3d_sign_convention() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        assert!(orient3d(a, b, c, Point3::new(0.2, 0.2, 1.0)) > 0.0);
        assert!(orient3d(a, b, c, Point3::new(0.2, 0.2, -1.0)) < 0.0);
        assert_eq!(orient3d(a, b, c, Point3::new(3.0, -2.0, 0.0)), 0.0);
    }

    #[test]
    fn test_sos_breaks_coplanar_ties_antisymmetrically() {
        let a = sp(0, 0.0, 0.0, 0.0);
        let b = sp(1, 1.0, 0.0, 0.0);
        let c = sp(2, 0.0, 1.0, 0.0);
        let d = sp(3, 1.0, 1.0, 0.0);

        let s = orient3d_sos([a, b, c, d]);
        assert_ne!(s, 0);
        assert_eq!(orient3d_sos([b, a, c, d]), -s);
        assert_eq!(orient3d_sos([a, b, d, c]), -s);
        assert_eq!(orient3d_sos([b, c, a, d]), s);
    }

    #[test]
    fn test_sos_repeated_id_is_zero() {
        let a = sp(0, 0.0, 0.0, 0.0);
        let b = sp(1, 1.0, 0.0, 0.0);
        let c = sp(2, 0.0, 1.0, 0.0);
        assert_eq!(orient3d_sos([a, b, c, a]), 0);
    }

    #[test]
    fn test_segment_crosses_triangle_interior() {
        let tri = [sp(0, 0.0, 0.0, 0.0), sp(1, 4.0, 0.0, 0.0), sp(2, 0.0, 4.0, 0.0)];
        assert!(segment_crosses_triangle(sp(3, 1.0, 1.0, -1.0), sp(4, 1.0, 1.0, 1.0), tri));
        assert!(!segment_crosses_triangle(sp(3, 5.0, 5.0, -1.0), sp(4, 5.0, 5.0, 1.0), tri));
        assert!(!segment_crosses_triangle(sp(3, 1.0, 1.0, 0.5), sp(4, 1.0, 1.0, 1.0), tri));
    }

    #[test]
    fn test_segment_through_shared_edge_crosses_exactly_one_triangle() {
        let a = sp(0, 0.0, 0.0, 0.0);
        let b = sp(1, 1.0, 0.0, 0.0);
        let c = sp(2, 0.5, 1.0, 0.0);
        let d = sp(3, 0.5, -1.0, 0.0);
        let p = sp(4, 0.5, 0.0, -1.0);
        let q = sp(5, 0.5, 0.0, 1.0);

        let first = segment_crosses_triangle(p, q, [a, b, c]);
        let second = segment_crosses_triangle(p, q, [b, a, d]);
        assert!(first ^ second);
    }

    #[test]
    fn test_segment_through_fan_center_crosses_exactly_one_triangle() {
        let center = sp(0, 0.0, 0.0, 0.0);
        let ring: Vec<SymPoint> = (0..6)
            .map(|i| {
                let angle = f64::from(i) * std::f64::consts::TAU / 6.0;
                sp(1 + i as u32, angle.cos(), angle.sin(), 0.0)
            })
            .collect();
        let p = sp(10, 0.0, 0.0, -1.0);
        let q = sp(11, 0.0, 0.0, 1.0);

        let hits = (0..6)
            .filter(|&i| segment_crosses_triangle(p, q, [center, ring[i], ring[(i + 1) % 6]]))
            .count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_segment_in_triangle_plane_is_resolved() {
        // Coplanar segment crossing a triangle edge: the perturbation decides,
        // but the answer must agree with the reversed segment.
        let tri = [sp(0, 0.0, 0.0, 0.0), sp(1, 2.0, 0.0, 0.0), sp(2, 0.0, 2.0, 0.0)];
        let p = sp(3, -1.0, 0.5, 0.0);
        let q = sp(4, 1.0, 0.5, 0.0);
        assert_eq!(
            segment_crosses_triangle(p, q, tri),
            segment_crosses_triangle(q, p, tri)
        );
    }

    #[test]
    fn test_segment_plane_parameter() {
        let tri = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let t = segment_plane_parameter(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 4.0), tri);
        assert!((t - 0.25).abs() < 1e-12);
    }
}
