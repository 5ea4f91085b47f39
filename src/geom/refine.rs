//! Conforming edge refinement.
//!
//! Edges are marked for splitting globally, so both triangles sharing an edge
//! see the same midpoint and a watertight mesh stays watertight. Each triangle
//! is then split according to how many of its edges are marked (1, 2 or 3).

use std::collections::HashMap;

use super::Point3;
use super::mesh::GeomMesh;

/// Upper bound for [`refine_long_edges`]; every pass at least halves the
/// longest edge.
pub const DEFAULT_MAX_REFINE_PASSES: usize = 12;

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

/// Splits every edge at its midpoint for which `split(p, q)` returns true,
/// repeating until no edge qualifies or `max_passes` is reached. Normals are
/// dropped when anything was split.
#[must_use]
pub fn refine_edges(
    mesh: &GeomMesh,
    max_passes: usize,
    mut split: impl FnMut(Point3, Point3) -> bool,
) -> GeomMesh {
    let mut positions = mesh.positions.clone();
    let mut indices = mesh.indices.clone();
    let mut changed = false;

    for pass in 0..max_passes {
        let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
        for tri in indices.chunks_exact(3) {
            for k in 0..3 {
                let key = edge_key(tri[k], tri[(k + 1) % 3]);
                if midpoints.contains_key(&key) {
                    continue;
                }
                let p = Point3::from_array(positions[key.0 as usize]);
                let q = Point3::from_array(positions[key.1 as usize]);
                if split(p, q) {
                    let m = p.lerp(q, 0.5);
                    midpoints.insert(key, positions.len() as u32);
                    positions.push(m.to_array());
                }
            }
        }
        if midpoints.is_empty() {
            break;
        }
        changed = true;
        log::debug!("refine pass {pass}: {} edges split", midpoints.len());

        let mut next = Vec::with_capacity(indices.len() * 2);
        for tri in indices.chunks_exact(3) {
            let v = [tri[0], tri[1], tri[2]];
            let mid: [Option<u32>; 3] =
                std::array::from_fn(|k| midpoints.get(&edge_key(v[k], v[(k + 1) % 3])).copied());
            split_triangle(v, mid, &mut next);
        }
        indices = next;
    }

    if changed {
        GeomMesh::new(positions, indices)
    } else {
        mesh.clone()
    }
}

/// Splits edges longer than `max_len`.
#[must_use]
pub fn refine_long_edges(mesh: &GeomMesh, max_len: f64) -> GeomMesh {
    if !(max_len.is_finite() && max_len > 0.0) {
        return mesh.clone();
    }
    refine_edges(mesh, DEFAULT_MAX_REFINE_PASSES, |p, q| p.distance_to(q) > max_len)
}

// `mid[k]` is the midpoint of edge `v[k] -> v[k + 1]`.
fn split_triangle(v: [u32; 3], mid: [Option<u32>; 3], out: &mut Vec<u32>) {
    let marked = mid.iter().filter(|m| m.is_some()).count();
    match marked {
        0 => out.extend_from_slice(&v),
        1 => {
            let Some(k) = mid.iter().position(Option::is_some) else {
                return;
            };
            let [a, b, c] = [v[k], v[(k + 1) % 3], v[(k + 2) % 3]];
            let Some(m) = mid[k] else { return };
            out.extend_from_slice(&[a, m, c, m, b, c]);
        }
        2 => {
            let Some(k) = mid.iter().position(Option::is_none) else {
                return;
            };
            // Rotate so the unsplit edge is c -> a.
            let r = (k + 1) % 3;
            let [a, b, c] = [v[r], v[(r + 1) % 3], v[(r + 2) % 3]];
            let (Some(mab), Some(mbc)) = (mid[r], mid[(r + 1) % 3]) else {
                return;
            };
            out.extend_from_slice(&[mab, b, mbc, a, mab, mbc, a, mbc, c]);
        }
        _ => {
            let [a, b, c] = v;
            let (Some(mab), Some(mbc), Some(mca)) = (mid[0], mid[1], mid[2]) else {
                return;
            };
            out.extend_from_slice(&[a, mab, mca, mab, b, mbc, mca, mbc, c, mab, mbc, mca]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Vec3, box_mesh};

    #[test]
    fn test_refine_keeps_box_closed() {
        let mesh = box_mesh(Vec3::new(4.0, 1.0, 1.0)).expect("box");
        let refined = refine_long_edges(&mesh, 1.0);
        assert!(refined.triangle_count() > mesh.triangle_count());
        assert!(refined.is_watertight());
        assert!((refined.volume() - 4.0).abs() < 1e-9);
        for t in 0..refined.triangle_count() {
            let [a, b, c] = refined.triangle(t).expect("triangle");
            for (p, q) in [(a, b), (b, c), (c, a)] {
                assert!(p.distance_to(q) <= 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_refine_by_axis_extent() {
        let mesh = box_mesh(Vec3::new(8.0, 1.0, 1.0)).expect("box");
        let refined = refine_edges(&mesh, 8, |p, q| (p.x - q.x).abs() > 2.0);
        assert!(refined.is_watertight());
        for t in 0..refined.triangle_count() {
            let [a, b, c] = refined.triangle(t).expect("triangle");
            for (p, q) in [(a, b), (b, c), (c, a)] {
                assert!((p.x - q.x).abs() <= 2.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_refine_noop_when_nothing_qualifies() {
        let mesh = box_mesh(Vec3::new(1.0, 1.0, 1.0)).expect("box");
        let refined = refine_long_edges(&mesh, 10.0);
        assert_eq!(refined, mesh);
        assert_eq!(refine_long_edges(&mesh, 0.0), mesh);
    }
}
