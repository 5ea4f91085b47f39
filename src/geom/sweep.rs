//! Profile sweeps.
//!
//! - **`sweep_closed_profile`**: joins a sequence of closed profile rings (one
//!   per path sample, already placed in world space) into a tube and caps both
//!   ends.
//! - **`sweep_profile_along_helix`**: places a 2D profile in the meridional
//!   plane at every sample of a helix around the z axis and sweeps it.
//!
//! # Profile Coordinate Conventions
//!
//! Helix profiles are given as `(radial, axial)` offsets from the helix point:
//! `radial` is measured outward from the z axis, `axial` along +z. A thread
//! ridge with base width `pitch` and depth `thickness` is
//! `[(0, -pitch / 2), (0, pitch / 2), (thickness, 0)]`.

use std::f64::consts::TAU;

use super::diagnostics::GeomMeshDiagnostics;
use super::mesh::{GeomMesh, finalize_mesh};
use super::triangulation::{signed_area2, triangulate_loops};
use super::{Point3, Tolerance, Vec3};

/// Which ends of an open sweep get a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepCaps {
    pub start: bool,
    pub end: bool,
}

impl SweepCaps {
    pub const NONE: Self = Self { start: false, end: false };
    pub const START: Self = Self { start: true, end: false };
    pub const END: Self = Self { start: false, end: true };
    pub const BOTH: Self = Self { start: true, end: true };
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SweepError {
    #[error("sweep inputs must be finite")]
    NonFiniteInput,
    #[error("helix {name} must be positive (got {value})")]
    InvalidHelix { name: &'static str, value: f64 },
    #[error("sweep requires at least {min} rings")]
    NotEnoughRings { min: usize },
    #[error("profile requires at least {min} unique points")]
    NotEnoughProfilePoints { min: usize },
    #[error("ring {ring} has {got} points, expected {expected}")]
    RingSizeMismatch { ring: usize, expected: usize, got: usize },
    #[error("profile is degenerate (zero area)")]
    DegenerateProfile,
    #[error("failed to triangulate cap: {0}")]
    CapTriangulation(String),
}

/// Helix parameters `t` in `[0, 2 pi turns]`: `floor(turns * samples_per_turn)`
/// evenly spaced values, at least two.
pub fn helix_parameters(turns: f64, samples_per_turn: usize) -> Result<Vec<f64>, SweepError> {
    if !turns.is_finite() || turns <= 0.0 {
        return Err(SweepError::InvalidHelix { name: "turns", value: turns });
    }
    let count = ((turns * samples_per_turn as f64).floor() as usize).max(2);
    let t_end = TAU * turns;
    Ok((0..count)
        .map(|i| t_end * i as f64 / (count - 1) as f64)
        .collect())
}

/// Points `(r cos t, r sin t, pitch / (2 pi) t)` for [`helix_parameters`].
pub fn helix_points(
    radius: f64,
    pitch: f64,
    turns: f64,
    samples_per_turn: usize,
) -> Result<Vec<Point3>, SweepError> {
    check_helix(radius, pitch)?;
    let lead = pitch / TAU;
    Ok(helix_parameters(turns, samples_per_turn)?
        .into_iter()
        .map(|t| {
            let (sin, cos) = t.sin_cos();
            Point3::new(radius * cos, radius * sin, lead * t)
        })
        .collect())
}

fn check_helix(radius: f64, pitch: f64) -> Result<(), SweepError> {
    for (name, value) in [("radius", radius), ("pitch", pitch)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(SweepError::InvalidHelix { name, value });
        }
    }
    Ok(())
}

/// Sweeps a closed `(radial, axial)` profile along a helix of `radius` and
/// `pitch` starting at angle 0 on `z = 0`.
pub fn sweep_profile_along_helix(
    profile: &[[f64; 2]],
    radius: f64,
    pitch: f64,
    turns: f64,
    samples_per_turn: usize,
    caps: SweepCaps,
    tol: Tolerance,
) -> Result<(GeomMesh, GeomMeshDiagnostics), SweepError> {
    check_helix(radius, pitch)?;
    if profile.iter().flatten().any(|v| !v.is_finite()) {
        return Err(SweepError::NonFiniteInput);
    }
    let lead = pitch / TAU;
    let rings: Vec<Vec<Point3>> = helix_parameters(turns, samples_per_turn)?
        .into_iter()
        .map(|t| {
            let (sin, cos) = t.sin_cos();
            let z = lead * t;
            profile
                .iter()
                .map(|&[radial, axial]| {
                    let r = radius + radial;
                    Point3::new(r * cos, r * sin, z + axial)
                })
                .collect()
        })
        .collect();
    sweep_closed_profile(&rings, caps, tol)
}

/// Joins consecutive closed rings with quads and caps the requested ends.
///
/// All rings must have the same number of points, listed in corresponding
/// order. The result is oriented outward when it encloses positive volume.
pub fn sweep_closed_profile(
    rings: &[Vec<Point3>],
    caps: SweepCaps,
    tol: Tolerance,
) -> Result<(GeomMesh, GeomMeshDiagnostics), SweepError> {
    if rings.len() < 2 {
        return Err(SweepError::NotEnoughRings { min: 2 });
    }
    let n = rings[0].len();
    if n < 3 {
        return Err(SweepError::NotEnoughProfilePoints { min: 3 });
    }
    for (ring, points) in rings.iter().enumerate() {
        if points.len() != n {
            return Err(SweepError::RingSizeMismatch {
                ring,
                expected: n,
                got: points.len(),
            });
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(SweepError::NonFiniteInput);
        }
    }

    let vertices: Vec<Point3> = rings.iter().flatten().copied().collect();
    let mut indices: Vec<u32> = Vec::with_capacity((rings.len() - 1) * n * 6);
    for r in 0..rings.len() - 1 {
        for i in 0..n {
            let i_next = (i + 1) % n;
            let i0 = (r * n + i) as u32;
            let i1 = (r * n + i_next) as u32;
            let i2 = ((r + 1) * n + i_next) as u32;
            let i3 = ((r + 1) * n + i) as u32;
            indices.extend_from_slice(&[i0, i1, i2, i0, i2, i3]);
        }
    }

    if caps.start || caps.end {
        let cap = cap_triangles(&rings[0])?;
        let last = rings.len() - 1;
        if caps.start {
            for [a, b, c] in &cap {
                indices.extend_from_slice(&[*a as u32, *c as u32, *b as u32]);
            }
        }
        if caps.end {
            let offset = last * n;
            for [a, b, c] in &cap {
                indices.extend_from_slice(&[(offset + a) as u32, (offset + b) as u32, (offset + c) as u32]);
            }
        }
    }

    Ok(finalize_mesh(vertices, indices, tol))
}

/// Triangulates a planar closed ring; triangles follow the ring's own order.
fn cap_triangles(ring: &[Point3]) -> Result<Vec<[usize; 3]>, SweepError> {
    if ring.len() == 3 {
        return Ok(vec![[0, 1, 2]]);
    }

    // Newell normal of the ring.
    let mut normal = Vec3::ZERO;
    for (i, p) in ring.iter().enumerate() {
        let q = ring[(i + 1) % ring.len()];
        normal = normal
            + Vec3::new(
                (p.y - q.y) * (p.z + q.z),
                (p.z - q.z) * (p.x + q.x),
                (p.x - q.x) * (p.y + q.y),
            );
    }
    let normal = normal.normalized().ok_or(SweepError::DegenerateProfile)?;
    let u = normal.any_perpendicular().ok_or(SweepError::DegenerateProfile)?;
    let v = normal.cross(u);

    let origin = ring[0];
    let flat: Vec<[f64; 2]> = ring
        .iter()
        .map(|p| {
            let d = p.sub_point(origin);
            [d.dot(u), d.dot(v)]
        })
        .collect();
    let order: Vec<usize> = (0..ring.len()).collect();
    let ccw = signed_area2(&flat, &order) > 0.0;

    let cap = triangulate_loops(&flat, &[order]).map_err(|e| SweepError::CapTriangulation(e.to_string()))?;
    Ok(cap
        .triangles
        .into_iter()
        .map(|[a, b, c]| if ccw { [a, b, c] } else { [a, c, b] })
        .collect())
}
