//! Closed primitive solids.
//!
//! Every primitive is built with shared vertices and outward (counter-clockwise)
//! winding, so the result is watertight as constructed. Solids of revolution
//! are centred on the origin with their axis along z, like the classic CAD
//! `cylinder`/`torus` constructors; extrusions sit on `z = 0`.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use super::mesh::{GeomMesh, finalize_mesh};
use super::triangulation::{TriangulationError, signed_area2, triangulate_grid_wrapped, triangulate_loops};
use super::{Point3, Tolerance, Vec3};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PrimitiveError {
    #[error("{name} must be finite and positive (got {value})")]
    InvalidDimension { name: &'static str, value: f64 },
    #[error("{name} needs at least {min} segments (got {got})")]
    TooFewSegments { name: &'static str, min: usize, got: usize },
    #[error("outline needs at least 3 distinct finite points")]
    DegenerateOutline,
    #[error("failed to triangulate cap: {0}")]
    CapTriangulation(#[from] TriangulationError),
}

fn positive(name: &'static str, value: f64) -> Result<f64, PrimitiveError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PrimitiveError::InvalidDimension { name, value })
    }
}

fn segments(name: &'static str, got: usize, min: usize) -> Result<usize, PrimitiveError> {
    if got >= min {
        Ok(got)
    } else {
        Err(PrimitiveError::TooFewSegments { name, min, got })
    }
}

fn finish(points: Vec<Point3>, indices: Vec<u32>, what: &str) -> GeomMesh {
    let (mesh, diagnostics) = finalize_mesh(points, indices, Tolerance::WELD);
    if !diagnostics.is_watertight() {
        log::warn!("{what} primitive is not watertight: {}", diagnostics.summary());
    }
    mesh
}

/// Axis-aligned box with the given edge lengths, centred on the origin.
pub fn box_mesh(extents: Vec3) -> Result<GeomMesh, PrimitiveError> {
    let half = Vec3::new(
        positive("box x extent", extents.x)? / 2.0,
        positive("box y extent", extents.y)? / 2.0,
        positive("box z extent", extents.z)? / 2.0,
    );
    box_from_bounds(Point3::ORIGIN.sub_vec(half), Point3::ORIGIN.add_vec(half))
}

/// Axis-aligned box spanning `min..max`.
pub fn box_from_bounds(min: Point3, max: Point3) -> Result<GeomMesh, PrimitiveError> {
    positive("box x extent", max.x - min.x)?;
    positive("box y extent", max.y - min.y)?;
    positive("box z extent", max.z - min.z)?;

    // Corner i has x from bit 0, y from bit 1, z from bit 2.
    let points = (0..8)
        .map(|i| {
            Point3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        })
        .collect();
    let indices = vec![
        0, 2, 3, 0, 3, 1, // -z
        4, 5, 7, 4, 7, 6, // +z
        0, 1, 5, 0, 5, 4, // -y
        2, 6, 7, 2, 7, 3, // +y
        0, 4, 6, 0, 6, 2, // -x
        1, 3, 7, 1, 7, 5, // +x
    ];
    Ok(finish(points, indices, "box"))
}

/// Cylinder of `height` centred on the origin, approximated by a regular
/// `sections`-gon with a vertex on +x.
pub fn cylinder(radius: f64, height: f64, sections: usize) -> Result<GeomMesh, PrimitiveError> {
    prism(radius, height, sections, 0.0, "cylinder")
}

/// Regular prism with `sides` sides and the given circumradius, centred on the
/// origin. A hexagon has two flats parallel to the x axis.
pub fn regular_prism(sides: usize, circumradius: f64, height: f64) -> Result<GeomMesh, PrimitiveError> {
    prism(circumradius, height, sides, 0.0, "prism")
}

fn prism(radius: f64, height: f64, sections: usize, phase: f64, what: &str) -> Result<GeomMesh, PrimitiveError> {
    let radius = positive("radius", radius)?;
    let height = positive("height", height)?;
    let sections = segments("sections", sections, 3)?;

    let mut points = Vec::with_capacity(sections * 2 + 2);
    for z in [-height / 2.0, height / 2.0] {
        for i in 0..sections {
            let angle = phase + TAU * i as f64 / sections as f64;
            let (sin, cos) = angle.sin_cos();
            points.push(Point3::new(radius * cos, radius * sin, z));
        }
    }
    let bottom_center = points.len() as u32;
    points.push(Point3::new(0.0, 0.0, -height / 2.0));
    points.push(Point3::new(0.0, 0.0, height / 2.0));
    let top_center = bottom_center + 1;

    let mut indices = triangulate_grid_wrapped(sections, 2, true, false);
    let n = sections as u32;
    for i in 0..n {
        let next = (i + 1) % n;
        indices.extend_from_slice(&[bottom_center, next, i]);
        indices.extend_from_slice(&[top_center, n + i, n + next]);
    }
    Ok(finish(points, indices, what))
}

/// Torus around the z axis, centred on the origin.
pub fn torus(
    major_radius: f64,
    minor_radius: f64,
    major_sections: usize,
    minor_sections: usize,
) -> Result<GeomMesh, PrimitiveError> {
    let major = positive("major radius", major_radius)?;
    let minor = positive("minor radius", minor_radius)?;
    if minor >= major {
        return Err(PrimitiveError::InvalidDimension {
            name: "major radius minus minor radius",
            value: major - minor,
        });
    }
    let major_sections = segments("major sections", major_sections, 3)?;
    let minor_sections = segments("minor sections", minor_sections, 3)?;

    let mut points = Vec::with_capacity(major_sections * minor_sections);
    for j in 0..minor_sections {
        let theta = TAU * j as f64 / minor_sections as f64;
        let (sin_t, cos_t) = theta.sin_cos();
        let r = major + minor * cos_t;
        for i in 0..major_sections {
            let phi = TAU * i as f64 / major_sections as f64;
            let (sin_p, cos_p) = phi.sin_cos();
            points.push(Point3::new(r * cos_p, r * sin_p, minor * sin_t));
        }
    }
    let indices = triangulate_grid_wrapped(major_sections, minor_sections, true, true);
    Ok(finish(points, indices, "torus"))
}

/// Latitude/longitude sphere centred on the origin.
pub fn uv_sphere(radius: f64, segments_count: usize, rings: usize) -> Result<GeomMesh, PrimitiveError> {
    let radius = positive("radius", radius)?;
    let segments_count = segments("sphere segments", segments_count, 3)?;
    let rings = segments("sphere rings", rings, 2)?;

    let mut points = Vec::with_capacity(segments_count * (rings - 1) + 2);
    for ring in 1..rings {
        let lat = -FRAC_PI_2 + PI * ring as f64 / rings as f64;
        let (sin_lat, cos_lat) = lat.sin_cos();
        for i in 0..segments_count {
            let lon = TAU * i as f64 / segments_count as f64;
            let (sin_lon, cos_lon) = lon.sin_cos();
            points.push(Point3::new(
                radius * cos_lat * cos_lon,
                radius * cos_lat * sin_lon,
                radius * sin_lat,
            ));
        }
    }
    let south = points.len() as u32;
    points.push(Point3::new(0.0, 0.0, -radius));
    points.push(Point3::new(0.0, 0.0, radius));
    let north = south + 1;

    let mut indices = triangulate_grid_wrapped(segments_count, rings - 1, true, false);
    let n = segments_count as u32;
    let top = n * (rings as u32 - 2);
    for i in 0..n {
        let next = (i + 1) % n;
        indices.extend_from_slice(&[south, next, i]);
        indices.extend_from_slice(&[north, top + i, top + next]);
    }
    Ok(finish(points, indices, "sphere"))
}

/// Extrudes a planar outline (with optional holes) from `z = 0` to
/// `z = height`. Loop orientation does not matter.
pub fn extrude_polygon(
    outline: &[[f64; 2]],
    holes: &[Vec<[f64; 2]>],
    height: f64,
) -> Result<GeomMesh, PrimitiveError> {
    let height = positive("extrusion height", height)?;

    let mut flat: Vec<[f64; 2]> = Vec::new();
    let mut loops: Vec<Vec<usize>> = Vec::with_capacity(holes.len() + 1);
    for (k, ring) in std::iter::once(outline).chain(holes.iter().map(Vec::as_slice)).enumerate() {
        let cleaned = clean_ring(ring)?;
        let start = flat.len();
        flat.extend_from_slice(&cleaned);
        let mut indices: Vec<usize> = (start..flat.len()).collect();
        // Outer loop counter-clockwise, holes clockwise.
        let ccw = signed_area2(&flat, &indices) > 0.0;
        if ccw != (k == 0) {
            indices.reverse();
        }
        loops.push(indices);
    }

    let cap = triangulate_loops(&flat, &loops)?;
    let n = flat.len() as u32;

    let mut points: Vec<Point3> = flat.iter().map(|p| Point3::new(p[0], p[1], 0.0)).collect();
    points.extend(flat.iter().map(|p| Point3::new(p[0], p[1], height)));

    let mut indices = Vec::with_capacity(cap.triangles.len() * 6 + flat.len() * 6);
    for ring in &loops {
        for (i, &a) in ring.iter().enumerate() {
            let a = a as u32;
            let b = ring[(i + 1) % ring.len()] as u32;
            indices.extend_from_slice(&[a, b, n + b, a, n + b, n + a]);
        }
    }
    for [a, b, c] in cap.triangles {
        let (a, b, c) = (a as u32, b as u32, c as u32);
        indices.extend_from_slice(&[a, c, b]);
        indices.extend_from_slice(&[n + a, n + b, n + c]);
    }
    Ok(finish(points, indices, "extrusion"))
}

/// Drops non-finite input, consecutive duplicates and a closing duplicate.
fn clean_ring(ring: &[[f64; 2]]) -> Result<Vec<[f64; 2]>, PrimitiveError> {
    let tol = Tolerance::DEFAULT.eps;
    let mut out: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
    for &p in ring {
        if !p[0].is_finite() || !p[1].is_finite() {
            return Err(PrimitiveError::DegenerateOutline);
        }
        let duplicate = out
            .last()
            .is_some_and(|q| (q[0] - p[0]).abs() <= tol && (q[1] - p[1]).abs() <= tol);
        if !duplicate {
            out.push(p);
        }
    }
    while out.len() > 1 {
        let (first, last) = (out[0], out[out.len() - 1]);
        if (first[0] - last[0]).abs() <= tol && (first[1] - last[1]).abs() <= tol {
            out.pop();
        } else {
            break;
        }
    }
    if out.len() < 3 {
        return Err(PrimitiveError::DegenerateOutline);
    }
    Ok(out)
}

/// Outline of a `width x length` rectangle centred on the origin with
/// quarter-circle corners of `corner_radius`, counter-clockwise.
#[must_use]
pub fn rounded_rectangle_outline(
    width: f64,
    length: f64,
    corner_radius: f64,
    corner_segments: usize,
) -> Vec<[f64; 2]> {
    let (hw, hl) = (width / 2.0, length / 2.0);
    let r = corner_radius.clamp(0.0, hw.min(hl));
    if r <= Tolerance::DEFAULT.eps || corner_segments == 0 {
        return vec![[-hw, -hl], [hw, -hl], [hw, hl], [-hw, hl]];
    }

    let centers = [
        (hw - r, -hl + r, -FRAC_PI_2),
        (hw - r, hl - r, 0.0),
        (-hw + r, hl - r, FRAC_PI_2),
        (-hw + r, -hl + r, PI),
    ];
    let mut outline = Vec::with_capacity(4 * (corner_segments + 1));
    for (cx, cy, start) in centers {
        for s in 0..=corner_segments {
            let angle = start + FRAC_PI_2 * s as f64 / corner_segments as f64;
            let (sin, cos) = angle.sin_cos();
            outline.push([cx + r * cos, cy + r * sin]);
        }
    }
    outline
}

/// Rounded-corner plate of `height` sitting on `z = 0`, centred in x/y.
pub fn rounded_rectangle(
    width: f64,
    length: f64,
    corner_radius: f64,
    height: f64,
    corner_segments: usize,
) -> Result<GeomMesh, PrimitiveError> {
    positive("width", width)?;
    positive("length", length)?;
    if !corner_radius.is_finite() || corner_radius < 0.0 {
        return Err(PrimitiveError::InvalidDimension {
            name: "corner radius",
            value: corner_radius,
        });
    }
    let outline = rounded_rectangle_outline(width, length, corner_radius, corner_segments);
    extrude_polygon(&outline, &[], height)
}
