//! Hinged fabric: square tiles with hollow knuckles on every side, joined
//! by pins that print in place.
//!
//! Each side of a tile carries two knuckles; the pattern is rotated a
//! quarter turn per side, so the knuckles of neighbouring tiles interleave
//! and share an axis for the connecting rod.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use super::{NamedMesh, OVERLAP, PartError, check_positive, gather, subtract, union};
use crate::geom::{GeomMesh, Transform, Vec3, cylinder, extrude_polygon};

/// Tab sides stay this far inside the knuckle end caps.
const TAB_INSET: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricParams {
    pub side: f64,
    /// Tile thickness and knuckle diameter.
    pub thickness: f64,
    /// Radius of the connecting rod.
    pub inner_radius: f64,
    /// Clearance between moving surfaces.
    pub tolerance: f64,
    pub sections: usize,
    /// Tiles along each edge of the printed sheet.
    pub tiles: usize,
}

impl Default for FabricParams {
    fn default() -> Self {
        Self {
            side: 20.0,
            thickness: 6.0,
            inner_radius: 1.5,
            tolerance: 0.5,
            sections: 32,
            tiles: 4,
        }
    }
}

impl FabricParams {
    /// Knuckle pitch unit: a tenth of the tile side.
    #[must_use]
    pub fn unit(&self) -> f64 {
        self.side / 10.0
    }

    fn knuckle_length(&self) -> f64 {
        self.unit() - self.tolerance
    }

    /// Distance from the tile centre to the knuckle axes.
    #[must_use]
    pub fn hinge_offset(&self) -> f64 {
        self.side / 2.0 + self.thickness / 2.0 + 1.5 * self.tolerance
    }

    /// Centre-to-centre spacing of tiles in a sheet.
    #[must_use]
    pub fn pitch(&self) -> f64 {
        self.side + self.thickness + 2.0 * self.tolerance
    }

    fn validate(&self) -> Result<(), PartError> {
        check_positive("fabric side", self.side)?;
        check_positive("fabric thickness", self.thickness)?;
        check_positive("rod radius", self.inner_radius)?;
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(PartError::InvalidParameter {
                name: "fabric tolerance",
                value: self.tolerance,
            });
        }
        check_positive("knuckle length", self.knuckle_length() - 2.0 * TAB_INSET)?;
        // The hole and the rod ends both have to fit inside a knuckle.
        check_positive(
            "knuckle wall",
            self.thickness / 2.0 - self.inner_radius - self.tolerance,
        )?;
        if self.tiles == 0 {
            return Err(PartError::InvalidParameter {
                name: "fabric tiles",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Knuckle centres along the +y side; the other sides are quarter turns.
    fn knuckle_centres(&self) -> [f64; 2] {
        [1.5 * self.unit(), -0.5 * self.unit()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fabric {
    pub piece: GeomMesh,
    pub rod: GeomMesh,
    /// A square sheet of tiles with rods already threaded through.
    pub sheet: GeomMesh,
}

impl Fabric {
    #[must_use]
    pub fn into_named(self) -> Vec<NamedMesh> {
        vec![
            NamedMesh::new("fabric_piece", self.piece),
            NamedMesh::new("fabric_rod", self.rod),
            NamedMesh::new("fabric_sheet", self.sheet),
        ]
    }
}

pub fn build(params: &FabricParams) -> Result<Fabric, PartError> {
    let piece = fabric_piece(params)?;
    let rod = fabric_connecting_rod(params)?;
    let sheet = fabric_sheet(params, &piece, &rod);
    Ok(Fabric { piece, rod, sheet })
}

fn quarter_turn(side: usize) -> Transform {
    Transform::rotate_z(FRAC_PI_2 * side as f64)
}

/// Tile outline with a tab under every knuckle, counter-clockwise.
fn tile_outline(params: &FabricParams) -> Vec<[f64; 2]> {
    let half = params.side / 2.0;
    let tab = params.knuckle_length() / 2.0 - TAB_INSET;
    let reach = params.hinge_offset();

    let mut edge = Vec::new();
    for c in params.knuckle_centres() {
        edge.extend([[c + tab, half], [c + tab, reach], [c - tab, reach], [c - tab, half]]);
    }
    edge.push([-half, half]);

    (0..4)
        .flat_map(|side| {
            let (sin, cos) = (FRAC_PI_2 * side as f64).sin_cos();
            edge.iter().map(move |&[x, y]| [x * cos - y * sin, x * sin + y * cos])
        })
        .collect()
}

/// A tile centred on the origin, `thickness` thick, with two hollow
/// knuckles per side.
pub fn fabric_piece(params: &FabricParams) -> Result<GeomMesh, PartError> {
    params.validate()?;
    let t = params.thickness;
    let plate = extrude_polygon(&tile_outline(params), &[], t)?.translated(Vec3::new(0.0, 0.0, -t / 2.0));

    // Knuckle polygons are turned half a section so a flat, not a vertex,
    // faces the tile surfaces.
    let along_x = Transform::rotate_z(PI / params.sections as f64).then(Transform::rotate_y(FRAC_PI_2));
    let knuckle = cylinder(t / 2.0, params.knuckle_length(), params.sections)?.transformed(along_x);
    let hole = cylinder(
        params.inner_radius + params.tolerance,
        params.knuckle_length() + 2.0 * OVERLAP,
        params.sections,
    )?
    .transformed(along_x);

    let mut knuckles = Vec::with_capacity(8);
    let mut holes = Vec::with_capacity(8);
    for side in 0..4 {
        for c in params.knuckle_centres() {
            let place = Transform::translate(Vec3::new(c, params.hinge_offset(), 0.0)).then(quarter_turn(side));
            knuckles.push(knuckle.transformed(place));
            holes.push(hole.transformed(place));
        }
    }

    let body = union(&plate, &gather(knuckles))?;
    subtract(&body, &gather(holes))
}

/// Pin joining two tiles: a rod through four interleaved knuckles with a
/// stop at each end, lying along x.
pub fn fabric_connecting_rod(params: &FabricParams) -> Result<GeomMesh, PartError> {
    params.validate()?;
    let k = params.unit();
    let tol = params.tolerance;
    let shaft_length = 4.0 * k + 2.0 * tol;
    let shaft = cylinder(params.inner_radius, shaft_length + 2.0 * OVERLAP, params.sections)?;

    let stop = cylinder(params.thickness / 2.0 - tol, k, params.sections)?;
    let offset = 2.0 * k + k / 2.0 + tol;
    let stops = gather([
        stop.translated(Vec3::new(0.0, 0.0, offset)),
        stop.translated(Vec3::new(0.0, 0.0, -offset)),
    ]);
    let rod = union(&shaft, &stops)?;
    Ok(rod.transformed(Transform::rotate_y(FRAC_PI_2)))
}

/// `tiles x tiles` copies of `piece` with a rod between every pair of
/// neighbours. Nothing touches, so the shells are simply gathered.
#[must_use]
pub fn fabric_sheet(params: &FabricParams, piece: &GeomMesh, rod: &GeomMesh) -> GeomMesh {
    let pitch = params.pitch();
    let n = params.tiles;
    let at = |i: usize, j: usize| Vec3::new(i as f64 * pitch, j as f64 * pitch, 0.0);
    let rod_along_y = rod.transformed(Transform::rotate_z(FRAC_PI_2));

    let mut parts = Vec::with_capacity(3 * n * n);
    for i in 0..n {
        for j in 0..n {
            parts.push(piece.translated(at(i, j)));
            if j + 1 < n {
                parts.push(rod.translated(at(i, j).add(Vec3::new(0.0, pitch / 2.0, 0.0))));
            }
            if i + 1 < n {
                parts.push(rod_along_y.translated(at(i, j).add(Vec3::new(pitch / 2.0, 0.0, 0.0))));
            }
        }
    }
    log::debug!("fabric sheet of {} shells", parts.len());
    gather(parts)
}
