//! Hex-headed bolts and a matching nut.

use serde::{Deserialize, Serialize};

use super::{NamedMesh, OVERLAP, PartError, check_positive, subtract, union};
use crate::geom::{GeomMesh, Vec3, regular_prism};
use crate::thread::{DEFAULT_SAMPLES_PER_TURN, FitClearance, ThreadSpec, create_thread_cutout, create_threaded_cylinder_with};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoltParams {
    /// Thread root radius.
    pub bolt_radius: f64,
    /// Threaded length below the head.
    pub shaft_length: f64,
    /// Circumradius of the hex head and the nut.
    pub hex_radius: f64,
    pub head_thickness: f64,
    /// Head thickness of the second, low-profile bolt.
    pub thin_head_thickness: f64,
    pub nut_thickness: f64,
    pub thread_thickness: f64,
    pub thread_pitch: f64,
    pub fit: FitClearance,
    pub samples_per_turn: usize,
}

impl Default for BoltParams {
    fn default() -> Self {
        let support_thickness = 10.0;
        Self {
            bolt_radius: 2.0,
            shaft_length: 2.0 * support_thickness + 4.0,
            hex_radius: 5.0,
            head_thickness: 4.0,
            thin_head_thickness: 2.0,
            nut_thickness: 4.0,
            thread_thickness: 1.5,
            thread_pitch: 2.0,
            fit: FitClearance::Standard,
            samples_per_turn: DEFAULT_SAMPLES_PER_TURN,
        }
    }
}

impl BoltParams {
    fn thread(&self, length: f64) -> ThreadSpec {
        ThreadSpec {
            samples_per_turn: self.samples_per_turn,
            ..ThreadSpec::new(self.bolt_radius, length, self.thread_thickness, self.thread_pitch)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoltSet {
    pub bolt: GeomMesh,
    pub thin_head_bolt: GeomMesh,
    pub nut: GeomMesh,
}

impl BoltSet {
    #[must_use]
    pub fn into_named(self) -> Vec<NamedMesh> {
        vec![
            NamedMesh::new("bolt", self.bolt),
            NamedMesh::new("bolt_thin_head", self.thin_head_bolt),
            NamedMesh::new("nut", self.nut),
        ]
    }
}

pub fn build(params: &BoltParams) -> Result<BoltSet, PartError> {
    Ok(BoltSet {
        bolt: bolt(params, params.head_thickness)?,
        thin_head_bolt: bolt(params, params.thin_head_thickness)?,
        nut: nut(params)?,
    })
}

/// Hex prism spanning `0 <= z <= thickness`.
fn hex_prism(radius: f64, thickness: f64) -> Result<GeomMesh, PartError> {
    Ok(regular_prism(6, radius, thickness)?.translated(Vec3::new(0.0, 0.0, thickness / 2.0)))
}

/// Threaded shaft on `0 <= z <= shaft_length` with the head below `z = 0`.
pub fn bolt(params: &BoltParams, head_thickness: f64) -> Result<GeomMesh, PartError> {
    check_positive("head thickness", head_thickness)?;
    check_positive("hex radius", params.hex_radius)?;
    let head = hex_prism(params.hex_radius, head_thickness)?.translated(Vec3::new(0.0, 0.0, -head_thickness));
    let shaft = create_threaded_cylinder_with(&params.thread(params.shaft_length + OVERLAP))?;
    let shaft = shaft.mesh.translated(Vec3::new(0.0, 0.0, -OVERLAP));
    union(&head, &shaft)
}

/// Hex nut on `0 <= z <= nut_thickness` with the female thread cut through.
pub fn nut(params: &BoltParams) -> Result<GeomMesh, PartError> {
    let thickness = check_positive("nut thickness", params.nut_thickness)?;
    check_positive("hex radius", params.hex_radius)?;
    let blank = hex_prism(params.hex_radius, thickness)?;
    let cutout = create_thread_cutout(&params.thread(thickness), params.fit)?;
    subtract(&blank, &cutout.mesh)
}
