//! Threaded snack jar: a cup with a female thread at its rim and a cap with
//! the matching male thread.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::{NamedMesh, OVERLAP, PartError, check_positive, gather, subtract, union, z_cylinder};
use crate::geom::{GeomMesh, Point3, Transform, Vec3, box_from_bounds};
use crate::text::{TextRenderer, wrap_onto_cylinder};
use crate::thread::{
    DEFAULT_SAMPLES_PER_TURN, FitClearance, ThreadSpec, create_thread_cutout, create_threaded_cylinder_with,
    turn_over,
};

const INCH: f64 = 25.4;

/// Text bent around the jar wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelParams {
    pub text: String,
    pub size: f64,
    /// Relief depth; half of it is sunk into the wall.
    pub height: f64,
    /// Height of the label centre as a fraction of the inner height.
    pub position: f64,
}

impl Default for LabelParams {
    fn default() -> Self {
        Self {
            text: "MY Snack".to_string(),
            size: 10.0,
            height: 2.0,
            position: 0.7,
        }
    }
}

/// Square notches around the top of the jar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottomGrip {
    pub cut_size: f64,
    pub layers: usize,
    pub count: usize,
}

impl Default for BottomGrip {
    fn default() -> Self {
        Self {
            cut_size: 2.0,
            layers: 5,
            count: 64,
        }
    }
}

/// Round flutes around the cap rim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapGrip {
    pub diameter: f64,
    pub count: usize,
}

impl Default for CapGrip {
    fn default() -> Self {
        Self {
            diameter: 1.0,
            count: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnackBoxParams {
    pub inner_radius: f64,
    pub inner_height: f64,
    pub thread_height: f64,
    pub wall_thickness: f64,
    pub thread_thickness: f64,
    pub thread_pitch: f64,
    pub fit: FitClearance,
    pub samples_per_turn: usize,
    /// Sides of the jar and cap cylinders.
    pub sections: usize,
    pub label: Option<LabelParams>,
    pub bottom_grip: Option<BottomGrip>,
    pub cap_grip: Option<CapGrip>,
}

impl Default for SnackBoxParams {
    fn default() -> Self {
        Self {
            inner_radius: 1.5 * INCH,
            inner_height: 2.5 * INCH,
            thread_height: 6.0,
            wall_thickness: 5.0,
            thread_thickness: 1.5,
            thread_pitch: 2.0,
            fit: FitClearance::Standard,
            samples_per_turn: DEFAULT_SAMPLES_PER_TURN,
            sections: 128,
            label: Some(LabelParams::default()),
            bottom_grip: Some(BottomGrip::default()),
            cap_grip: Some(CapGrip::default()),
        }
    }
}

impl SnackBoxParams {
    #[must_use]
    pub fn outer_radius(&self) -> f64 {
        self.inner_radius + self.wall_thickness
    }

    /// Total height of the jar bottom.
    #[must_use]
    pub fn bottom_height(&self) -> f64 {
        self.inner_height + self.wall_thickness + self.thread_height
    }

    fn thread(&self, height: f64) -> ThreadSpec {
        ThreadSpec {
            samples_per_turn: self.samples_per_turn,
            ..ThreadSpec::new(self.inner_radius, height, self.thread_thickness, self.thread_pitch)
        }
    }

    fn validate(&self) -> Result<(), PartError> {
        check_positive("inner radius", self.inner_radius)?;
        check_positive("inner height", self.inner_height)?;
        check_positive("thread height", self.thread_height)?;
        check_positive("wall thickness", self.wall_thickness)?;
        check_positive("thread thickness", self.thread_thickness)?;
        check_positive("thread pitch", self.thread_pitch)?;
        Ok(())
    }
}

/// The two printable halves.
#[derive(Debug, Clone, PartialEq)]
pub struct SnackBox {
    pub bottom: GeomMesh,
    pub cap: GeomMesh,
}

impl SnackBox {
    #[must_use]
    pub fn into_named(self) -> Vec<NamedMesh> {
        vec![
            NamedMesh::new("snack_box_bottom", self.bottom),
            NamedMesh::new("snack_box_cap", self.cap),
        ]
    }
}

pub fn build(params: &SnackBoxParams, renderer: &dyn TextRenderer) -> Result<SnackBox, PartError> {
    let mut bottom = plain_bottom(params)?;
    if let Some(label) = &params.label {
        bottom = add_label(&bottom, params, label, renderer)?;
    }
    if let Some(grip) = &params.bottom_grip {
        bottom = cut_bottom_grip(&bottom, params, grip)?;
    }

    let mut cap = plain_cap(params)?;
    if let Some(grip) = &params.cap_grip {
        cap = cut_cap_grip(&cap, params, grip)?;
    }
    Ok(SnackBox { bottom, cap })
}

/// Cup with a floor of `wall_thickness` and the female thread cut into the
/// top `thread_height` of its inner wall.
pub fn plain_bottom(params: &SnackBoxParams) -> Result<GeomMesh, PartError> {
    params.validate()?;
    let top = params.bottom_height();
    let outer = z_cylinder(params.outer_radius(), 0.0, top, params.sections)?;
    let cavity = z_cylinder(params.inner_radius, params.wall_thickness, top + OVERLAP, params.sections)?;
    let cup = subtract(&outer, &cavity)?;

    let cutout = create_thread_cutout(&params.thread(params.thread_height), params.fit)?;
    let cutout = cutout
        .mesh
        .translated(Vec3::new(0.0, 0.0, params.inner_height + params.wall_thickness));
    subtract(&cup, &cutout)
}

/// Disc with the male thread standing on it, turned over so the thread points
/// down onto the jar.
pub fn plain_cap(params: &SnackBoxParams) -> Result<GeomMesh, PartError> {
    params.validate()?;
    let disc = z_cylinder(params.outer_radius(), 0.0, params.wall_thickness, params.sections)?;
    let threads = create_threaded_cylinder_with(&params.thread(params.thread_height + OVERLAP))?;
    let threads = threads
        .mesh
        .translated(Vec3::new(0.0, 0.0, params.wall_thickness - OVERLAP));
    Ok(turn_over(&union(&disc, &threads)?))
}

/// Bends the label around the outer wall, half sunk into it.
pub fn add_label(
    bottom: &GeomMesh,
    params: &SnackBoxParams,
    label: &LabelParams,
    renderer: &dyn TextRenderer,
) -> Result<GeomMesh, PartError> {
    let text = renderer.render_text_to_mesh(&label.text, label.size, label.height)?;
    let wrapped = wrap_onto_cylinder(&text, params.outer_radius())?;
    let wrapped = wrapped.translated(Vec3::new(0.0, 0.0, params.inner_height * label.position));
    union(bottom, &wrapped)
}

/// Staggered rings of square notches below the rim, centred on the outer
/// wall. The top ring is open at the rim.
pub fn cut_bottom_grip(bottom: &GeomMesh, params: &SnackBoxParams, grip: &BottomGrip) -> Result<GeomMesh, PartError> {
    let size = check_positive("grip cut size", grip.cut_size)?;
    if grip.layers == 0 || grip.count == 0 {
        return Ok(bottom.clone());
    }
    let top = params.bottom_height();
    let radius = params.outer_radius();
    let step = TAU / grip.count as f64;

    let mut cutters = Vec::with_capacity(grip.layers * grip.count);
    for layer in 0..grip.layers {
        let z0 = top - size * (layer + 1) as f64;
        let z1 = if layer == 0 { top + OVERLAP } else { z0 + size };
        let notch = box_from_bounds(
            Point3::new(-size / 2.0, -size / 2.0, z0),
            Point3::new(size / 2.0, size / 2.0, z1),
        )?;
        let offset = step / 2.0 * layer as f64;
        for i in 0..grip.count {
            let angle = offset + step * i as f64;
            let place = Transform::translate(Vec3::new(radius, 0.0, 0.0)).then(Transform::rotate_z(angle));
            cutters.push(notch.transformed(place));
        }
    }
    subtract(bottom, &gather(cutters))
}

/// Vertical flutes through the full cap height.
pub fn cut_cap_grip(cap: &GeomMesh, params: &SnackBoxParams, grip: &CapGrip) -> Result<GeomMesh, PartError> {
    let diameter = check_positive("grip diameter", grip.diameter)?;
    if grip.count == 0 {
        return Ok(cap.clone());
    }
    let Some(bounds) = cap.bounds() else {
        return Ok(cap.clone());
    };
    let flute = z_cylinder(diameter / 2.0, bounds.min.z - OVERLAP, bounds.max.z + OVERLAP, 12)?;
    let radius = params.outer_radius();
    let step = TAU / grip.count as f64;
    let cutters = (0..grip.count).map(|i| {
        let angle = step * i as f64;
        flute.translated(Vec3::new(radius * angle.cos(), radius * angle.sin(), 0.0))
    });
    subtract(cap, &gather(cutters))
}
