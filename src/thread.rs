//! Helical thread generation.
//!
//! A threaded cylinder is a plain core cylinder unioned with a triangular
//! ridge swept along a helix, then trimmed to the requested height band:
//!
//! 1. **Core**: radius `radius + core_slack`, padded two pitches past both
//!    ends of the band so no core cap lies on a trim plane.
//! 2. **Thread**: the profile `(0, -pitch/2), (0, pitch/2), (thickness, 0)`
//!    swept over `(height + pitch/2) / pitch` turns starting at `z = 0`. The
//!    sweep overruns the band at both ends on purpose.
//! 3. **Union** of core and thread.
//! 4. **Trim**: everything above `z = height` and below `z = 0` is clipped
//!    away and the cuts are capped.
//!
//! Watertightness of the result is checked and logged, never enforced.
//!
//! ```ignore
//! use threadforge::thread::create_threaded_cylinder;
//!
//! let bolt = create_threaded_cylinder(10.0, 20.0, 1.5, 2.0);
//! assert!(bolt.is_watertight());
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geom::{
    BooleanError, BooleanOp, ClipError, GeomMesh, GeomMeshDiagnostics, GeomMetrics, Point3,
    PrimitiveError, SweepCaps, SweepError, TimingBucket, Tolerance, Transform, Vec3,
    boolean_meshes, clip_to_half_space, cylinder, sweep_profile_along_helix,
};

/// Helix samples per turn used when nothing else is asked for.
pub const DEFAULT_SAMPLES_PER_TURN: usize = 100;
/// Sides of the core cylinder polygon (raised automatically for wide cores).
pub const DEFAULT_CORE_SECTIONS: usize = 64;
/// Radial inflation of the core over the thread base radius.
pub const DEFAULT_CORE_SLACK: f64 = 0.1;

// Axial overrun of a cutout past each end of its band, as a fraction of pitch.
const CUTOUT_OVERSHOOT: f64 = 0.1;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ThreadError {
    #[error("{name} must be finite and positive (got {value})")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("thread sweep failed: {0}")]
    Sweep(#[from] SweepError),
    #[error("core cylinder failed: {0}")]
    Primitive(#[from] PrimitiveError),
    #[error("thread union failed: {0}")]
    Boolean(#[from] BooleanError),
    #[error("thread trim failed: {0}")]
    Clip(#[from] ClipError),
}

/// Parameters of a single-start external thread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSpec {
    /// Thread base (root) radius.
    pub radius: f64,
    /// Axial length of the finished threaded section.
    pub height: f64,
    /// Radial depth of the thread ridge.
    pub thread_thickness: f64,
    /// Axial distance between crests.
    pub pitch: f64,
    pub samples_per_turn: usize,
    pub core_sections: usize,
    pub core_slack: f64,
}

impl Default for ThreadSpec {
    fn default() -> Self {
        Self {
            radius: 10.0,
            height: 20.0,
            thread_thickness: 1.5,
            pitch: 2.0,
            samples_per_turn: DEFAULT_SAMPLES_PER_TURN,
            core_sections: DEFAULT_CORE_SECTIONS,
            core_slack: DEFAULT_CORE_SLACK,
        }
    }
}

impl ThreadSpec {
    #[must_use]
    pub fn new(radius: f64, height: f64, thread_thickness: f64, pitch: f64) -> Self {
        Self {
            radius,
            height,
            thread_thickness,
            pitch,
            ..Self::default()
        }
    }

    /// Same thread with the root radius grown by `amount`.
    #[must_use]
    pub fn widened(self, amount: f64) -> Self {
        Self {
            radius: self.radius + amount,
            ..self
        }
    }

    /// Helix turns needed to cover the band plus half a pitch of overrun.
    #[must_use]
    pub fn turns(&self) -> f64 {
        (self.height + self.pitch / 2.0) / self.pitch
    }

    pub fn validate(&self) -> Result<(), ThreadError> {
        for (name, value) in [
            ("radius", self.radius),
            ("height", self.height),
            ("thread thickness", self.thread_thickness),
            ("thread pitch", self.pitch),
            ("core slack", self.core_slack),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ThreadError::InvalidParameter { name, value });
            }
        }
        if self.samples_per_turn < 3 {
            return Err(ThreadError::InvalidParameter {
                name: "samples per turn",
                value: self.samples_per_turn as f64,
            });
        }
        Ok(())
    }

    /// Core polygon sides, raised until every flat clears the thread root by
    /// at least half the slack.
    fn core_sections(&self) -> usize {
        let outer = self.radius + self.core_slack;
        let inner = self.radius + self.core_slack / 2.0;
        let needed = (PI / (inner / outer).acos()).ceil() as usize;
        self.core_sections.max(needed).max(3)
    }

    /// Samples per turn, nudged so that no sample lands exactly one turn after
    /// another; otherwise adjacent turns of the sweep would share edges. A
    /// single whole turn always aligns its end rings, which only shares one
    /// vertex, and is left alone.
    fn samples_per_turn(&self) -> usize {
        let turns = self.turns();
        let aligned = |samples: usize| {
            let count = ((turns * samples as f64).floor() as usize).max(2);
            let steps_per_turn = (count - 1) as f64 / turns;
            (steps_per_turn - steps_per_turn.round()).abs() <= 1e-6
        };
        (self.samples_per_turn..self.samples_per_turn + 8)
            .find(|&samples| !aligned(samples))
            .unwrap_or(self.samples_per_turn)
    }
}

/// Radial allowance between a male thread and the cutout it screws into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum FitClearance {
    /// 0.2 mm: tight fit for fine printers.
    Snug,
    /// 0.5 mm.
    #[default]
    Standard,
    /// Any other clearance in model units.
    Custom(f64),
}

impl FitClearance {
    #[must_use]
    pub fn clearance(self) -> f64 {
        match self {
            Self::Snug => 0.2,
            Self::Standard => 0.5,
            Self::Custom(value) => value,
        }
    }
}

/// A generated thread with its diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadedCylinder {
    pub mesh: GeomMesh,
    pub diagnostics: GeomMeshDiagnostics,
}

impl ThreadedCylinder {
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.diagnostics.is_watertight()
    }
}

/// Builds a threaded cylinder occupying `0 <= z <= height`.
///
/// Never fails: invalid parameters or a failed geometry stage are logged and
/// yield an empty mesh.
#[must_use]
pub fn create_threaded_cylinder(radius: f64, height: f64, thread_thickness: f64, thread_pitch: f64) -> GeomMesh {
    match try_create_threaded_cylinder(radius, height, thread_thickness, thread_pitch) {
        Ok(mesh) => mesh,
        Err(err) => {
            log::warn!("threaded cylinder failed: {err}");
            GeomMesh::default()
        }
    }
}

/// [`create_threaded_cylinder`] with parameter validation.
pub fn try_create_threaded_cylinder(
    radius: f64,
    height: f64,
    thread_thickness: f64,
    thread_pitch: f64,
) -> Result<GeomMesh, ThreadError> {
    let spec = ThreadSpec::new(radius, height, thread_thickness, thread_pitch);
    Ok(create_threaded_cylinder_with(&spec)?.mesh)
}

/// Builds the threaded cylinder described by `spec`.
pub fn create_threaded_cylinder_with(spec: &ThreadSpec) -> Result<ThreadedCylinder, ThreadError> {
    spec.validate()?;
    let tol = Tolerance::default_geom();
    let mut metrics = GeomMetrics::default();
    metrics.begin();

    let sections = spec.core_sections();
    let pad = 2.0 * spec.pitch;
    // Half a section of rotation keeps core edges off the sweep's start plane.
    let core = metrics.time(TimingBucket::Primitive, || {
        cylinder(spec.radius + spec.core_slack, spec.height + 2.0 * pad, sections)
    })?;
    let mut core = core.transformed(
        Transform::rotate_z(PI / sections as f64).then(Transform::translate(Vec3::new(0.0, 0.0, spec.height / 2.0))),
    );

    let profile = [
        [0.0, -spec.pitch / 2.0],
        [0.0, spec.pitch / 2.0],
        [spec.thread_thickness, 0.0],
    ];
    let samples = spec.samples_per_turn();
    let (mut thread, sweep_diag) = metrics.time(TimingBucket::Sweep, || {
        sweep_profile_along_helix(
            &profile,
            spec.radius,
            spec.pitch,
            spec.turns(),
            samples,
            SweepCaps::BOTH,
            tol,
        )
    })?;
    log::debug!(
        "thread sweep: {} turns at {} samples per turn, {}",
        spec.turns(),
        samples,
        sweep_diag.summary()
    );

    metrics.time(TimingBucket::Welding, || {
        core.merge_vertices(tol);
        thread.merge_vertices(tol);
    });

    let union = metrics.time(TimingBucket::Boolean, || boolean_meshes(&core, &thread, BooleanOp::Union, tol))?;
    for warning in &union.diagnostics.warnings {
        log::warn!("thread union: {warning}");
    }

    let (trimmed, diagnostics) = metrics.time(TimingBucket::Clip, || trim_to_band(&union.mesh, spec.height, tol))?;

    let mut diagnostics = diagnostics;
    diagnostics.unresolved_intersection_count = union.diagnostics.unresolved_intersection_count;
    diagnostics.boolean_fallback_used = union.diagnostics.parity_fallback_used;
    diagnostics.warnings.extend(union.diagnostics.warnings.iter().cloned());
    diagnostics.timing = metrics.end();

    if diagnostics.is_watertight() {
        log::info!("Success: The resulting mesh is watertight.");
    } else {
        log::warn!("Warning: The resulting mesh is not watertight.");
        log::debug!("{}", diagnostics.summary());
    }

    Ok(ThreadedCylinder {
        mesh: trimmed,
        diagnostics,
    })
}

/// Clips `z > height` then `z < 0`.
fn trim_to_band(
    mesh: &GeomMesh,
    height: f64,
    tol: Tolerance,
) -> Result<(GeomMesh, GeomMeshDiagnostics), ClipError> {
    let (below_top, top_diag) = clip_to_half_space(mesh, Point3::new(0.0, 0.0, height), Vec3::Z, tol)?;
    let (band, mut diagnostics) = clip_to_half_space(&below_top, Point3::ORIGIN, -Vec3::Z, tol)?;
    diagnostics.absorb_stage(&top_diag);
    Ok((band, diagnostics))
}

/// Female counterpart of `spec`: the same thread grown by the fit clearance
/// and overrunning its band slightly at both ends, ready to be subtracted.
///
/// The band still starts at `z = 0` and ends at `z = spec.height`, apart from
/// the overrun.
pub fn create_thread_cutout(spec: &ThreadSpec, fit: FitClearance) -> Result<ThreadedCylinder, ThreadError> {
    let clearance = fit.clearance();
    if !clearance.is_finite() || clearance < 0.0 {
        return Err(ThreadError::InvalidParameter {
            name: "fit clearance",
            value: clearance,
        });
    }
    let overshoot = CUTOUT_OVERSHOOT * spec.pitch;
    let cutout_spec = ThreadSpec {
        height: spec.height + 2.0 * overshoot,
        ..spec.widened(clearance)
    };
    let cutout = create_threaded_cylinder_with(&cutout_spec)?;
    Ok(ThreadedCylinder {
        mesh: cutout.mesh.translated(Vec3::new(0.0, 0.0, -overshoot)),
        diagnostics: cutout.diagnostics,
    })
}

/// Mirrors `mesh` through `z = 0` and moves it back so its z-extent is the
/// same as before. Winding is reversed so the result stays outward-facing.
#[must_use]
pub fn flip_z(mesh: &GeomMesh) -> GeomMesh {
    let Some(bounds) = mesh.bounds() else {
        return mesh.clone();
    };
    mesh.transformed(
        Transform::mirror(2).then(Transform::translate(Vec3::new(0.0, 0.0, bounds.max.z + bounds.min.z))),
    )
}

/// Turns `mesh` upside down by half a turn about the x axis, keeping its
/// z-extent. Unlike [`flip_z`] this is a rotation, so a right-handed thread
/// stays right-handed.
#[must_use]
pub fn turn_over(mesh: &GeomMesh) -> GeomMesh {
    let Some(bounds) = mesh.bounds() else {
        return mesh.clone();
    };
    mesh.transformed(
        Transform::rotate_x(PI).then(Transform::translate(Vec3::new(0.0, 0.0, bounds.max.z + bounds.min.z))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_overrun_half_pitch() {
        let spec = ThreadSpec::new(10.0, 20.0, 1.5, 2.0);
        assert!((spec.turns() - 10.25).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        let spec = ThreadSpec::new(10.0, 0.0, 1.5, 2.0);
        assert_eq!(
            spec.validate(),
            Err(ThreadError::InvalidParameter { name: "height", value: 0.0 })
        );
        let spec = ThreadSpec::new(f64::NAN, 1.0, 1.5, 2.0);
        assert!(matches!(
            spec.validate(),
            Err(ThreadError::InvalidParameter { name: "radius", .. })
        ));
        assert!(create_threaded_cylinder(1.0, 1.0, -1.0, 1.0).is_empty());
    }

    #[test]
    fn test_core_sections_grow_with_radius() {
        let small = ThreadSpec::new(10.0, 5.0, 1.0, 2.0);
        assert_eq!(small.core_sections(), DEFAULT_CORE_SECTIONS);

        let wide = ThreadSpec::new(200.0, 5.0, 1.0, 2.0);
        let sections = wide.core_sections();
        assert!(sections > DEFAULT_CORE_SECTIONS);
        let flat = (wide.radius + wide.core_slack) * (PI / sections as f64).cos();
        assert!(flat >= wide.radius + wide.core_slack / 2.0 - 1e-12);
    }

    #[test]
    fn test_samples_avoid_whole_turn_alignment() {
        // 10/9 turns at 100 samples per turn is exactly 99 steps per turn.
        let spec = ThreadSpec::new(5.0, 1.1, 1.0, 1.8);
        assert_eq!(spec.samples_per_turn(), 101);

        let spec = ThreadSpec::new(10.0, 20.0, 1.5, 2.0);
        assert_eq!(spec.samples_per_turn(), DEFAULT_SAMPLES_PER_TURN);

        let whole_turn = ThreadSpec::new(5.0, 1.0, 1.0, 2.0);
        assert_eq!(whole_turn.samples_per_turn(), DEFAULT_SAMPLES_PER_TURN);
    }

    #[test]
    fn test_fit_clearance_presets() {
        assert_eq!(FitClearance::Snug.clearance(), 0.2);
        assert_eq!(FitClearance::Standard.clearance(), 0.5);
        assert_eq!(FitClearance::Custom(0.35).clearance(), 0.35);
        assert_eq!(FitClearance::default(), FitClearance::Standard);
    }

    #[test]
    fn test_thread_spec_from_partial_json() {
        let spec: ThreadSpec = serde_json::from_str(r#"{"radius": 4.0, "pitch": 1.0}"#).expect("json");
        assert_eq!(spec.radius, 4.0);
        assert_eq!(spec.pitch, 1.0);
        assert_eq!(spec.height, ThreadSpec::default().height);
        assert_eq!(spec.samples_per_turn, DEFAULT_SAMPLES_PER_TURN);
    }

    #[test]
    fn test_flip_z_keeps_extent() {
        let mesh = crate::geom::box_from_bounds(Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 2.0, 4.0))
            .expect("box");
        let flipped = flip_z(&mesh);
        let bounds = flipped.bounds().expect("bounds");
        assert!((bounds.min.z - 1.0).abs() < 1e-12);
        assert!((bounds.max.z - 4.0).abs() < 1e-12);
        assert!((flipped.volume() - mesh.volume()).abs() < 1e-12);
        assert!(flipped.is_watertight());
        assert!(flip_z(&GeomMesh::default()).is_empty());
    }

    #[test]
    fn test_turn_over_is_a_rotation() {
        let mesh = crate::geom::box_from_bounds(Point3::new(0.0, 0.5, 1.0), Point3::new(1.0, 2.0, 4.0))
            .expect("box");
        let turned = turn_over(&mesh);
        let bounds = turned.bounds().expect("bounds");
        assert!((bounds.min.z - 1.0).abs() < 1e-12);
        assert!((bounds.max.z - 4.0).abs() < 1e-12);
        assert!((bounds.min.y + 2.0).abs() < 1e-12);
        assert!((bounds.max.y + 0.5).abs() < 1e-12);
        assert!((turned.volume() - mesh.volume()).abs() < 1e-12);

        // Mirroring keeps y; turning over negates it.
        let flipped = flip_z(&mesh).bounds().expect("bounds");
        assert!((flipped.min.y - 0.5).abs() < 1e-12);
    }
}
