//! Printable part designs.
//!
//! Every design is a pure function of a parameter struct (defaults match the
//! dimensions the parts were first printed with) and returns named meshes,
//! one per output file. Text goes through a caller-supplied
//! [`TextRenderer`].

pub mod bolt;
pub mod eye_piece;
pub mod fabric;
pub mod keychain;
pub mod snack_box;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PartsConfig;
use crate::geom::{
    BooleanError, BooleanOp, ClipError, GeomMesh, PrimitiveError, Tolerance, Vec3, boolean_meshes,
    cylinder,
};
use crate::text::{TextError, TextRenderer};
use crate::thread::ThreadError;

/// Extra length given to cutters and to parts sunk into each other, so that no
/// two faces of a boolean pair are coplanar.
pub const OVERLAP: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum PartError {
    #[error("{name} must be finite and positive (got {value})")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error(transparent)]
    Thread(#[from] ThreadError),
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
    #[error(transparent)]
    Boolean(#[from] BooleanError),
    #[error(transparent)]
    Clip(#[from] ClipError),
    #[error(transparent)]
    Text(#[from] TextError),
}

/// A finished mesh and the file stem it is saved under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMesh {
    pub name: String,
    pub mesh: GeomMesh,
}

impl NamedMesh {
    #[must_use]
    pub fn new(name: impl Into<String>, mesh: GeomMesh) -> Self {
        Self {
            name: name.into(),
            mesh,
        }
    }
}

/// The designs the CLI knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    SnackBox,
    Bolt,
    EyePiece,
    PhoneMount,
    Keychain,
    Fabric,
}

impl PartKind {
    pub const ALL: [Self; 6] = [
        Self::SnackBox,
        Self::Bolt,
        Self::EyePiece,
        Self::PhoneMount,
        Self::Keychain,
        Self::Fabric,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SnackBox => "snack_box",
            Self::Bolt => "bolt",
            Self::EyePiece => "eye_piece",
            Self::PhoneMount => "phone_mount",
            Self::Keychain => "keychain",
            Self::Fabric => "fabric",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::SnackBox => "threaded jar bottom and screw cap with grip notches",
            Self::Bolt => "hex bolts and a matching nut",
            Self::EyePiece => "binocular eye-piece adapter rings",
            Self::PhoneMount => "iPhone 13 plate holding the eye-piece ring, with knob and camera cover",
            Self::Keychain => "text plate with a key-ring loop",
            Self::Fabric => "hinged fabric tiles and the rods that join them",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether building this part with `config` calls the text renderer.
    #[must_use]
    pub fn needs_text(self, config: &PartsConfig) -> bool {
        match self {
            Self::SnackBox => config.snack_box.label.is_some(),
            Self::Keychain => true,
            Self::Bolt | Self::EyePiece | Self::PhoneMount | Self::Fabric => false,
        }
    }

    pub fn build(self, config: &PartsConfig, renderer: &dyn TextRenderer) -> Result<Vec<NamedMesh>, PartError> {
        log::info!("building {}", self.name());
        let meshes = match self {
            Self::SnackBox => snack_box::build(&config.snack_box, renderer)?.into_named(),
            Self::Bolt => bolt::build(&config.bolt)?.into_named(),
            Self::EyePiece => eye_piece::build(&config.eye_piece)?.into_named(),
            Self::PhoneMount => eye_piece::build_phone_mount(&config.phone_mount, &config.eye_piece)?.into_named(),
            Self::Keychain => vec![NamedMesh::new("keychain", keychain::build(&config.keychain, renderer)?)],
            Self::Fabric => fabric::build(&config.fabric)?.into_named(),
        };
        for part in &meshes {
            report(&part.name, &part.mesh);
        }
        Ok(meshes)
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<f64, PartError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PartError::InvalidParameter { name, value })
    }
}

/// Cylinder around the z axis spanning `z0..z1`.
pub(crate) fn z_cylinder(radius: f64, z0: f64, z1: f64, sections: usize) -> Result<GeomMesh, PartError> {
    let mesh = cylinder(radius, z1 - z0, sections)?;
    Ok(mesh.translated(Vec3::new(0.0, 0.0, (z0 + z1) / 2.0)))
}

pub(crate) fn combine(a: &GeomMesh, b: &GeomMesh, op: BooleanOp) -> Result<GeomMesh, PartError> {
    let result = boolean_meshes(a, b, op, Tolerance::default_geom())?;
    for warning in &result.diagnostics.warnings {
        log::warn!("{op:?}: {warning}");
    }
    Ok(result.mesh)
}

pub(crate) fn union(a: &GeomMesh, b: &GeomMesh) -> Result<GeomMesh, PartError> {
    combine(a, b, BooleanOp::Union)
}

pub(crate) fn subtract(a: &GeomMesh, b: &GeomMesh) -> Result<GeomMesh, PartError> {
    combine(a, b, BooleanOp::Difference)
}

/// Concatenates meshes that do not overlap into one cutter.
pub(crate) fn gather(meshes: impl IntoIterator<Item = GeomMesh>) -> GeomMesh {
    let mut all = GeomMesh::default();
    for mesh in meshes {
        all.append(&mesh);
    }
    all
}

fn report(name: &str, mesh: &GeomMesh) {
    let diagnostics = mesh.diagnostics();
    if diagnostics.is_watertight() {
        log::info!("{name}: watertight, {}", diagnostics.summary());
    } else {
        log::warn!("{name}: not watertight, {}", diagnostics.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_names_round_trip() {
        for kind in PartKind::ALL {
            assert_eq!(PartKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.to_string(), kind.name());
        }
        assert_eq!(PartKind::from_name("spaceship"), None);
    }

    #[test]
    fn test_needs_text() {
        let mut config = PartsConfig::default();
        assert!(PartKind::Keychain.needs_text(&config));
        assert!(PartKind::SnackBox.needs_text(&config));
        config.snack_box.label = None;
        assert!(!PartKind::SnackBox.needs_text(&config));
        assert!(!PartKind::Bolt.needs_text(&config));
        assert!(!PartKind::Fabric.needs_text(&config));
        assert!(!PartKind::PhoneMount.needs_text(&config));
    }

    #[test]
    fn test_z_cylinder_span() {
        let mesh = z_cylinder(2.0, -1.0, 3.0, 16).expect("cylinder");
        let bounds = mesh.bounds().expect("bounds");
        assert!((bounds.min.z + 1.0).abs() < 1e-12);
        assert!((bounds.max.z - 3.0).abs() < 1e-12);
        assert!(z_cylinder(2.0, 1.0, 1.0, 16).is_err());
    }

    #[test]
    fn test_gather_keeps_every_piece() {
        let a = crate::geom::box_mesh(Vec3::new(1.0, 1.0, 1.0)).expect("box");
        let b = a.translated(Vec3::new(3.0, 0.0, 0.0));
        let all = gather([a.clone(), b]);
        assert_eq!(all.triangle_count(), 2 * a.triangle_count());
        assert!(all.is_watertight());
        assert!((all.volume() - 2.0).abs() < 1e-12);
    }
}
