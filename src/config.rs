//! JSON configuration for the part generator.
//!
//! Every field is optional; missing fields fall back to the defaults the
//! parts were designed with.
//!
//! ```json
//! {
//!   "output": { "dir": "out", "format": "stl_ascii" },
//!   "thread": { "radius": 6.0, "pitch": 1.5 },
//!   "bolt": { "shaft_length": 30.0, "fit": "Snug" },
//!   "snack_box": { "label": { "text": "Pretzels" } },
//!   "relief": { "image": "cat.png", "length": 80.0 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::mesh_io::MeshFormat;
use crate::parts::bolt::BoltParams;
use crate::parts::eye_piece::{EyePieceParams, PhoneMountParams};
use crate::parts::fabric::FabricParams;
use crate::parts::keychain::KeychainParams;
use crate::parts::snack_box::SnackBoxParams;
use crate::relief::ReliefParams;
use crate::text::OpenScadRenderer;
use crate::thread::ThreadSpec;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub format: MeshFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            format: MeshFormat::StlBinary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartsConfig {
    pub output: OutputConfig,
    pub text: OpenScadRenderer,
    /// The bare threaded cylinder built by `threadforge thread`.
    pub thread: ThreadSpec,
    pub snack_box: SnackBoxParams,
    pub bolt: BoltParams,
    pub eye_piece: EyePieceParams,
    pub phone_mount: PhoneMountParams,
    pub keychain: KeychainParams,
    pub fabric: FabricParams,
    /// Image relief settings for `threadforge relief`.
    pub relief: ReliefParams,
}

impl PartsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Overrides the helix resolution of every threaded part.
    pub fn set_samples_per_turn(&mut self, samples: usize) {
        self.thread.samples_per_turn = samples;
        self.snack_box.samples_per_turn = samples;
        self.bolt.samples_per_turn = samples;
        self.eye_piece.samples_per_turn = samples;
        self.phone_mount.samples_per_turn = samples;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::FitClearance;

    #[test]
    fn test_empty_config_is_default() {
        let config = PartsConfig::from_json_str("{}").expect("config");
        assert_eq!(config, PartsConfig::default());
        assert_eq!(config.output.format, MeshFormat::StlBinary);
        assert!((config.snack_box.inner_radius - 38.1).abs() < 1e-12);
        assert_eq!(config.keychain.text, "Luke Skywalker");
    }

    #[test]
    fn test_partial_overrides() {
        let json = r#"{
            "output": { "format": "obj" },
            "bolt": { "shaft_length": 30.0, "fit": "Snug" },
            "eye_piece": { "fit": { "Custom": 0.3 } },
            "snack_box": { "label": null, "cap_grip": { "count": 16 } }
        }"#;
        let config = PartsConfig::from_json_str(json).expect("config");
        assert_eq!(config.output.format, MeshFormat::Obj);
        assert_eq!(config.output.dir, PathBuf::from("."));
        assert_eq!(config.bolt.shaft_length, 30.0);
        assert_eq!(config.bolt.fit, FitClearance::Snug);
        assert_eq!(config.bolt.bolt_radius, 2.0);
        assert_eq!(config.eye_piece.fit, FitClearance::Custom(0.3));
        assert!(config.snack_box.label.is_none());
        let grip = config.snack_box.cap_grip.expect("cap grip");
        assert_eq!(grip.count, 16);
        assert_eq!(grip.diameter, 1.0);
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = PartsConfig::default();
        config.set_samples_per_turn(24);
        let json = config.to_json_pretty().expect("json");
        let back = PartsConfig::from_json_str(&json).expect("config");
        assert_eq!(back, config);
        assert_eq!(back.bolt.samples_per_turn, 24);
        assert_eq!(back.thread.samples_per_turn, 24);
        assert_eq!(back.phone_mount.samples_per_turn, 24);
    }

    #[test]
    fn test_relief_and_fabric_sections() {
        let json = r#"{
            "relief": { "image": "cat.png", "stencil": { "line_thickness": 3 }, "board_thickness": null },
            "fabric": { "side": 30.0, "tiles": 2 }
        }"#;
        let config = PartsConfig::from_json_str(json).expect("config");
        assert_eq!(config.relief.image, Some(PathBuf::from("cat.png")));
        let stencil = config.relief.stencil.expect("stencil");
        assert_eq!(stencil.line_thickness, 3);
        assert_eq!(stencil.path_width, 1);
        assert!(config.relief.board_thickness.is_none());
        assert_eq!(config.relief.resolution, 400);
        assert_eq!(config.fabric.side, 30.0);
        assert_eq!(config.fabric.tiles, 2);
        assert_eq!(config.fabric.thickness, 6.0);
    }

    #[test]
    fn test_thread_section_is_independent_of_parts() {
        let json = r#"{
            "thread": { "radius": 6.0, "pitch": 1.5, "samples_per_turn": 40 },
            "bolt": { "samples_per_turn": 24 }
        }"#;
        let config = PartsConfig::from_json_str(json).expect("config");
        assert_eq!(config.thread.radius, 6.0);
        assert_eq!(config.thread.pitch, 1.5);
        assert_eq!(config.thread.samples_per_turn, 40);
        assert_eq!(config.thread.height, ThreadSpec::default().height);
        assert_eq!(config.bolt.samples_per_turn, 24);
    }

    #[test]
    fn test_bad_json_is_reported() {
        assert!(matches!(PartsConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            PartsConfig::load("/nonexistent/threadforge.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
