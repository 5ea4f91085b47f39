//! Text as geometry.
//!
//! Glyph outlines come from an external renderer behind [`TextRenderer`].
//! [`OpenScadRenderer`] shells out to the `openscad` executable through a
//! scratch `.scad` scene file and loads the STL it writes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::geom::{
    BooleanError, GeomMesh, Point3, Tolerance, Vec3, refine_edges, union_all,
    validate_and_repair_mesh, DEFAULT_MAX_REFINE_PASSES,
};
use crate::mesh_io::{self, MeshIoError};

#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("text is empty")]
    EmptyText,
    #[error("{name} must be finite and positive (got {value})")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("text renderer `{program}` could not be started: {source}")]
    RendererUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("text renderer exited with {status}: {stderr}")]
    RendererFailed { status: String, stderr: String },
    #[error("scratch file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("rendered text could not be loaded: {0}")]
    Load(#[from] MeshIoError),
    #[error("renderer produced no geometry for {0:?}")]
    NoGeometry(String),
    #[error("joining text lines failed: {0}")]
    Boolean(#[from] BooleanError),
}

/// Turns a string into an extruded solid.
///
/// Implementations return glyphs extruded along +z, centred on the origin in
/// x and y.
pub trait TextRenderer {
    fn render_text_to_mesh(&self, text: &str, size: f64, height: f64) -> Result<GeomMesh, TextError>;
}

impl<T: TextRenderer + ?Sized> TextRenderer for &T {
    fn render_text_to_mesh(&self, text: &str, size: f64, height: f64) -> Result<GeomMesh, TextError> {
        (**self).render_text_to_mesh(text, size, height)
    }
}

fn check_text_params(text: &str, size: f64, height: f64) -> Result<(), TextError> {
    if text.trim().is_empty() {
        return Err(TextError::EmptyText);
    }
    for (name, value) in [("text size", size), ("text height", height)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(TextError::InvalidParameter { name, value });
        }
    }
    Ok(())
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Renders text with the OpenSCAD command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenScadRenderer {
    /// Executable name or path.
    pub program: PathBuf,
    /// Where the scratch `.scad` and `.stl` files go.
    pub work_dir: PathBuf,
    /// OpenSCAD font name, e.g. `"Liberation Sans:style=Bold"`.
    pub font: Option<String>,
    /// Keep scratch files after loading.
    pub keep_scratch: bool,
}

impl Default for OpenScadRenderer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("openscad"),
            work_dir: std::env::temp_dir(),
            font: None,
            keep_scratch: false,
        }
    }
}

impl OpenScadRenderer {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    fn scratch_paths(&self) -> (PathBuf, PathBuf) {
        let id = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let stem = format!("threadforge-text-{}-{id}", std::process::id());
        (
            self.work_dir.join(format!("{stem}.scad")),
            self.work_dir.join(format!("{stem}.stl")),
        )
    }

    fn run(&self, scad: &Path, stl: &Path) -> Result<(), TextError> {
        let output = Command::new(&self.program)
            .arg("-o")
            .arg(stl)
            .arg(scad)
            .output()
            .map_err(|source| TextError::RendererUnavailable {
                program: self.program.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(TextError::RendererFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// OpenSCAD scene extruding `text` to `height`, centred on the origin.
#[must_use]
pub fn scad_source(text: &str, size: f64, height: f64, font: Option<&str>) -> String {
    let font = font.map_or_else(String::new, |f| format!(", font=\"{}\"", escape_scad(f)));
    format!(
        "linear_extrude(height={height}) text(\"{}\", size={size}{font}, halign=\"center\", valign=\"center\");\n",
        escape_scad(text)
    )
}

fn escape_scad(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl TextRenderer for OpenScadRenderer {
    /// The loaded glyphs are lifted by `height / 2`, so they occupy
    /// `height / 2 <= z <= 3 * height / 2`.
    fn render_text_to_mesh(&self, text: &str, size: f64, height: f64) -> Result<GeomMesh, TextError> {
        check_text_params(text, size, height)?;
        let (scad, stl) = self.scratch_paths();
        std::fs::write(&scad, scad_source(text, size, height, self.font.as_deref()))?;
        log::debug!("rendering {text:?} with {}", self.program.display());

        let result = self.run(&scad, &stl).and_then(|()| {
            let mut mesh = mesh_io::load_stl(&stl)?;
            mesh.merge_vertices(Tolerance::LOOSE);
            // OpenSCAD output is not always closed.
            Ok(validate_and_repair_mesh(&mesh))
        });

        if !self.keep_scratch {
            for path in [&scad, &stl] {
                if let Err(err) = std::fs::remove_file(path) {
                    if err.kind() != ErrorKind::NotFound {
                        log::debug!("could not remove {}: {err}", path.display());
                    }
                }
            }
        }

        let mesh = result?;
        if mesh.is_empty() {
            return Err(TextError::NoGeometry(text.to_string()));
        }
        Ok(mesh.translated(Vec3::new(0.0, 0.0, height / 2.0)))
    }
}

/// Moves `mesh` so its bounding box is centred on the origin.
#[must_use]
pub fn center_mesh(mesh: &GeomMesh) -> GeomMesh {
    match mesh.bounds() {
        Some(bounds) => mesh.translated(Point3::ORIGIN.sub_point(bounds.center())),
        None => mesh.clone(),
    }
}

/// Bends a flat slab of text around the z axis.
///
/// The slab is centred first. Its x axis becomes arc length at `radius`, its
/// y axis becomes z, and its z axis becomes radial offset from `radius`, so
/// the text reads left to right when viewed from +x. Edges are refined until
/// each spans at most `radius / 20` along x, keeping faces close to the arc.
pub fn wrap_onto_cylinder(mesh: &GeomMesh, radius: f64) -> Result<GeomMesh, TextError> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(TextError::InvalidParameter {
            name: "wrap radius",
            value: radius,
        });
    }
    let centered = center_mesh(mesh);
    let max_step = radius / 20.0;
    let mut wrapped = refine_edges(&centered, DEFAULT_MAX_REFINE_PASSES, |p, q| (p.x - q.x).abs() > max_step);
    for p in &mut wrapped.positions {
        let [x, y, z] = *p;
        let angle = x / radius;
        let rho = radius + z;
        *p = [rho * angle.cos(), rho * angle.sin(), y];
    }
    wrapped.normals = None;
    Ok(wrapped)
}

/// Renders each line and stacks them downwards, `line_spacing` apart, with
/// the first line at `y = 0`.
pub fn multi_line(
    renderer: &impl TextRenderer,
    lines: &[&str],
    line_spacing: f64,
    size: f64,
    height: f64,
) -> Result<GeomMesh, TextError> {
    if !line_spacing.is_finite() || line_spacing <= 0.0 {
        return Err(TextError::InvalidParameter {
            name: "line spacing",
            value: line_spacing,
        });
    }
    let mut rendered = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mesh = renderer.render_text_to_mesh(line, size, height)?;
        rendered.push(mesh.translated(Vec3::new(0.0, -(i as f64) * line_spacing, 0.0)));
    }
    if rendered.is_empty() {
        return Err(TextError::EmptyText);
    }
    Ok(union_all(&rendered, Tolerance::default_geom())?.mesh)
}
