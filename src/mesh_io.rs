//! Mesh export and import.
//!
//! STL (binary and ASCII) goes through `stl_io`; OBJ is written directly.
//! Everything written is a plain triangle soup with no construction history.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geom::{GeomMesh, MeshError, Point3};

#[derive(Debug, thiserror::Error)]
pub enum MeshIoError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported mesh file extension: {0:?}")]
    UnsupportedFormat(String),
    #[error("invalid mesh: {0}")]
    InvalidMesh(#[from] MeshError),
    #[error("STL file has a face referencing missing vertex {0}")]
    DanglingIndex(usize),
}

/// Output format for [`save_mesh_as`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeshFormat {
    #[default]
    StlBinary,
    StlAscii,
    Obj,
}

impl MeshFormat {
    /// Picks a format from the file extension: `.stl` is binary STL, `.obj`
    /// is OBJ.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "stl" => Some(Self::StlBinary),
            "obj" => Some(Self::Obj),
            _ => None,
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::StlBinary | Self::StlAscii => "stl",
            Self::Obj => "obj",
        }
    }
}

fn face_normal(mesh: &GeomMesh, t: usize) -> [f32; 3] {
    let Some([a, b, c]) = mesh.triangle(t) else {
        return [0.0; 3];
    };
    b.sub_point(a)
        .cross(c.sub_point(a))
        .normalized()
        .map_or([0.0; 3], |n| [n.x as f32, n.y as f32, n.z as f32])
}

fn corner(p: [f64; 3]) -> [f32; 3] {
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

/// Writes `mesh` as binary STL.
pub fn write_stl_binary<W: Write>(mesh: &GeomMesh, writer: &mut W) -> Result<(), MeshIoError> {
    use stl_io::{Normal, Triangle, Vertex};

    mesh.validate()?;
    let triangles: Vec<Triangle> = mesh
        .indices
        .chunks_exact(3)
        .enumerate()
        .map(|(t, tri)| Triangle {
            normal: Normal::new(face_normal(mesh, t)),
            vertices: [
                Vertex::new(corner(mesh.positions[tri[0] as usize])),
                Vertex::new(corner(mesh.positions[tri[1] as usize])),
                Vertex::new(corner(mesh.positions[tri[2] as usize])),
            ],
        })
        .collect();
    stl_io::write_stl(writer, triangles.iter())?;
    Ok(())
}

/// Writes `mesh` as ASCII STL under the solid name `name`.
pub fn write_stl_ascii<W: Write>(mesh: &GeomMesh, name: &str, writer: &mut W) -> Result<(), MeshIoError> {
    mesh.validate()?;
    writeln!(writer, "solid {name}")?;
    for (t, tri) in mesh.indices.chunks_exact(3).enumerate() {
        let n = face_normal(mesh, t);
        writeln!(writer, "  facet normal {:.6} {:.6} {:.6}", n[0], n[1], n[2])?;
        writeln!(writer, "    outer loop")?;
        for &i in tri {
            let p = mesh.positions[i as usize];
            writeln!(writer, "      vertex {:.6} {:.6} {:.6}", p[0], p[1], p[2])?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid {name}")?;
    Ok(())
}

/// Writes `mesh` as Wavefront OBJ (positions and faces only).
pub fn write_obj<W: Write>(mesh: &GeomMesh, writer: &mut W) -> Result<(), MeshIoError> {
    mesh.validate()?;
    for p in &mesh.positions {
        writeln!(writer, "v {} {} {}", p[0], p[1], p[2])?;
    }
    for tri in mesh.indices.chunks_exact(3) {
        writeln!(writer, "f {} {} {}", tri[0] + 1, tri[1] + 1, tri[2] + 1)?;
    }
    Ok(())
}

/// Reads binary or ASCII STL into an indexed mesh. Identical corner
/// positions become one vertex.
pub fn read_stl<R: Read + Seek>(reader: &mut R) -> Result<GeomMesh, MeshIoError> {
    let stl = stl_io::read_stl(reader)?;
    let positions: Vec<[f64; 3]> = stl
        .vertices
        .iter()
        .map(|v| [f64::from(v[0]), f64::from(v[1]), f64::from(v[2])])
        .collect();
    let mut indices = Vec::with_capacity(stl.faces.len() * 3);
    for face in &stl.faces {
        for &i in &face.vertices {
            if i >= positions.len() {
                return Err(MeshIoError::DanglingIndex(i));
            }
            indices.push(i as u32);
        }
    }
    let mesh = GeomMesh::new(positions, indices);
    log::debug!(
        "read STL: {} triangles, {} vertices",
        mesh.triangle_count(),
        mesh.vertex_count()
    );
    Ok(mesh.with_normals())
}

/// Opens and reads an STL file.
pub fn load_stl(path: impl AsRef<Path>) -> Result<GeomMesh, MeshIoError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_stl(&mut reader)
}

/// Writes `mesh` to `path` in the format implied by its extension.
pub fn save_mesh(mesh: &GeomMesh, path: impl AsRef<Path>) -> Result<MeshFormat, MeshIoError> {
    let path = path.as_ref();
    let format = MeshFormat::from_path(path)
        .ok_or_else(|| MeshIoError::UnsupportedFormat(path.display().to_string()))?;
    save_mesh_as(mesh, path, format)?;
    Ok(format)
}

/// Writes `mesh` to `path` in `format`, creating or truncating the file.
pub fn save_mesh_as(mesh: &GeomMesh, path: impl AsRef<Path>, format: MeshFormat) -> Result<(), MeshIoError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        MeshFormat::StlBinary => write_stl_binary(mesh, &mut writer)?,
        MeshFormat::StlAscii => {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("mesh");
            write_stl_ascii(mesh, name, &mut writer)?;
        }
        MeshFormat::Obj => write_obj(mesh, &mut writer)?,
    }
    writer.flush()?;
    log::info!(
        "wrote {} ({} triangles, {:?})",
        path.display(),
        mesh.triangle_count(),
        format
    );
    Ok(())
}

/// Centroid of the vertex cloud, or `None` for an empty mesh.
#[must_use]
pub fn vertex_centroid(mesh: &GeomMesh) -> Option<Point3> {
    if mesh.positions.is_empty() {
        return None;
    }
    let n = mesh.positions.len() as f64;
    let sum = mesh
        .positions
        .iter()
        .fold([0.0; 3], |acc, p| [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]);
    Some(Point3::new(sum[0] / n, sum[1] / n, sum[2] / n))
}
