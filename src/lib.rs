#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Parametric 3D-printable parts built from meshes.
//!
//! * [`geom`]: triangle meshes, primitives, sweeps, booleans, clipping and
//!   repair.
//! * [`thread`]: the helical threaded-cylinder generator and its companions.
//! * [`parts`]: part designs (snack jar, bolt and nut, eye-piece adapter
//!   and phone mount, keychain, hinged fabric).
//! * [`text`]: text solids through an external renderer.
//! * [`relief`]: raster images extruded into reliefs and stencils.
//! * [`mesh_io`]: STL and OBJ export, STL import.
//! * [`config`]: JSON parameter files.

pub mod config;
pub mod geom;
pub mod mesh_io;
pub mod parts;
pub mod relief;
pub mod text;
pub mod thread;

pub use geom::GeomMesh;
pub use thread::{create_threaded_cylinder, flip_z};
