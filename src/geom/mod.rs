mod boolean;
mod bvh;
mod clip;
mod core;
mod diagnostics;
mod mesh;
mod metrics;
mod predicates;
mod primitives;
mod refine;
mod repair;
mod sweep;
mod triangulation;

pub use boolean::{
    BooleanDiagnostics, BooleanError, BooleanOp, BooleanResult, PointContainment,
    boolean_meshes, classify_point_in_mesh, union_all,
};
pub use clip::{ClipError, SliceSide, clip_to_half_space, keep_z_band, slice_plane_x};
pub use core::{BBox, Point3, Tolerance, Transform, Vec3};
pub use diagnostics::{EdgeTopology, GeomMeshDiagnostics, analyze_edge_topology};
pub use mesh::{GeomMesh, MeshError};
pub use metrics::{GeomMetrics, GeomTimingReport, TimingBucket};
pub use primitives::{
    PrimitiveError, box_from_bounds, box_mesh, cylinder, extrude_polygon, regular_prism,
    rounded_rectangle, rounded_rectangle_outline, torus, uv_sphere,
};
pub use refine::{DEFAULT_MAX_REFINE_PASSES, refine_edges, refine_long_edges};
pub use repair::{
    RepairReport, fill_holes, fix_inversion, fix_normals, fix_winding, validate_and_repair_mesh,
    validate_and_repair_mesh_with_report,
};
pub use sweep::{
    SweepCaps, SweepError, helix_parameters, helix_points, sweep_closed_profile,
    sweep_profile_along_helix,
};
pub use triangulation::{TriangulationError, triangulate_grid_wrapped};

#[cfg(test)]
mod tests;
