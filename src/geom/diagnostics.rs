//! Mesh diagnostics.
//!
//! Every mesh-producing stage (primitives, sweeps, booleans, clipping, repair)
//! hands back a [`GeomMeshDiagnostics`] next to its mesh. The numbers answer the
//! one question the part designs care about before a mesh is used as a boolean
//! operand or written to disk: is this a closed, consistently oriented solid?
//!
//! Edge topology is judged on vertex indices, not positions. Two triangles
//! touching at coincident but distinct vertices count as open edges; run
//! [`GeomMesh::merge_vertices`](super::GeomMesh::merge_vertices) first when the
//! mesh was assembled from independently built pieces.
//!
//! ```ignore
//! use threadforge::geom::GeomMeshDiagnostics;
//!
//! let diagnostics = GeomMeshDiagnostics::from_mesh(&mesh);
//! if !diagnostics.is_watertight() {
//!     log::warn!("{}", diagnostics.summary());
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use super::mesh::GeomMesh;

/// Diagnostics for a generated or repaired mesh.
///
/// # Topology
///
/// - `open_edge_count`: edges used by a single triangle (holes).
/// - `non_manifold_edge_count`: edges used by more than two triangles.
/// - `misoriented_edge_count`: edges shared by two triangles that traverse it
///   in the same direction (inconsistent winding).
///
/// # Repairs
///
/// - `welded_vertex_count`: duplicates merged by tolerance welding.
/// - `flipped_triangle_count`: triangles whose winding was reversed.
/// - `degenerate_triangle_count`: zero-area triangles dropped.
/// - `filled_hole_count`: boundary loops closed by hole filling.
///
/// # Booleans
///
/// - `unresolved_intersection_count`: intersection constraints the
///   retriangulation could not honour.
/// - `boolean_fallback_used`: an operand pair needed a degraded strategy.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GeomMeshDiagnostics {
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub welded_vertex_count: usize,
    pub flipped_triangle_count: usize,
    pub degenerate_triangle_count: usize,
    pub filled_hole_count: usize,
    pub open_edge_count: usize,
    pub non_manifold_edge_count: usize,
    pub misoriented_edge_count: usize,
    pub unresolved_intersection_count: usize,
    pub boolean_fallback_used: bool,
    /// Only populated with the `mesh_engine_metrics` feature.
    pub timing: Option<super::metrics::GeomTimingReport>,
    pub warnings: Vec<String>,
}

/// Per-edge usage counts of a triangle soup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EdgeTopology {
    pub edge_count: usize,
    pub open_edge_count: usize,
    pub non_manifold_edge_count: usize,
    pub misoriented_edge_count: usize,
}

impl EdgeTopology {
    #[must_use]
    pub fn is_closed_manifold(self) -> bool {
        self.open_edge_count == 0
            && self.non_manifold_edge_count == 0
            && self.misoriented_edge_count == 0
    }
}

/// Counts how each undirected edge is used by the triangles in `indices`.
///
/// Triangles with repeated indices are skipped.
#[must_use]
pub fn analyze_edge_topology(indices: &[u32]) -> EdgeTopology {
    // (forward uses, backward uses) per undirected edge keyed low->high
    let mut edges: HashMap<(u32, u32), (u32, u32)> = HashMap::with_capacity(indices.len());

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
        if i0 == i1 || i1 == i2 || i0 == i2 {
            continue;
        }
        for (a, b) in [(i0, i1), (i1, i2), (i2, i0)] {
            let entry = edges.entry((a.min(b), a.max(b))).or_insert((0, 0));
            if a < b {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }

    let mut topology = EdgeTopology {
        edge_count: edges.len(),
        ..EdgeTopology::default()
    };
    for (forward, backward) in edges.into_values() {
        match forward + backward {
            1 => topology.open_edge_count += 1,
            2 if forward != 1 => topology.misoriented_edge_count += 1,
            2 => {}
            _ => topology.non_manifold_edge_count += 1,
        }
    }
    topology
}

impl GeomMeshDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts and topology of an existing mesh, with no repair statistics.
    #[must_use]
    pub fn from_mesh(mesh: &GeomMesh) -> Self {
        let mut diagnostics = Self {
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
            ..Self::default()
        };
        diagnostics.set_topology(analyze_edge_topology(&mesh.indices));
        diagnostics
    }

    pub fn set_topology(&mut self, topology: EdgeTopology) {
        self.open_edge_count = topology.open_edge_count;
        self.non_manifold_edge_count = topology.non_manifold_edge_count;
        self.misoriented_edge_count = topology.misoriented_edge_count;
    }

    /// Closed and consistently oriented: every edge borders exactly two faces
    /// that traverse it in opposite directions.
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.triangle_count > 0
            && self.open_edge_count == 0
            && self.non_manifold_edge_count == 0
            && self.misoriented_edge_count == 0
    }

    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.non_manifold_edge_count == 0
    }

    /// Watertight with every boolean constraint honoured.
    #[must_use]
    pub fn is_valid_solid(&self) -> bool {
        self.is_watertight() && self.unresolved_intersection_count == 0
    }

    /// Valid and untouched by any repair or fallback.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.is_valid_solid()
            && self.degenerate_triangle_count == 0
            && self.flipped_triangle_count == 0
            && self.filled_hole_count == 0
            && !self.boolean_fallback_used
            && self.warnings.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Folds repair counters and warnings of an earlier stage into this one.
    ///
    /// Counts describing the final mesh (vertices, triangles, topology) are
    /// kept from `self`, which is assumed to describe the later stage.
    pub fn absorb_stage(&mut self, earlier: &GeomMeshDiagnostics) {
        self.welded_vertex_count += earlier.welded_vertex_count;
        self.flipped_triangle_count += earlier.flipped_triangle_count;
        self.degenerate_triangle_count += earlier.degenerate_triangle_count;
        self.filled_hole_count += earlier.filled_hole_count;
        self.unresolved_intersection_count += earlier.unresolved_intersection_count;
        self.boolean_fallback_used |= earlier.boolean_fallback_used;
        self.warnings.splice(0..0, earlier.warnings.iter().cloned());
    }

    /// One-line summary: `"V:{vertices} T:{triangles} [issues...]"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("V:{} T:{}", self.vertex_count, self.triangle_count)];
        let counters = [
            ("welded", self.welded_vertex_count),
            ("flipped", self.flipped_triangle_count),
            ("degenerate", self.degenerate_triangle_count),
            ("filled", self.filled_hole_count),
            ("open", self.open_edge_count),
            ("non-manifold", self.non_manifold_edge_count),
            ("misoriented", self.misoriented_edge_count),
            ("unresolved", self.unresolved_intersection_count),
        ];
        for (label, count) in counters {
            if count > 0 {
                parts.push(format!("{label}:{count}"));
            }
        }
        if self.boolean_fallback_used {
            parts.push("boolean-fallback".to_string());
        }
        parts.join(" ")
    }
}

impl fmt::Display for GeomMeshDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mesh Diagnostics:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Triangles: {}", self.triangle_count)?;
        writeln!(f, "  Watertight: {}", self.is_watertight())?;

        if self.welded_vertex_count > 0
            || self.flipped_triangle_count > 0
            || self.degenerate_triangle_count > 0
            || self.filled_hole_count > 0
        {
            writeln!(f, "  Repairs:")?;
            if self.welded_vertex_count > 0 {
                writeln!(f, "    - Welded vertices: {}", self.welded_vertex_count)?;
            }
            if self.flipped_triangle_count > 0 {
                writeln!(f, "    - Flipped triangles: {}", self.flipped_triangle_count)?;
            }
            if self.degenerate_triangle_count > 0 {
                writeln!(f, "    - Degenerate triangles removed: {}", self.degenerate_triangle_count)?;
            }
            if self.filled_hole_count > 0 {
                writeln!(f, "    - Holes filled: {}", self.filled_hole_count)?;
            }
        }

        if self.open_edge_count > 0 || self.non_manifold_edge_count > 0 || self.misoriented_edge_count > 0 {
            writeln!(f, "  Topology issues:")?;
            if self.open_edge_count > 0 {
                writeln!(f, "    - Open edges: {}", self.open_edge_count)?;
            }
            if self.non_manifold_edge_count > 0 {
                writeln!(f, "    - Non-manifold edges: {}", self.non_manifold_edge_count)?;
            }
            if self.misoriented_edge_count > 0 {
                writeln!(f, "    - Misoriented edges: {}", self.misoriented_edge_count)?;
            }
        }

        if self.unresolved_intersection_count > 0 {
            writeln!(f, "  Unresolved intersections: {}", self.unresolved_intersection_count)?;
        }
        if self.boolean_fallback_used {
            writeln!(f, "  Boolean: fallback strategy used")?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "  Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "    - {warning}")?;
            }
        }

        if let Some(ref timing) = self.timing {
            writeln!(f, "  Timing: {:.3} ms total", timing.total_ms())?;
        }

        let status = if self.is_clean() {
            "CLEAN"
        } else if self.is_valid_solid() {
            "VALID (with repairs)"
        } else {
            "ISSUES DETECTED"
        };
        writeln!(f, "  Status: {status}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Closed tetrahedron with consistent winding.
    const TETRA: [u32; 12] = [0, 2, 1, 0, 1, 3, 1, 2, 3, 2, 0, 3];

    #[test]
    fn test_tetrahedron_is_closed_manifold() {
        let topo = analyze_edge_topology(&TETRA);
        assert_eq!(topo.edge_count, 6);
        assert!(topo.is_closed_manifold());
    }

    #[test]
    fn test_missing_face_opens_three_edges() {
        let topo = analyze_edge_topology(&TETRA[..9]);
        assert_eq!(topo.open_edge_count, 3);
        assert_eq!(topo.non_manifold_edge_count, 0);
    }

    #[test]
    fn test_flipped_face_is_misoriented() {
        let mut indices = TETRA;
        indices.swap(10, 11);
        let topo = analyze_edge_topology(&indices);
        assert_eq!(topo.open_edge_count, 0);
        assert_eq!(topo.misoriented_edge_count, 3);
    }

    #[test]
    fn test_default_is_not_watertight() {
        let diag = GeomMeshDiagnostics::default();
        assert!(!diag.is_watertight());
        assert!(diag.is_manifold());
    }

    #[test]
    fn test_open_edges_not_watertight() {
        let diag = GeomMeshDiagnostics {
            triangle_count: 4,
            open_edge_count: 3,
            ..Default::default()
        };
        assert!(!diag.is_watertight());
        assert!(!diag.is_valid_solid());
        assert!(!diag.is_clean());
    }

    #[test]
    fn test_absorb_stage_keeps_final_topology() {
        let earlier = GeomMeshDiagnostics {
            vertex_count: 10,
            welded_vertex_count: 4,
            open_edge_count: 7,
            boolean_fallback_used: true,
            warnings: vec!["earlier".to_string()],
            ..Default::default()
        };
        let mut later = GeomMeshDiagnostics {
            vertex_count: 8,
            triangle_count: 12,
            warnings: vec!["later".to_string()],
            ..Default::default()
        };
        later.absorb_stage(&earlier);

        assert_eq!(later.vertex_count, 8);
        assert_eq!(later.open_edge_count, 0);
        assert_eq!(later.welded_vertex_count, 4);
        assert!(later.boolean_fallback_used);
        assert_eq!(later.warnings, vec!["earlier".to_string(), "later".to_string()]);
    }

    #[test]
    fn test_summary() {
        let diag = GeomMeshDiagnostics {
            vertex_count: 100,
            triangle_count: 50,
            welded_vertex_count: 5,
            open_edge_count: 2,
            ..Default::default()
        };

        let summary = diag.summary();
        assert!(summary.starts_with("V:100 T:50"));
        assert!(summary.contains("welded:5"));
        assert!(summary.contains("open:2"));
        assert!(!summary.contains("flipped"));
    }

    #[test]
    fn test_display_status() {
        let broken = GeomMeshDiagnostics {
            vertex_count: 100,
            triangle_count: 50,
            open_edge_count: 2,
            warnings: vec!["test warning".to_string()],
            ..Default::default()
        };
        let output = format!("{broken}");
        assert!(output.contains("Open edges: 2"));
        assert!(output.contains("test warning"));
        assert!(output.contains("ISSUES DETECTED"));

        let clean = GeomMeshDiagnostics {
            vertex_count: 4,
            triangle_count: 4,
            ..Default::default()
        };
        assert!(format!("{clean}").contains("CLEAN"));
    }
}
