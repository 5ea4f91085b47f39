//! Opt-in timing hooks for the mesh pipeline.
//!
//! Timing is only collected when the `mesh_engine_metrics` feature is enabled.
//! Without it every call compiles down to running the closure.
//!
//! ```ignore
//! use threadforge::geom::{GeomMetrics, TimingBucket};
//!
//! let mut metrics = GeomMetrics::default();
//! metrics.begin();
//! let mesh = metrics.time(TimingBucket::Boolean, || union(&core, &thread));
//! if let Some(report) = metrics.end() {
//!     log::debug!("boolean: {} ns", report.boolean_ns);
//! }
//! ```

/// Pipeline stages that accumulate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Primitive construction (boxes, cylinders, extrusions).
    Primitive,
    /// Profile sweeps along paths.
    Sweep,
    /// Mesh booleans.
    Boolean,
    /// Half-space clipping and cap triangulation.
    Clip,
    /// Repair passes (winding, inversion, hole filling).
    Repair,
    /// Vertex welding.
    Welding,
    /// File export.
    Export,
    /// Edge-topology checks.
    Diagnostics,
}

/// Cumulative nanoseconds per [`TimingBucket`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeomTimingReport {
    pub primitive_ns: u64,
    pub sweep_ns: u64,
    pub boolean_ns: u64,
    pub clip_ns: u64,
    pub repair_ns: u64,
    pub welding_ns: u64,
    pub export_ns: u64,
    pub diagnostics_ns: u64,
}

impl GeomTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        [
            self.primitive_ns,
            self.sweep_ns,
            self.boolean_ns,
            self.clip_ns,
            self.repair_ns,
            self.welding_ns,
            self.export_ns,
            self.diagnostics_ns,
        ]
        .into_iter()
        .fold(0u64, u64::saturating_add)
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    fn bucket_mut(&mut self, bucket: TimingBucket) -> &mut u64 {
        match bucket {
            TimingBucket::Primitive => &mut self.primitive_ns,
            TimingBucket::Sweep => &mut self.sweep_ns,
            TimingBucket::Boolean => &mut self.boolean_ns,
            TimingBucket::Clip => &mut self.clip_ns,
            TimingBucket::Repair => &mut self.repair_ns,
            TimingBucket::Welding => &mut self.welding_ns,
            TimingBucket::Export => &mut self.export_ns,
            TimingBucket::Diagnostics => &mut self.diagnostics_ns,
        }
    }

    /// Adds `nanos` to `bucket`, saturating.
    pub fn add(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = self.bucket_mut(bucket);
        *slot = slot.saturating_add(nanos);
    }
}

/// Accumulator for timing pipeline stages.
///
/// [`end`](Self::end) returns `None` when the `mesh_engine_metrics` feature is
/// disabled.
#[derive(Debug, Default)]
pub struct GeomMetrics {
    #[cfg(feature = "mesh_engine_metrics")]
    report: GeomTimingReport,
}

impl GeomMetrics {
    /// Resets all counters.
    pub fn begin(&mut self) {
        #[cfg(feature = "mesh_engine_metrics")]
        {
            self.report = GeomTimingReport::default();
        }
    }

    #[must_use]
    pub fn end(&self) -> Option<GeomTimingReport> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "mesh_engine_metrics")] {
                Some(self.report.clone())
            } else {
                None
            }
        }
    }

    /// Runs `f`, adding its wall time to `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        cfg_if::cfg_if! {
            if #[cfg(feature = "mesh_engine_metrics")] {
                let start = std::time::Instant::now();
                let result = f();
                let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
                self.report.add(bucket, nanos);
                result
            } else {
                let _ = bucket;
                f()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_report_total() {
        let mut report = GeomTimingReport::default();
        report.add(TimingBucket::Boolean, 1000);
        report.add(TimingBucket::Clip, 2000);
        report.add(TimingBucket::Boolean, 3000);
        assert_eq!(report.boolean_ns, 4000);
        assert_eq!(report.total_ns(), 6000);
        assert!((report.total_ms() - 0.006).abs() < 1e-9);
    }

    #[test]
    fn test_saturating_add() {
        let mut report = GeomTimingReport::default();
        report.add(TimingBucket::Export, u64::MAX);
        report.add(TimingBucket::Export, 5);
        assert_eq!(report.export_ns, u64::MAX);
        assert_eq!(report.total_ns(), u64::MAX);
    }

    #[test]
    fn test_time_returns_closure_result() {
        let mut metrics = GeomMetrics::default();
        metrics.begin();
        let result = metrics.time(TimingBucket::Sweep, || 42);
        assert_eq!(result, 42);
        #[cfg(not(feature = "mesh_engine_metrics"))]
        assert!(metrics.end().is_none());
        #[cfg(feature = "mesh_engine_metrics")]
        assert!(metrics.end().is_some());
    }
}
