//! Monte Carlo impact-dispersion analysis for reentry vehicle trajectories.
//!
//! This crate drives repeated batches of an external trajectory propagator,
//! reduces the resulting impact point clouds into miss-distance statistics
//! (percentile CEP plus fitted Gamma and Nakagami dispersion models), and
//! sweeps the seven injected error-source magnitudes across scale factors to
//! attribute total dispersion to individual sources.

pub mod config;
pub mod frame;
pub mod orchestrator;
pub mod output;
pub mod propagator;
pub mod stats;
pub mod sweep;

use std::path::PathBuf;

use thiserror::Error;

pub use config::{ErrorParams, ErrorSource, FilterType, MnvrMode, RunConfig, RvType};
pub use frame::{local_impact, LocalImpactPoint};
pub use orchestrator::{run_batch, run_batch_summary};
pub use output::{allocate_run_dir, write_sensitivity_csv, write_summary_json};
pub use propagator::{
    read_impact_csv, CommandPropagator, ImpactBatch, ImpactRecord, Propagator,
    SyntheticPropagator,
};
pub use stats::{
    summarize, DispersionSummary, DistributionFit, GammaParams, NakagamiParams, UnfitReason,
};
pub use sweep::{run_sweep, SensitivityRow, SensitivityTable, SweepGroup, SCALE_FACTORS};

#[derive(Debug, Error)]
pub enum DispersionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("missing impact artifact: {path}")]
    MissingArtifact { path: PathBuf },
    #[error("malformed impact artifact {path} at line {line}: {reason}")]
    MalformedArtifact {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("impact batch holds {got} records, expected {expected}")]
    TrialCountMismatch { expected: usize, got: usize },
    #[error("impact batch is empty, no statistics to compute")]
    EmptyBatch,
    #[error("propagation failed: {0}")]
    Propagation(String),
}
