//! Batch orchestration: request one batch from the propagation collaborator
//! and read the persisted impact records back in trial order.

use std::fs;
use std::path::Path;

use crate::propagator::{impact_file_path, read_impact_csv, ImpactBatch, Propagator};
use crate::stats::{summarize, DispersionSummary};
use crate::{DispersionError, RunConfig};

/// Run one Monte Carlo batch.
///
/// The collaborator performs the full batch internally in a single call. Its
/// durable output is the impact file in `run_dir`; that file is re-read here
/// so later sweep steps always observe the most recent batch rather than any
/// cached state. An absent or short artifact aborts the batch.
pub fn run_batch(
    propagator: &dyn Propagator,
    config: &RunConfig,
    run_dir: &Path,
) -> Result<ImpactBatch, DispersionError> {
    config.validate()?;
    fs::create_dir_all(run_dir)?;

    propagator.propagate_batch(config, run_dir)?;

    let batch = read_impact_csv(&impact_file_path(run_dir))?;
    if batch.len() != config.run.num_runs {
        return Err(DispersionError::TrialCountMismatch {
            expected: config.run.num_runs,
            got: batch.len(),
        });
    }
    Ok(batch)
}

/// Run one batch and reduce it to its dispersion summary.
pub fn run_batch_summary(
    propagator: &dyn Propagator,
    config: &RunConfig,
    run_dir: &Path,
) -> Result<(ImpactBatch, DispersionSummary), DispersionError> {
    let batch = run_batch(propagator, config, run_dir)?;
    let summary = summarize(&batch, &config.aimpoint())?;
    Ok((batch, summary))
}
