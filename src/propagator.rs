//! The propagation collaborator boundary.
//!
//! The vehicle-flight propagator is an external service: given a run
//! configuration it flies every trial, persists one impact record per trial
//! to the run directory, and returns only success or failure. The orchestrator
//! re-reads the persisted file rather than trusting anything in memory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::config::{ErrorSource, MnvrMode, RunConfig, RvType};
use crate::frame::tangent_basis;
use crate::output::write_impact_csv;
use crate::DispersionError;

/// File the collaborator persists into the run directory, one row per trial.
pub const IMPACT_FILE: &str = "impact_data.csv";

pub fn impact_file_path(run_dir: &Path) -> PathBuf {
    run_dir.join(IMPACT_FILE)
}

/// One trial's impact: elapsed flight time and the Cartesian impact position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    pub time_s: f64,
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,
}

impl ImpactRecord {
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x_m, self.y_m, self.z_m)
    }
}

/// Ordered impact records for one configuration. Order is the trial sequence
/// and is never sorted or merged across batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpactBatch {
    pub records: Vec<ImpactRecord>,
}

impl ImpactBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// External propagation service: flies `config.run.num_runs` trials and
/// persists the impact file into `run_dir`.
pub trait Propagator {
    fn propagate_batch(&self, config: &RunConfig, run_dir: &Path) -> Result<(), DispersionError>;
}

/// Read a persisted impact file back. The file carries exactly one header
/// row; a missing file is the fatal `MissingArtifact` condition.
pub fn read_impact_csv(path: &Path) -> Result<ImpactBatch, DispersionError> {
    if !path.exists() {
        return Err(DispersionError::MissingArtifact {
            path: path.to_path_buf(),
        });
    }

    // Flexible mode hands short and long rows through so the column check
    // below can report them as MalformedArtifact with a line number, instead
    // of the reader rejecting them first.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        // Header occupies line 1, first data row is line 2.
        let line = idx + 2;
        if row.len() != 4 {
            return Err(DispersionError::MalformedArtifact {
                path: path.to_path_buf(),
                line,
                reason: format!("expected 4 columns, got {}", row.len()),
            });
        }
        let mut fields = [0.0_f64; 4];
        for (slot, raw) in fields.iter_mut().zip(row.iter()) {
            *slot = raw.trim().parse().map_err(|_| DispersionError::MalformedArtifact {
                path: path.to_path_buf(),
                line,
                reason: format!("non-numeric field {raw:?}"),
            })?;
        }
        records.push(ImpactRecord {
            time_s: fields[0],
            x_m: fields[1],
            y_m: fields[2],
            z_m: fields[3],
        });
    }

    Ok(ImpactBatch { records })
}

/// Propagator that shells out to an external executable.
///
/// The executable is invoked as `<program> <config.json> <run_dir>` and must
/// persist the impact file before exiting zero. The configuration crosses the
/// boundary as JSON; no native struct layout is mirrored.
#[derive(Debug, Clone)]
pub struct CommandPropagator {
    program: PathBuf,
    batch_deadline: Option<Duration>,
}

impl CommandPropagator {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            batch_deadline: None,
        }
    }

    /// Abort the batch if the collaborator has not exited within `deadline`.
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = Some(deadline);
        self
    }
}

impl Propagator for CommandPropagator {
    fn propagate_batch(&self, config: &RunConfig, run_dir: &Path) -> Result<(), DispersionError> {
        let config_path = run_dir.join("propagator_config.json");
        fs::write(&config_path, serde_json::to_string_pretty(config)?)?;

        let mut child = Command::new(&self.program)
            .arg(&config_path)
            .arg(run_dir)
            .spawn()
            .map_err(|err| {
                DispersionError::Propagation(format!(
                    "failed to spawn propagator {}: {err}",
                    self.program.display()
                ))
            })?;

        let status = match self.batch_deadline {
            Some(deadline) => wait_with_deadline(&mut child, deadline)?,
            None => child.wait()?,
        };

        if !status.success() {
            return Err(DispersionError::Propagation(format!(
                "propagator {} exited with {status}",
                self.program.display()
            )));
        }
        Ok(())
    }
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Result<ExitStatus, DispersionError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if started.elapsed() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DispersionError::Propagation(format!(
                "propagator exceeded the batch deadline of {:.1} s",
                deadline.as_secs_f64()
            )));
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Seeded analytic surrogate for the flight propagator.
///
/// Each trial lands at the aimpoint plus a tangent-plane offset that is
/// linear in the seven error-source magnitudes, with independent
/// standard-normal deviates per source and trial. Zero magnitudes land every
/// trial exactly on the aimpoint. The deviate stream depends only on the seed
/// and trial index, never on the magnitudes, so scaling one source scales the
/// resulting point cloud linearly. This is a statistics surrogate for tests
/// and demos, not a physics model.
#[derive(Debug, Clone)]
pub struct SyntheticPropagator {
    seed: u64,
}

impl SyntheticPropagator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

/// Tangent-plane miss [m] per unit of source magnitude for the surrogate.
fn miss_gain(source: ErrorSource) -> f64 {
    match source {
        ErrorSource::Position => 1.0,
        ErrorSource::Velocity => 350.0,
        ErrorSource::Angle => 6.0e6,
        ErrorSource::AccScale => 2.0,
        ErrorSource::GyroBias => 2.0e8,
        ErrorSource::GyroNoise => 1.5e9,
        ErrorSource::GnssNoise => 0.9,
    }
}

// Fixed dispersion contributed by the environment-error models when toggled.
const GRAV_ERROR_SIGMA_M: f64 = 25.0;
const ATM_ERROR_SIGMA_M: f64 = 60.0;

impl Propagator for SyntheticPropagator {
    fn propagate_batch(&self, config: &RunConfig, run_dir: &Path) -> Result<(), DispersionError> {
        let aim = config.aimpoint();
        let (east, north) = tangent_basis(&aim);
        let flight_time = surrogate_flight_time(config);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut records = Vec::with_capacity(config.run.num_runs);

        for _trial in 0..config.run.num_runs {
            let mut downrange = 0.0;
            let mut crossrange = 0.0;

            for source in ErrorSource::ALL {
                let z_down: f64 = rng.sample(StandardNormal);
                let z_cross: f64 = rng.sample(StandardNormal);
                if source == ErrorSource::GnssNoise && !config.flight.gnss_nav {
                    continue;
                }
                let sigma = miss_gain(source) * config.errorparams.magnitude(source);
                downrange += sigma * z_down;
                crossrange += sigma * z_cross;
            }

            for (enabled, sigma) in [
                (config.flight.grav_error, GRAV_ERROR_SIGMA_M),
                (config.flight.atm_error, ATM_ERROR_SIGMA_M),
            ] {
                let z_down: f64 = rng.sample(StandardNormal);
                let z_cross: f64 = rng.sample(StandardNormal);
                if enabled {
                    downrange += sigma * z_down;
                    crossrange += sigma * z_cross;
                }
            }

            let impact = aim + east * downrange + north * crossrange;
            records.push(ImpactRecord {
                time_s: flight_time,
                x_m: impact.x,
                y_m: impact.y,
                z_m: impact.z,
            });
        }

        write_impact_csv(&impact_file_path(run_dir), &records)
    }
}

fn surrogate_flight_time(config: &RunConfig) -> f64 {
    let base = 1_600.0 + 8.0 * config.run.launch_elevation_deg;
    let mnvr = match (config.vehicle.rv_type, config.flight.reentry_mnvr) {
        (RvType::Maneuverable, MnvrMode::Instant) => 45.0,
        (RvType::Maneuverable, MnvrMode::None) => 20.0,
        (RvType::Ballistic, _) => 0.0,
    };
    base + mnvr
}
