//! Error-source sensitivity sweep.
//!
//! Runs the orchestrator across a structured grid: each of the seven error
//! sources in isolation at scales {0.1, 1, 10} of its reference magnitude,
//! followed by one combined group with every source scaled together. Row
//! emission order is the observable contract.

use std::ops::Range;
use std::path::Path;

use crate::config::{ErrorParams, ErrorSource};
use crate::orchestrator::run_batch;
use crate::propagator::Propagator;
use crate::stats::summarize;
use crate::{DispersionError, RunConfig};

/// Magnitude scale factors applied within every sweep group, in order.
pub const SCALE_FACTORS: [f64; 3] = [0.1, 1.0, 10.0];

/// One sweep group: a single isolated error source, or all seven combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepGroup {
    Source(ErrorSource),
    Combined,
}

impl SweepGroup {
    /// Groups in emission order. The GNSS-noise group exists only when GNSS
    /// navigation is enabled; consumers derive group boundaries from this
    /// list, never from fixed row offsets.
    pub fn ordered(gnss_nav: bool) -> Vec<SweepGroup> {
        let mut groups: Vec<SweepGroup> = ErrorSource::ALL
            .iter()
            .copied()
            .filter(|&source| source != ErrorSource::GnssNoise || gnss_nav)
            .map(SweepGroup::Source)
            .collect();
        groups.push(SweepGroup::Combined);
        groups
    }

    pub fn label(self) -> &'static str {
        match self {
            SweepGroup::Source(source) => source.field_name(),
            SweepGroup::Combined => "combined",
        }
    }
}

/// One sweep step: the magnitudes that were flown and the resulting CEP.
#[derive(Debug, Clone, Copy)]
pub struct SensitivityRow {
    pub group: SweepGroup,
    pub scale: f64,
    pub magnitudes: ErrorParams,
    pub cep: f64,
}

/// Rows in emission order, grouped by varied source.
#[derive(Debug, Clone, Default)]
pub struct SensitivityTable {
    pub rows: Vec<SensitivityRow>,
}

impl SensitivityTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Contiguous row ranges per group, in emission order.
    pub fn groups(&self) -> Vec<(SweepGroup, Range<usize>)> {
        let mut spans: Vec<(SweepGroup, Range<usize>)> = Vec::new();
        for (idx, row) in self.rows.iter().enumerate() {
            match spans.last_mut() {
                Some((group, range)) if *group == row.group => range.end = idx + 1,
                _ => spans.push((row.group, idx..idx + 1)),
            }
        }
        spans
    }
}

/// Drive the full sensitivity sweep for `base_config`.
///
/// The base magnitudes are the sweep's reference values. Every step flies a
/// fresh configuration built by copy-with-override, so no magnitudes survive
/// from one step into the next. Any batch failure aborts the whole sweep.
pub fn run_sweep(
    propagator: &dyn Propagator,
    base_config: &RunConfig,
    run_dir: &Path,
) -> Result<SensitivityTable, DispersionError> {
    base_config.validate()?;
    let reference = base_config.errorparams;
    let mut table = SensitivityTable::default();

    for group in SweepGroup::ordered(base_config.flight.gnss_nav) {
        for scale in SCALE_FACTORS {
            let magnitudes = match group {
                SweepGroup::Source(source) => {
                    ErrorParams::isolated(source, reference.magnitude(source) * scale)
                }
                SweepGroup::Combined => reference.scaled_all(scale),
            };
            let step_config = base_config.with_error_params(magnitudes);
            let batch = run_batch(propagator, &step_config, run_dir)?;
            let summary = summarize(&batch, &step_config.aimpoint())?;
            table.rows.push(SensitivityRow {
                group,
                scale,
                magnitudes,
                cep: summary.cep,
            });
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagator::tests::test_config;
    use crate::propagator::SyntheticPropagator;
    use tempfile::tempdir;

    fn base_config(gnss_nav: bool) -> RunConfig {
        let mut config = test_config(10);
        config.flight.gnss_nav = gnss_nav;
        config.errorparams = ErrorParams {
            initial_pos_error: 1.0,
            initial_vel_error: 0.1,
            initial_angle_error: 1.0e-4,
            acc_scale_stability: 10.0,
            gyro_bias_stability: 1.0e-7,
            gyro_noise: 1.0e-8,
            gnss_noise: 5.0,
        };
        config
    }

    #[test]
    fn sweep_with_gnss_has_24_rows_in_8_groups() {
        let dir = tempdir().unwrap();
        let table =
            run_sweep(&SyntheticPropagator::new(1), &base_config(true), dir.path()).unwrap();
        assert_eq!(table.len(), 24);
        let groups = table.groups();
        assert_eq!(groups.len(), 8);
        assert_eq!(groups[6].0, SweepGroup::Source(ErrorSource::GnssNoise));
        assert_eq!(groups[7].0, SweepGroup::Combined);
    }

    #[test]
    fn sweep_without_gnss_has_21_rows_in_7_groups() {
        let dir = tempdir().unwrap();
        let table =
            run_sweep(&SyntheticPropagator::new(1), &base_config(false), dir.path()).unwrap();
        assert_eq!(table.len(), 21);
        let groups = table.groups();
        assert_eq!(groups.len(), 7);
        assert_eq!(groups[6].0, SweepGroup::Combined);
        assert!(groups
            .iter()
            .all(|(group, _)| *group != SweepGroup::Source(ErrorSource::GnssNoise)));
    }

    #[test]
    fn group_order_is_fixed() {
        let dir = tempdir().unwrap();
        let table =
            run_sweep(&SyntheticPropagator::new(1), &base_config(true), dir.path()).unwrap();
        let expected = [
            SweepGroup::Source(ErrorSource::Position),
            SweepGroup::Source(ErrorSource::Velocity),
            SweepGroup::Source(ErrorSource::Angle),
            SweepGroup::Source(ErrorSource::AccScale),
            SweepGroup::Source(ErrorSource::GyroBias),
            SweepGroup::Source(ErrorSource::GyroNoise),
            SweepGroup::Source(ErrorSource::GnssNoise),
            SweepGroup::Combined,
        ];
        let observed: Vec<SweepGroup> = table.groups().into_iter().map(|(g, _)| g).collect();
        assert_eq!(observed, expected);
        for (_, range) in table.groups() {
            let scales: Vec<f64> = table.rows[range].iter().map(|r| r.scale).collect();
            assert_eq!(scales, SCALE_FACTORS);
        }
    }

    #[test]
    fn single_source_rows_zero_the_other_six() {
        let dir = tempdir().unwrap();
        let table =
            run_sweep(&SyntheticPropagator::new(1), &base_config(true), dir.path()).unwrap();
        for row in &table.rows {
            let SweepGroup::Source(varied) = row.group else {
                continue;
            };
            for source in ErrorSource::ALL {
                if source != varied {
                    assert_eq!(row.magnitudes.magnitude(source), 0.0);
                }
            }
        }
    }

    #[test]
    fn combined_rows_scale_every_reference_magnitude() {
        let dir = tempdir().unwrap();
        let base = base_config(true);
        let table = run_sweep(&SyntheticPropagator::new(1), &base, dir.path()).unwrap();
        let combined: Vec<&SensitivityRow> = table
            .rows
            .iter()
            .filter(|row| row.group == SweepGroup::Combined)
            .collect();
        assert_eq!(combined.len(), 3);
        for row in combined {
            for source in ErrorSource::ALL {
                let expected = base.errorparams.magnitude(source) * row.scale;
                assert!((row.magnitudes.magnitude(source) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn cep_grows_with_isolated_magnitude() {
        let dir = tempdir().unwrap();
        let table =
            run_sweep(&SyntheticPropagator::new(1), &base_config(true), dir.path()).unwrap();
        for (group, range) in table.groups() {
            if group == SweepGroup::Combined {
                continue;
            }
            let rows = &table.rows[range];
            assert!(
                rows[0].cep < rows[1].cep && rows[1].cep < rows[2].cep,
                "{}: {} {} {}",
                group.label(),
                rows[0].cep,
                rows[1].cep,
                rows[2].cep
            );
        }
    }

    #[test]
    fn base_config_magnitudes_survive_the_sweep() {
        let dir = tempdir().unwrap();
        let base = base_config(true);
        let before = base.errorparams;
        run_sweep(&SyntheticPropagator::new(1), &base, dir.path()).unwrap();
        assert_eq!(base.errorparams, before);
    }

    #[test]
    fn failing_step_aborts_the_sweep() {
        struct FailingPropagator;

        impl Propagator for FailingPropagator {
            fn propagate_batch(&self, _: &RunConfig, _: &Path) -> Result<(), DispersionError> {
                Err(DispersionError::Propagation("collaborator lost".to_string()))
            }
        }

        let dir = tempdir().unwrap();
        assert!(matches!(
            run_sweep(&FailingPropagator, &base_config(true), dir.path()),
            Err(DispersionError::Propagation(_))
        ));
    }
}
