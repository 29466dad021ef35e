//! Run-directory layout and tabular artifact writers.
//!
//! Every run owns one directory under the output root holding the copied
//! input configuration, the impact file, the sensitivity table (for sweeps),
//! and the dispersion summary.

use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;

use crate::config::ErrorSource;
use crate::propagator::ImpactRecord;
use crate::stats::DispersionSummary;
use crate::sweep::SensitivityTable;
use crate::DispersionError;

pub const SENSITIVITY_FILE: &str = "sensitivity_data.csv";
pub const SUMMARY_FILE: &str = "summary.json";
pub const CONFIG_COPY_FILE: &str = "config.toml";

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

/// Allocate `<output_root>/<run_name>`, suffixing when the name is taken.
pub fn allocate_run_dir(output_root: &Path, run_name: &str) -> Result<PathBuf, DispersionError> {
    fs::create_dir_all(output_root)?;

    let mut run_dir = output_root.join(run_name);
    let mut counter = 1_u32;
    while run_dir.exists() {
        run_dir = output_root.join(format!("{run_name}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}

/// Copy the input configuration into the run directory for provenance.
pub fn copy_config_into(config_path: &Path, run_dir: &Path) -> Result<PathBuf, DispersionError> {
    let target = run_dir.join(CONFIG_COPY_FILE);
    fs::copy(config_path, &target)?;
    Ok(target)
}

/// Persist impact records: one header row, then one row per trial in trial
/// order.
pub fn write_impact_csv(path: &Path, records: &[ImpactRecord]) -> Result<(), DispersionError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["time_s", "x_m", "y_m", "z_m"])?;
    for record in records {
        writer.write_record([
            fmt_f64(record.time_s),
            fmt_f64(record.x_m),
            fmt_f64(record.y_m),
            fmt_f64(record.z_m),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Persist the sensitivity table: the seven magnitude columns in fixed order
/// plus the trailing CEP column, rows in emission order.
pub fn write_sensitivity_csv(
    path: &Path,
    table: &SensitivityTable,
) -> Result<(), DispersionError> {
    let mut writer = Writer::from_path(path)?;

    let mut header: Vec<&str> = ErrorSource::ALL
        .iter()
        .map(|source| source.field_name())
        .collect();
    header.push("cep");
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record: Vec<String> = row.magnitudes.as_array().map(fmt_f64).to_vec();
        record.push(fmt_f64(row.cep));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_summary_json(
    path: &Path,
    summary: &DispersionSummary,
) -> Result<(), DispersionError> {
    let data = serde_json::to_string_pretty(summary)?;
    fs::write(path, data)?;
    Ok(())
}
