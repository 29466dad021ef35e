use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use rv_dispersion::output::{
    allocate_run_dir, copy_config_into, write_sensitivity_csv, write_summary_json,
    SENSITIVITY_FILE, SUMMARY_FILE,
};
use rv_dispersion::propagator::impact_file_path;
use rv_dispersion::{
    run_batch_summary, run_sweep, CommandPropagator, DistributionFit, Propagator, RunConfig,
    SyntheticPropagator,
};

#[derive(Debug, Parser)]
#[command(name = "rv-dispersion")]
#[command(about = "Monte Carlo impact dispersion and error-source sensitivity analysis")]
struct Cli {
    /// Run configuration (TOML)
    #[arg(long)]
    config: PathBuf,

    /// Output base directory; each run gets its own subdirectory
    #[arg(long, default_value = "output")]
    outdir: PathBuf,

    /// Run the full error-source sensitivity sweep instead of a single batch
    #[arg(long, default_value_t = false)]
    sweep: bool,

    /// External propagator executable, invoked as `<bin> <config.json> <run_dir>`.
    /// Defaults to the built-in synthetic surrogate.
    #[arg(long)]
    propagator: Option<PathBuf>,

    /// Seed for the synthetic surrogate
    #[arg(long, default_value_t = 2026)]
    seed: u64,

    /// Per-batch deadline in seconds for the external propagator
    #[arg(long)]
    batch_timeout_s: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RunConfig::from_toml_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let run_dir = allocate_run_dir(&cli.outdir, &config.run.name)?;
    copy_config_into(&cli.config, &run_dir)?;

    let propagator: Box<dyn Propagator> = match &cli.propagator {
        Some(program) => {
            let mut external = CommandPropagator::new(program.clone());
            if let Some(secs) = cli.batch_timeout_s {
                external = external.with_batch_deadline(Duration::from_secs(secs));
            }
            Box::new(external)
        }
        None => Box::new(SyntheticPropagator::new(cli.seed)),
    };

    if cli.sweep {
        let table = run_sweep(propagator.as_ref(), &config, &run_dir)?;
        let table_path = run_dir.join(SENSITIVITY_FILE);
        write_sensitivity_csv(&table_path, &table)?;

        println!(
            "Sweep complete: {} rows across {} groups",
            table.len(),
            table.groups().len()
        );
        for (group, range) in table.groups() {
            let ceps: Vec<String> = table.rows[range]
                .iter()
                .map(|row| format!("{:.3}", row.cep))
                .collect();
            println!("  {:<22} cep [m]: {}", group.label(), ceps.join(" | "));
        }
        println!("Sensitivity table: {}", table_path.display());
    } else {
        let (batch, summary) = run_batch_summary(propagator.as_ref(), &config, &run_dir)?;
        write_summary_json(&run_dir.join(SUMMARY_FILE), &summary)?;

        println!("Batch complete: {} impact records", batch.len());
        println!("CEP: {:.3} m", summary.cep);
        match summary.fit {
            DistributionFit::Fitted { gamma, nakagami } => {
                println!(
                    "Gamma fit: shape {:.4}, scale {:.4}",
                    gamma.shape, gamma.scale
                );
                println!(
                    "Nakagami fit: shape {:.4}, spread {:.4}",
                    nakagami.shape, nakagami.spread
                );
            }
            DistributionFit::Unfit { reason } => {
                println!("Distribution fit skipped: {reason:?}");
            }
        }
        println!("Impact data: {}", impact_file_path(&run_dir).display());
    }
    println!("Run directory: {}", run_dir.display());

    Ok(())
}
