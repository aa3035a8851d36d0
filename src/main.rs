mod config;
mod error;
mod inspect;
mod manifest;
mod persist;
mod pipeline;
mod progress;
mod record;
mod report;
mod scan;
mod split;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::HumanBytes;
use config::{
    PersistConfig, PipelineConfig, SplitConfig, DEFAULT_HOLDOUT, DEFAULT_SEED,
    DEFAULT_TEST_OF_HOLDOUT, MANIFEST_CSV_NAME,
};
use manifest::Manifest;
use progress::{format_duration, ProgressConfig, ProgressMode, ProgressReporter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stego-manifest",
    version,
    about = "Split-labeled metadata manifest for a cover/stego image dataset"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a dataset directory, build the manifest, print a summary and save it
    Build {
        /// Flat directory of image files
        #[arg(env = "STEGO_DATASET_DIR")]
        dataset_dir: PathBuf,

        /// Seed for the train/holdout and val/test shuffles
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Fraction of files held out from training
        #[arg(long, default_value_t = DEFAULT_HOLDOUT)]
        holdout: f64,

        /// Fraction of the holdout assigned to test (rest is val)
        #[arg(long, default_value_t = DEFAULT_TEST_OF_HOLDOUT)]
        test_of_holdout: f64,

        /// Seed the val/test shuffle independently instead of reusing --seed
        #[arg(long, default_value_t = false)]
        independent_seeds: bool,

        /// Inspection threads. Default: one per CPU. 1 = sequential.
        #[arg(long)]
        workers: Option<usize>,

        /// Parquet snapshot path. Default: manifest.parquet next to the dataset directory.
        #[arg(long, conflicts_with = "no_parquet")]
        parquet: Option<PathBuf>,

        /// Skip the Parquet snapshot.
        #[arg(long, default_value_t = false)]
        no_parquet: bool,

        /// CSV export path. Default: manifest.csv in the working directory.
        #[arg(long, conflicts_with = "no_csv")]
        csv: Option<PathBuf>,

        /// Skip the CSV export.
        #[arg(long, default_value_t = false)]
        no_csv: bool,

        /// Rows shown in the preview table.
        #[arg(long, default_value_t = 5)]
        head: usize,

        /// Print the summary as JSON instead of the text report.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
        #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
        progress: ProgressMode,
    },

    /// Reload a saved Parquet manifest and print its summary
    Show {
        manifest: PathBuf,

        /// Re-export the snapshot as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Rows shown in the preview table.
        #[arg(long, default_value_t = 5)]
        head: usize,

        /// Print the summary as JSON instead of the text report.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Build {
            dataset_dir,
            seed,
            holdout,
            test_of_holdout,
            independent_seeds,
            workers,
            parquet,
            no_parquet,
            csv,
            no_csv,
            head,
            json,
            progress,
        } => {
            let persist = PersistConfig {
                parquet: (!no_parquet)
                    .then(|| parquet.unwrap_or_else(|| config::default_parquet_path(&dataset_dir))),
                csv: (!no_csv).then(|| csv.unwrap_or_else(|| PathBuf::from(MANIFEST_CSV_NAME))),
            };
            let mut cfg = PipelineConfig::new(&dataset_dir)
                .with_split(SplitConfig {
                    holdout,
                    test_of_holdout,
                    seed,
                    reuse_seed: !independent_seeds,
                })
                .with_persist(persist);
            if let Some(w) = workers {
                cfg = cfg.with_workers(w);
            }

            let reporter = ProgressReporter::new("build", 0, ProgressConfig::new(progress));
            let outcome = pipeline::run(&cfg, &reporter.handle()).with_context(|| {
                format!("failed to build manifest for {}", dataset_dir.display())
            })?;
            let run = reporter.finish("manifest built");

            print_manifest(&outcome.manifest, head, json)?;
            let persisted = outcome
                .persisted
                .context("manifest was built but could not be saved")?;
            if !json {
                print!(
                    "{}",
                    report::render_persisted(&persisted, outcome.manifest.records.len())
                );
                println!(
                    "Build summary: duration={} files={}/{} hashed={} rate={:.1} files/s warnings={}",
                    format_duration(run.elapsed),
                    run.done_files,
                    run.total_files,
                    HumanBytes(run.bytes_hashed),
                    run.files_per_sec,
                    run.warning_count
                );
                for warning in run.warnings {
                    println!("  warning: {}", warning);
                }
            }
        }

        Commands::Show {
            manifest,
            csv,
            head,
            json,
        } => {
            let records = persist::load_parquet(&manifest)
                .with_context(|| format!("failed to load {}", manifest.display()))?;
            let loaded = Manifest::from_records(records);
            print_manifest(&loaded, head, json)?;
            if let Some(path) = csv {
                persist::write_csv(&loaded.records, &path)
                    .with_context(|| format!("failed to export {}", path.display()))?;
                if !json {
                    println!("CSV exported to: {}", path.display());
                }
            }
        }
    }

    Ok(())
}

fn print_manifest(manifest: &Manifest, head: usize, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(&manifest.summary)
            .context("failed to serialize summary")?;
        println!("{text}");
    } else {
        print!("{}", report::render_report(manifest, head));
    }
    Ok(())
}
