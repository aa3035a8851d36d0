use crate::error::{ManifestError, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_HOLDOUT: f64 = 0.30;
pub const DEFAULT_TEST_OF_HOLDOUT: f64 = 0.50;
pub const MANIFEST_PARQUET_NAME: &str = "manifest.parquet";
pub const MANIFEST_CSV_NAME: &str = "manifest.csv";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Fraction of all files set aside from training.
    pub holdout: f64,
    /// Fraction of the holdout that becomes the test set; the rest is val.
    pub test_of_holdout: f64,
    pub seed: u64,
    /// Seed the holdout split with the same seed as the first split.
    pub reuse_seed: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            holdout: DEFAULT_HOLDOUT,
            test_of_holdout: DEFAULT_TEST_OF_HOLDOUT,
            seed: DEFAULT_SEED,
            reuse_seed: true,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        check_fraction("holdout", self.holdout)?;
        check_fraction("test_of_holdout", self.test_of_holdout)?;
        Ok(())
    }

    /// Seed used for the val/test split of the holdout.
    pub fn holdout_seed(&self) -> u64 {
        if self.reuse_seed {
            self.seed
        } else {
            self.seed.wrapping_add(1)
        }
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ManifestError::InvalidSplitConfig(format!(
            "{name} must be in (0, 1), got {value}"
        )))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistConfig {
    pub parquet: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

impl PersistConfig {
    /// Snapshot next to the dataset directory, CSV in the working directory.
    pub fn standard(dataset_dir: &Path) -> Self {
        Self {
            parquet: Some(default_parquet_path(dataset_dir)),
            csv: Some(PathBuf::from(MANIFEST_CSV_NAME)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.parquet.is_some() || self.csv.is_some()
    }
}

/// `<parent-of-dataset-dir>/manifest.parquet`.
pub fn default_parquet_path(dataset_dir: &Path) -> PathBuf {
    match dataset_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(MANIFEST_PARQUET_NAME),
        _ => PathBuf::from(MANIFEST_PARQUET_NAME),
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dataset_dir: PathBuf,
    pub split: SplitConfig,
    pub persist: PersistConfig,
    /// Inspection threads. `1` runs strictly sequentially.
    pub workers: usize,
}

impl PipelineConfig {
    pub fn new(dataset_dir: impl Into<PathBuf>) -> Self {
        let dataset_dir = dataset_dir.into();
        Self {
            persist: PersistConfig::standard(&dataset_dir),
            dataset_dir,
            split: SplitConfig::default(),
            workers: num_cpus::get().max(1),
        }
    }

    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    pub fn with_persist(mut self, persist: PersistConfig) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.split.validate()
    }
}
