use crate::config::PipelineConfig;
use crate::error::{ManifestError, Result};
use crate::inspect;
use crate::manifest::{self, Manifest};
use crate::persist::{self, PersistOutcome};
use crate::progress::ProgressHandle;
use crate::scan;
use crate::split;
use std::path::PathBuf;
use tracing::info;

pub struct BuildOutcome {
    pub manifest: Manifest,
    /// A failed write leaves `manifest` valid; the caller decides how to report it.
    pub persisted: std::result::Result<PersistOutcome, ManifestError>,
}

/// Enumerate, split, inspect and assemble. Nothing is written.
pub fn build_manifest(cfg: &PipelineConfig, progress: &ProgressHandle) -> Result<Manifest> {
    cfg.validate()?;

    progress.set_stage("scan");
    let files = scan::list_files(&cfg.dataset_dir)?;
    progress.set_total_files(files.len() as u64);
    progress.log(format!(
        "found {} files in {}",
        files.len(),
        cfg.dataset_dir.display()
    ));

    progress.set_stage("split");
    let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    let splits = split::assign_splits(&paths, &cfg.split)?;

    progress.set_stage("inspect");
    let inspections = inspect::inspect_all(&files, cfg.workers, |done| {
        progress.file_done(done.bytes_hashed);
        if done.hash.is_none() {
            progress.warn(format!("could not read {}", done.file.path.display()));
        }
    });

    progress.set_stage("assemble");
    let manifest = manifest::assemble(&splits, &inspections)?;
    let summary = &manifest.summary;
    if summary.has_hash_shortfall() {
        progress.warn(format!(
            "{} distinct hashes for {} files",
            summary.distinct_hashes, summary.total_rows
        ));
    }
    info!(
        rows = summary.total_rows,
        decode_failed = summary.decode_failed,
        distinct_hashes = summary.distinct_hashes,
        "manifest assembled"
    );
    Ok(manifest)
}

/// Builds the manifest, then writes the configured sinks.
pub fn run(cfg: &PipelineConfig, progress: &ProgressHandle) -> Result<BuildOutcome> {
    let manifest = build_manifest(cfg, progress)?;
    let persisted = if cfg.persist.is_enabled() {
        progress.set_stage("persist");
        persist::persist(&manifest.records, &cfg.persist)
    } else {
        Ok(PersistOutcome::default())
    };
    Ok(BuildOutcome {
        manifest,
        persisted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PersistConfig, SplitConfig};
    use crate::inspect::tests::write_pgm;
    use crate::progress::{ProgressConfig, ProgressMode, ProgressReporter};
    use crate::record::{Split, DECODE_ERROR_FORMAT};
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn quiet() -> ProgressReporter {
        ProgressReporter::new("test", 0, ProgressConfig::new(ProgressMode::Quiet))
    }

    fn config(dataset: &Path, out: &Path) -> PipelineConfig {
        PipelineConfig::new(dataset)
            .with_workers(2)
            .with_persist(PersistConfig {
                parquet: Some(out.join("manifest.parquet")),
                csv: Some(out.join("manifest.csv")),
            })
    }

    #[test]
    fn hundred_clean_images_split_and_hash() {
        let tmp = TempDir::new().expect("tempdir");
        let dataset = tmp.path().join("boss");
        fs::create_dir(&dataset).expect("mkdir");
        for i in 0..100u8 {
            write_pgm(&dataset.join(format!("{i}.pgm")), 512, 512, i);
        }

        let reporter = quiet();
        let outcome = run(&PipelineConfig::new(&dataset).with_persist(PersistConfig {
            parquet: Some(crate::config::default_parquet_path(&dataset)),
            csv: Some(tmp.path().join("manifest.csv")),
        }), &reporter.handle())
        .expect("run");
        let s = &outcome.manifest.summary;

        assert_eq!(s.total_rows, 100);
        assert_eq!(s.split_count(Split::Train), 70);
        assert_eq!(s.split_count(Split::Val), 15);
        assert_eq!(s.split_count(Split::Test), 15);
        assert_eq!(s.distinct_hashes, 100);
        assert!((s.decode_success_rate - 1.0).abs() < 1e-12);
        assert_eq!(s.distinct_dimensions, vec![(512, 512)]);
        assert_eq!(s.duplicate_rows, 0);

        let persisted = outcome.persisted.expect("persisted");
        assert_eq!(persisted.parquet, Some(tmp.path().join("manifest.parquet")));
        let reloaded = crate::persist::load_parquet(&tmp.path().join("manifest.parquet")).expect("reload");
        assert_eq!(reloaded, outcome.manifest.records);
    }

    #[test]
    fn one_corrupt_file_among_valid_images() {
        let tmp = TempDir::new().expect("tempdir");
        let dataset = tmp.path().join("mixed");
        fs::create_dir(&dataset).expect("mkdir");
        for i in 0..10u8 {
            write_pgm(&dataset.join(format!("cover_{i}.pgm")), 64, 64, i);
        }
        fs::write(dataset.join("cover_broken.pgm"), b"P5\n6").expect("write");

        let reporter = quiet();
        let m = build_manifest(&config(&dataset, tmp.path()), &reporter.handle()).expect("build");

        assert_eq!(m.records.len(), 11);
        assert_eq!(m.records.iter().filter(|r| r.decode_ok).count(), 10);
        let broken = m
            .records
            .iter()
            .find(|r| r.filename == "cover_broken.pgm")
            .expect("broken row");
        assert!(!broken.decode_ok);
        assert_eq!(broken.format.as_deref(), Some(DECODE_ERROR_FORMAT));
        assert_eq!(broken.width, None);
        assert_eq!(broken.height, None);
        assert!(broken.hash.is_some());
        assert_eq!(m.decode_errors.len(), 1);
        assert_eq!(m.decode_errors[0].0, "cover_broken.pgm");
    }

    #[test]
    fn empty_directory_writes_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        let dataset = tmp.path().join("empty");
        fs::create_dir(&dataset).expect("mkdir");

        let reporter = quiet();
        let err = run(&config(&dataset, tmp.path()), &reporter.handle())
            .err()
            .expect("empty dataset must fail");
        assert!(matches!(err, ManifestError::EmptyDataset(_)));
        assert!(!tmp.path().join("manifest.parquet").exists());
        assert!(!tmp.path().join("manifest.csv").exists());
    }

    #[test]
    fn bad_split_config_fails_before_scanning() {
        let tmp = TempDir::new().expect("tempdir");
        let cfg = config(&tmp.path().join("does_not_exist"), tmp.path()).with_split(SplitConfig {
            test_of_holdout: 0.0,
            ..SplitConfig::default()
        });
        let reporter = quiet();
        assert!(matches!(
            build_manifest(&cfg, &reporter.handle()),
            Err(ManifestError::InvalidSplitConfig(_))
        ));
    }

    #[test]
    fn worker_count_does_not_change_output() {
        let tmp = TempDir::new().expect("tempdir");
        let dataset = tmp.path().join("d");
        fs::create_dir(&dataset).expect("mkdir");
        for i in 0..30u8 {
            write_pgm(&dataset.join(format!("stego_{i:02}.pgm")), 16, 8, i);
        }

        let reporter = quiet();
        let seq = build_manifest(&config(&dataset, tmp.path()).with_workers(1), &reporter.handle())
            .expect("sequential");
        let par = build_manifest(&config(&dataset, tmp.path()).with_workers(4), &reporter.handle())
            .expect("parallel");
        assert_eq!(seq.records, par.records);
    }

    #[test]
    fn failed_persistence_keeps_the_manifest() {
        let tmp = TempDir::new().expect("tempdir");
        let dataset = tmp.path().join("d");
        fs::create_dir(&dataset).expect("mkdir");
        write_pgm(&dataset.join("cover.pgm"), 4, 4, 0);

        let cfg = PipelineConfig::new(&dataset).with_persist(PersistConfig {
            parquet: Some(tmp.path().join("no_such_dir").join("manifest.parquet")),
            csv: None,
        });
        let reporter = quiet();
        let outcome = run(&cfg, &reporter.handle()).expect("build succeeds");
        assert_eq!(outcome.manifest.records.len(), 1);
        assert!(matches!(
            outcome.persisted,
            Err(ManifestError::Persistence { .. })
        ));
    }

    #[test]
    fn duplicate_content_is_surfaced() {
        let tmp = TempDir::new().expect("tempdir");
        let dataset = tmp.path().join("d");
        fs::create_dir(&dataset).expect("mkdir");
        write_pgm(&dataset.join("cover_a.pgm"), 8, 8, 1);
        fs::copy(dataset.join("cover_a.pgm"), dataset.join("cover_b.pgm")).expect("copy");
        write_pgm(&dataset.join("cover_c.pgm"), 8, 8, 2);

        let reporter = quiet();
        let m = build_manifest(&config(&dataset, tmp.path()), &reporter.handle()).expect("build");
        assert_eq!(m.summary.distinct_hashes, 2);
        let hashes: HashSet<_> = m.records.iter().filter_map(|r| r.hash.clone()).collect();
        assert_eq!(hashes.len(), 2);
        assert_eq!(
            m.summary.duplicate_content,
            vec![vec!["cover_a.pgm".to_string(), "cover_b.pgm".to_string()]]
        );

        let outcome = reporter.finish("done");
        assert!(outcome.warnings.iter().any(|w| w.contains("2 distinct hashes for 3 files")));
    }

    #[cfg(unix)]
    #[test]
    fn undecodable_filenames_each_get_a_row() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().expect("tempdir");
        let dataset = tmp.path().join("d");
        fs::create_dir(&dataset).expect("mkdir");
        for (i, raw) in [&b"cover_\xff.pgm"[..], b"cover_\xfe.pgm", b"cover_ok.pgm"]
            .into_iter()
            .enumerate()
        {
            write_pgm(&dataset.join(OsStr::from_bytes(raw)), 8, 8, i as u8);
        }

        let reporter = quiet();
        let m = build_manifest(&config(&dataset, tmp.path()), &reporter.handle()).expect("build");
        assert_eq!(m.records.len(), 3);
        assert_eq!(m.summary.distinct_hashes, 3);
        assert_eq!(
            Split::ALL.iter().map(|s| m.summary.split_count(*s)).sum::<usize>(),
            3
        );
        let lossy = m
            .records
            .iter()
            .filter(|r| r.filename == "cover_\u{FFFD}.pgm")
            .count();
        assert_eq!(lossy, 2);
    }
}
