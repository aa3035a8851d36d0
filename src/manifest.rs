use crate::error::{ManifestError, Result};
use crate::inspect::FileInspection;
use crate::record::{CoverStego, FileRecord, Split, COLUMNS, DECODE_ERROR_FORMAT};
use crate::split::SplitAssignment;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// The assembled table plus the aggregates computed from it.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub records: Vec<FileRecord>,
    pub summary: ManifestSummary,
    /// `(filename, decoder message)` for every failed decode.
    pub decode_errors: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestSummary {
    pub total_rows: usize,
    pub split_counts: BTreeMap<Split, usize>,
    pub format_counts: BTreeMap<String, usize>,
    pub cover_stego_counts: BTreeMap<CoverStego, usize>,
    pub decode_ok: usize,
    pub decode_failed: usize,
    pub decode_success_rate: f64,
    pub distinct_dimensions: Vec<(u32, u32)>,
    pub distinct_hashes: usize,
    /// Groups of filenames sharing one digest, sorted.
    pub duplicate_content: Vec<Vec<String>>,
    pub duplicate_rows: usize,
    /// Per-column null counts in schema column order.
    pub null_counts: Vec<(String, usize)>,
}

impl ManifestSummary {
    pub fn from_records(records: &[FileRecord]) -> Self {
        let mut split_counts = BTreeMap::new();
        let mut format_counts = BTreeMap::new();
        let mut cover_stego_counts = BTreeMap::new();
        let mut dims = BTreeSet::new();
        let mut by_hash: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut nulls = [0usize; COLUMNS.len()];
        let mut decode_ok = 0usize;

        for rec in records {
            *split_counts.entry(rec.split).or_insert(0) += 1;
            *cover_stego_counts.entry(rec.cover_stego).or_insert(0) += 1;
            if let Some(fmt) = &rec.format {
                *format_counts.entry(fmt.clone()).or_insert(0) += 1;
            }
            if rec.decode_ok {
                decode_ok += 1;
                if let Some(d) = rec.dimensions() {
                    dims.insert(d);
                }
            }
            if let Some(h) = &rec.hash {
                by_hash.entry(h.as_str()).or_default().push(rec.filename.clone());
            }
            for (n, is_null) in nulls.iter_mut().zip(rec.null_mask()) {
                *n += usize::from(is_null);
            }
        }

        let mut unique_rows = HashSet::with_capacity(records.len());
        let duplicate_rows = records.iter().filter(|r| !unique_rows.insert(*r)).count();

        let total_rows = records.len();
        let duplicate_content = by_hash
            .values()
            .filter(|names| names.len() > 1)
            .map(|names| {
                let mut names = names.clone();
                names.sort();
                names
            })
            .collect();

        Self {
            total_rows,
            split_counts,
            format_counts,
            cover_stego_counts,
            decode_ok,
            decode_failed: total_rows - decode_ok,
            decode_success_rate: if total_rows == 0 {
                0.0
            } else {
                decode_ok as f64 / total_rows as f64
            },
            distinct_dimensions: dims.into_iter().collect(),
            distinct_hashes: by_hash.len(),
            duplicate_content,
            duplicate_rows,
            null_counts: COLUMNS
                .iter()
                .zip(nulls)
                .map(|(c, n)| (c.to_string(), n))
                .collect(),
        }
    }

    pub fn split_count(&self, split: Split) -> usize {
        self.split_counts.get(&split).copied().unwrap_or(0)
    }

    pub fn null_count(&self, column: &str) -> usize {
        self.null_counts
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// Fewer distinct digests than rows means repeated content (or unreadable files).
    pub fn has_hash_shortfall(&self) -> bool {
        self.distinct_hashes < self.total_rows
    }
}

fn to_record(inspection: &FileInspection, split: Split) -> FileRecord {
    let (format, width, height) = match &inspection.header {
        Some(h) => (Some(h.format.clone()), Some(h.width), Some(h.height)),
        None => (Some(DECODE_ERROR_FORMAT.to_string()), None, None),
    };
    FileRecord {
        filename: inspection.file.filename.clone(),
        image_id: inspection.image_id.clone(),
        path: inspection.file.path.to_string_lossy().to_string(),
        split,
        cover_stego: inspection.cover_stego,
        format,
        width,
        height,
        decode_ok: inspection.decode_ok(),
        hash: inspection.hash.clone(),
    }
}

/// Joins split labels with inspections, one row per inspected file in input order.
///
/// Splits are keyed on the file path, so names that only differ in bytes
/// lost by the lossy `filename` still join to their own row.
pub fn assemble(
    splits: &SplitAssignment<PathBuf>,
    inspections: &[FileInspection],
) -> Result<Manifest> {
    let mut records = Vec::with_capacity(inspections.len());
    let mut decode_errors = vec![];

    for inspection in inspections {
        let file = &inspection.file;
        let split = splits
            .get(&file.path)
            .ok_or_else(|| ManifestError::IncompleteJoin(file.path.display().to_string()))?;
        if let Some(msg) = &inspection.decode_error {
            decode_errors.push((file.filename.clone(), msg.clone()));
        }
        records.push(to_record(inspection, split));
    }

    if records.len() != splits.len() {
        // A split label with no inspected file behind it.
        let inspected: HashSet<&Path> = inspections.iter().map(|i| i.file.path.as_path()).collect();
        let orphan = Split::ALL
            .iter()
            .flat_map(|s| splits.names_in(*s))
            .find(|p| !inspected.contains(p.as_path()))
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        return Err(ManifestError::IncompleteJoin(orphan));
    }

    let summary = ManifestSummary::from_records(&records);
    Ok(Manifest {
        records,
        summary,
        decode_errors,
    })
}

impl Manifest {
    /// Wraps records loaded from a snapshot; decoder messages are not persisted.
    pub fn from_records(records: Vec<FileRecord>) -> Self {
        let summary = ManifestSummary::from_records(&records);
        Self {
            records,
            summary,
            decode_errors: vec![],
        }
    }

    pub fn head(&self, n: usize) -> &[FileRecord] {
        &self.records[..n.min(self.records.len())]
    }
}
