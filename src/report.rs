use crate::manifest::{Manifest, ManifestSummary};
use crate::persist::PersistOutcome;
use crate::record::{CoverStego, FileRecord, Split, COLUMNS};
use std::fmt::Write as _;

const RULE_WIDTH: usize = 60;
/// Decoder messages listed before the rest are folded into a count.
const MAX_DECODE_ERRORS_SHOWN: usize = 10;
/// Leading hash characters kept in the preview table.
const HASH_PREVIEW_CHARS: usize = 12;

/// Renders the console report. Presentation only.
pub fn render_report(manifest: &Manifest, head: usize) -> String {
    let s = &manifest.summary;
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);

    let _ = writeln!(out, "{rule}\nDATASET SUMMARY\n{rule}");
    let _ = writeln!(out, "\nTotal images: {}", s.total_rows);

    let _ = writeln!(out, "\nSplit distribution:");
    for split in Split::ALL {
        let _ = writeln!(out, "  {:<10} {}", split.as_str(), s.split_count(split));
    }

    let _ = writeln!(out, "\nFormat distribution:");
    for (format, count) in sorted_by_count(s.format_counts.iter().map(|(k, v)| (k.clone(), *v))) {
        let _ = writeln!(out, "  {:<14} {}", format, count);
    }

    let _ = writeln!(out, "\nCover/Stego distribution:");
    for label in CoverStego::ALL {
        let count = s.cover_stego_counts.get(&label).copied().unwrap_or(0);
        if count > 0 {
            let _ = writeln!(out, "  {:<10} {}", label.as_str(), count);
        }
    }

    let _ = writeln!(out, "\nDecode success rate:");
    let _ = writeln!(
        out,
        "  ok={} failed={} ({:.2}%)",
        s.decode_ok,
        s.decode_failed,
        s.decode_success_rate * 100.0
    );
    for (name, msg) in manifest.decode_errors.iter().take(MAX_DECODE_ERRORS_SHOWN) {
        let _ = writeln!(out, "  decode error: {name}: {msg}");
    }
    if manifest.decode_errors.len() > MAX_DECODE_ERRORS_SHOWN {
        let _ = writeln!(
            out,
            "  ... and {} more decode errors",
            manifest.decode_errors.len() - MAX_DECODE_ERRORS_SHOWN
        );
    }

    let _ = writeln!(out, "\nUnique image dimensions:");
    if s.distinct_dimensions.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (w, h) in &s.distinct_dimensions {
        let _ = writeln!(out, "  {w}x{h}");
    }

    write_quality_checks(&mut out, s);

    let _ = writeln!(out, "\n{rule}\nFirst {} rows:\n{rule}", head.min(s.total_rows));
    out.push_str(&render_head(manifest.head(head)));
    out
}

fn write_quality_checks(out: &mut String, s: &ManifestSummary) {
    let _ = writeln!(out, "\nData quality checks:");
    let _ = writeln!(out, "  - Duplicate rows: {}", s.duplicate_rows);
    let _ = writeln!(out, "  - Missing values per column:");
    for (column, count) in &s.null_counts {
        let _ = writeln!(out, "      {:<12} {}", column, count);
    }
    let _ = writeln!(
        out,
        "  - Unique hashes: {} (should equal total images)",
        s.distinct_hashes
    );
    if s.has_hash_shortfall() {
        let _ = writeln!(
            out,
            "    warning: {} rows share content or could not be read",
            s.total_rows - s.distinct_hashes
        );
        for group in &s.duplicate_content {
            let _ = writeln!(out, "    same content: {}", group.join(", "));
        }
    }
}

fn sorted_by_count(entries: impl Iterator<Item = (String, usize)>) -> Vec<(String, usize)> {
    let mut v: Vec<_> = entries.collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

fn cells(rec: &FileRecord) -> [String; 10] {
    let opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    [
        rec.filename.clone(),
        rec.image_id.clone(),
        rec.path.clone(),
        rec.split.to_string(),
        rec.cover_stego.to_string(),
        opt(rec.format.clone()),
        opt(rec.width.map(|w| w.to_string())),
        opt(rec.height.map(|h| h.to_string())),
        rec.decode_ok.to_string(),
        // Full digests make the preview unreadable.
        opt(rec.hash.as_deref().map(preview_hash)),
    ]
}

fn preview_hash(hash: &str) -> String {
    let head: String = hash.chars().take(HASH_PREVIEW_CHARS).collect();
    format!("{head}…")
}

/// Left-aligned fixed-width table of `rows`.
pub fn render_head(rows: &[FileRecord]) -> String {
    let body: Vec<[String; 10]> = rows.iter().map(cells).collect();
    let mut widths = COLUMNS.map(|c| c.chars().count());
    for row in &body {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, row: &[String]| {
        let padded: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    let header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    line(&mut out, &header);
    for row in &body {
        line(&mut out, row);
    }
    out
}

pub fn render_persisted(outcome: &PersistOutcome, rows: usize) -> String {
    let mut out = String::new();
    if let Some(p) = &outcome.parquet {
        let _ = writeln!(out, "\nManifest saved to: {}", p.display());
        let _ = writeln!(out, "  Total rows: {rows}");
        let _ = writeln!(out, "  Columns: {}", COLUMNS.join(", "));
    }
    if let Some(p) = &outcome.csv {
        let _ = writeln!(out, "CSV exported to: {}", p.display());
    }
    out
}
