//! Manifest sinks: a Parquet snapshot that reloads into the same schema, and
//! a CSV export.

use crate::config::PersistConfig;
use crate::error::{ManifestError, Result};
use crate::record::{FileRecord, COLUMNS};
use arrow_array::cast::AsArray;
use arrow_array::types::UInt32Type;
use arrow_array::{Array, ArrayRef, BooleanArray, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub parquet: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

pub fn manifest_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(COLUMNS[0], DataType::Utf8, false),
        Field::new(COLUMNS[1], DataType::Utf8, false),
        Field::new(COLUMNS[2], DataType::Utf8, false),
        Field::new(COLUMNS[3], DataType::Utf8, false),
        Field::new(COLUMNS[4], DataType::Utf8, false),
        Field::new(COLUMNS[5], DataType::Utf8, true),
        Field::new(COLUMNS[6], DataType::UInt32, true),
        Field::new(COLUMNS[7], DataType::UInt32, true),
        Field::new(COLUMNS[8], DataType::Boolean, false),
        Field::new(COLUMNS[9], DataType::Utf8, true),
    ]))
}

fn to_batch(records: &[FileRecord]) -> std::result::Result<RecordBatch, arrow_schema::ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.filename.as_str()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.image_id.as_str()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.path.as_str()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.split.as_str()))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.cover_stego.as_str()))),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.format.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(records.iter().map(|r| r.width).collect::<Vec<_>>())),
        Arc::new(UInt32Array::from(records.iter().map(|r| r.height).collect::<Vec<_>>())),
        Arc::new(BooleanArray::from(records.iter().map(|r| r.decode_ok).collect::<Vec<_>>())),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.hash.as_deref()).collect::<Vec<_>>(),
        )),
    ];
    RecordBatch::try_new(manifest_schema(), columns)
}

pub fn write_parquet(records: &[FileRecord], path: &Path) -> Result<()> {
    let batch = to_batch(records).map_err(|e| ManifestError::persistence(path, e))?;
    let file = File::create(path).map_err(|e| ManifestError::persistence(path, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| ManifestError::persistence(path, e))?;
    writer
        .write(&batch)
        .map_err(|e| ManifestError::persistence(path, e))?;
    writer
        .close()
        .map_err(|e| ManifestError::persistence(path, e))?;
    Ok(())
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> std::result::Result<&'a StringArray, String> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_string_opt::<i32>())
        .ok_or_else(|| format!("column {name:?} missing or not utf8"))
}

fn u32_col<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> std::result::Result<&'a arrow_array::PrimitiveArray<UInt32Type>, String> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_primitive_opt::<UInt32Type>())
        .ok_or_else(|| format!("column {name:?} missing or not uint32"))
}

fn required(col: &StringArray, name: &str, row: usize) -> std::result::Result<String, String> {
    if col.is_null(row) {
        return Err(format!("null {name} at row {row}"));
    }
    Ok(col.value(row).to_string())
}

fn optional_str(col: &StringArray, row: usize) -> Option<String> {
    (!col.is_null(row)).then(|| col.value(row).to_string())
}

fn optional_u32(col: &arrow_array::PrimitiveArray<UInt32Type>, row: usize) -> Option<u32> {
    (!col.is_null(row)).then(|| col.value(row))
}

fn records_from_batch(batch: &RecordBatch, out: &mut Vec<FileRecord>) -> std::result::Result<(), String> {
    let filename = string_col(batch, "filename")?;
    let image_id = string_col(batch, "image_id")?;
    let path = string_col(batch, "path")?;
    let split = string_col(batch, "split")?;
    let cover_stego = string_col(batch, "cover_stego")?;
    let format = string_col(batch, "format")?;
    let width = u32_col(batch, "width")?;
    let height = u32_col(batch, "height")?;
    let decode_ok = batch
        .column_by_name("decode_ok")
        .and_then(|c| c.as_boolean_opt())
        .ok_or_else(|| "column \"decode_ok\" missing or not boolean".to_string())?;
    let hash = string_col(batch, "hash")?;

    for row in 0..batch.num_rows() {
        out.push(FileRecord {
            filename: required(filename, "filename", row)?,
            image_id: required(image_id, "image_id", row)?,
            path: required(path, "path", row)?,
            split: required(split, "split", row)?.parse()?,
            cover_stego: required(cover_stego, "cover_stego", row)?.parse()?,
            format: optional_str(format, row),
            width: optional_u32(width, row),
            height: optional_u32(height, row),
            decode_ok: !decode_ok.is_null(row) && decode_ok.value(row),
            hash: optional_str(hash, row),
        });
    }
    Ok(())
}

/// Reloads a snapshot written by [`write_parquet`].
pub fn load_parquet(path: &Path) -> Result<Vec<FileRecord>> {
    let file = File::open(path).map_err(|e| ManifestError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|b| b.build())
        .map_err(|e| ManifestError::persistence(path, e))?;

    let mut records = vec![];
    for batch in reader {
        let batch = batch.map_err(|e| ManifestError::persistence(path, e))?;
        records_from_batch(&batch, &mut records)
            .map_err(|reason| ManifestError::persistence(path, reason))?;
    }
    Ok(records)
}

pub fn write_csv(records: &[FileRecord], path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| ManifestError::persistence(path, e))?;
    // Header goes out explicitly so an empty table still carries the schema.
    wtr.write_record(COLUMNS)
        .map_err(|e| ManifestError::persistence(path, e))?;
    for rec in records {
        wtr.serialize(rec)
            .map_err(|e| ManifestError::persistence(path, e))?;
    }
    wtr.flush().map_err(|e| ManifestError::persistence(path, e))?;
    Ok(())
}

/// Writes the configured sinks. When both are enabled the CSV is exported from
/// the reloaded snapshot, so it reflects exactly what the snapshot holds.
pub fn persist(records: &[FileRecord], cfg: &PersistConfig) -> Result<PersistOutcome> {
    let mut outcome = PersistOutcome::default();

    if let Some(path) = &cfg.parquet {
        write_parquet(records, path)?;
        info!(path = %path.display(), rows = records.len(), "wrote parquet snapshot");
        outcome.parquet = Some(path.clone());
    }

    if let Some(path) = &cfg.csv {
        match &outcome.parquet {
            Some(snapshot) => write_csv(&load_parquet(snapshot)?, path)?,
            None => write_csv(records, path)?,
        }
        info!(path = %path.display(), "wrote csv export");
        outcome.csv = Some(path.clone());
    }

    Ok(outcome)
}
