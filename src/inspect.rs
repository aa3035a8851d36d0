//! Per-file inspection: content hash, image header, cover/stego label.
//!
//! Every operation here is local to one file. Failures are recorded on the
//! returned [`FileInspection`] and never abort the batch.

use crate::record::CoverStego;
use crate::scan::DatasetFile;
use image::{ImageFormat, ImageReader};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Read size for streaming hashes. Bounds memory on arbitrarily large files.
pub const HASH_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInspection {
    pub file: DatasetFile,
    pub image_id: String,
    pub cover_stego: CoverStego,
    pub header: Option<ImageHeader>,
    /// Decoder message when `header` is `None`. Not persisted.
    pub decode_error: Option<String>,
    pub hash: Option<String>,
    pub bytes_hashed: u64,
}

impl FileInspection {
    pub fn decode_ok(&self) -> bool {
        self.header.is_some()
    }
}

/// SHA-256 of the file content as lowercase hex, plus the byte count read.
pub fn hash_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match f.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// Reads only the image header. The format is sniffed from content, not the extension.
pub fn decode_header(path: &Path) -> Result<ImageHeader, String> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| e.to_string())?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions().map_err(|e| e.to_string())?;
    let format = format
        .map(format_name)
        .ok_or_else(|| "image format could not be determined".to_string())?;
    Ok(ImageHeader {
        width,
        height,
        format,
    })
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        // PGM/PBM/PPM all report as the PNM family.
        ImageFormat::Pnm => "PPM".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

/// "stego" is checked first, so a name containing both labels is stego.
pub fn classify_cover_stego(filename: &str) -> CoverStego {
    let name = filename.to_lowercase();
    if name.contains("stego") {
        CoverStego::Stego
    } else if name.contains("cover") {
        CoverStego::Cover
    } else {
        CoverStego::Unknown
    }
}

/// Filename without its last extension. A leading dot does not start an extension.
pub fn image_id_of(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

pub fn inspect_file(file: &DatasetFile) -> FileInspection {
    let (hash, bytes_hashed) = match hash_file(&file.path) {
        Ok((digest, n)) => (Some(digest), n),
        Err(e) => {
            warn!(path = %file.path.display(), error = %e, "hash failed");
            (None, 0)
        }
    };

    let (header, decode_error) = match decode_header(&file.path) {
        Ok(h) => (Some(h), None),
        Err(e) => {
            debug!(path = %file.path.display(), error = %e, "decode failed");
            (None, Some(e))
        }
    };

    FileInspection {
        image_id: image_id_of(&file.filename).to_string(),
        cover_stego: classify_cover_stego(&file.filename),
        file: file.clone(),
        header,
        decode_error,
        hash,
        bytes_hashed,
    }
}

/// Inspects every file, returning results in input order regardless of `workers`.
pub fn inspect_all<F>(files: &[DatasetFile], workers: usize, on_done: F) -> Vec<FileInspection>
where
    F: Fn(&FileInspection) + Sync,
{
    let run_one = |f: &DatasetFile| {
        let out = inspect_file(f);
        on_done(&out);
        out
    };

    if workers <= 1 {
        return files.iter().map(run_one).collect();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| files.par_iter().map(run_one).collect()),
        Err(e) => {
            warn!(error = %e, workers, "thread pool unavailable, inspecting sequentially");
            files.iter().map(run_one).collect()
        }
    }
}
