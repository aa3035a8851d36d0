use crate::error::{ManifestError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A regular file found directly inside the dataset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub filename: String,
    pub path: PathBuf,
}

/// Lists the regular files of `dir` (no recursion), sorted by filename.
///
/// `filename` is the lossy UTF-8 rendering used for display and persistence;
/// `path` keeps the exact bytes and identifies the file.
///
/// Symlinks count when they resolve to a regular file. Subdirectories and
/// dangling links are skipped.
pub fn list_files(dir: &Path) -> Result<Vec<DatasetFile>> {
    if !dir.is_dir() {
        return Err(ManifestError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files = vec![];
    let entries = std::fs::read_dir(dir).map_err(|e| ManifestError::io(dir, e))?;
    for entry in entries {
        let e = entry.map_err(|e| ManifestError::io(dir, e))?;
        let p = e.path();
        if !p.is_file() {
            debug!(path = %p.display(), "skipping non-file entry");
            continue;
        }
        files.push(DatasetFile {
            filename: e.file_name().to_string_lossy().to_string(),
            path: p,
        });
    }

    if files.is_empty() {
        return Err(ManifestError::EmptyDataset(dir.to_path_buf()));
    }

    // read_dir order is platform dependent; the split needs a stable input order.
    // Sorting on the raw name keeps lossy duplicates in a fixed order too.
    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_only_regular_files_in_name_order() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join("b.pgm"), b"b").expect("write");
        fs::write(tmp.path().join("a.pgm"), b"a").expect("write");
        fs::write(tmp.path().join("c"), b"c").expect("write");
        fs::create_dir(tmp.path().join("nested")).expect("mkdir");
        fs::write(tmp.path().join("nested/d.pgm"), b"d").expect("write");

        let files = list_files(tmp.path()).expect("list");
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pgm", "b.pgm", "c"]);
        assert_eq!(files[0].path, tmp.path().join("a.pgm"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir(tmp.path().join("only_a_dir")).expect("mkdir");
        let err = list_files(tmp.path()).unwrap_err();
        assert!(matches!(err, ManifestError::EmptyDataset(_)));
    }

    #[test]
    fn missing_or_non_directory_path_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let missing = tmp.path().join("nope");
        assert!(matches!(
            list_files(&missing),
            Err(ManifestError::DirectoryNotFound(_))
        ));

        let file = tmp.path().join("file.pgm");
        fs::write(&file, b"x").expect("write");
        assert!(matches!(
            list_files(&file),
            Err(ManifestError::DirectoryNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn undecodable_names_stay_separate_entries() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().expect("tempdir");
        for raw in [&b"cover_\xff.pgm"[..], b"cover_\xfe.pgm", b"cover_ok.pgm"] {
            fs::write(tmp.path().join(OsStr::from_bytes(raw)), raw).expect("write");
        }

        let files = list_files(tmp.path()).expect("list");
        assert_eq!(files.len(), 3);
        let raw_names: Vec<&[u8]> = files
            .iter()
            .map(|f| f.path.file_name().expect("name").as_bytes())
            .collect();
        assert_eq!(
            raw_names,
            vec![&b"cover_\xfe.pgm"[..], b"cover_\xff.pgm", b"cover_ok.pgm"]
        );
        assert_eq!(files[0].filename, files[1].filename);
    }
}
