//! Upload validation, extraction and dataset discovery.
//!
//! All functions here are synchronous and touch the filesystem; the
//! orchestrator runs them on the blocking thread pool.

use crate::error::PipelineError;
use crate::pipeline::dataset::VectorDataset;
use log::{debug, warn};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

const ARCHIVE_EXTENSION: &str = ".zip";
const DATASET_EXTENSION: &str = "shp";

/// Checks the claimed file name and that the bytes decode as a zip archive.
pub fn validate_upload(
    file_name: &str,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<(), PipelineError> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(PipelineError::InvalidInput("file has no name".to_string()));
    }
    if !file_name.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
        return Err(PipelineError::InvalidInput(
            "the file must be a .zip archive containing the shapefile components".to_string(),
        ));
    }
    if bytes.is_empty() {
        return Err(PipelineError::InvalidInput("uploaded file is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(PipelineError::InvalidInput(format!(
            "uploaded file exceeds the {} MB limit",
            max_bytes / (1024 * 1024)
        )));
    }

    ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        debug!("Rejecting '{}': {}", file_name, e);
        PipelineError::CorruptArchive
    })?;
    Ok(())
}

/// Unpacks `zip_path` into `target_dir`, returning the number of files written.
///
/// Entries whose names would escape `target_dir` are skipped. Extraction
/// stops with `InvalidInput` once the decompressed bytes exceed `max_bytes`,
/// whatever sizes the archive declares.
pub fn extract_archive(
    zip_path: &Path,
    target_dir: &Path,
    max_bytes: u64,
) -> Result<usize, PipelineError> {
    let file = fs::File::open(zip_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        debug!("Failed to open archive {:?}: {}", zip_path, e);
        PipelineError::CorruptArchive
    })?;
    fs::create_dir_all(target_dir)?;

    let mut written = 0;
    let mut remaining = max_bytes;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            debug!("Failed to read archive entry {}: {}", i, e);
            PipelineError::CorruptArchive
        })?;
        let Some(rel_path) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = target_dir.join(&rel_path);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut outfile = fs::File::create(&out_path)?;
        let mut limited = (&mut entry).take(remaining.saturating_add(1));
        let copied = std::io::copy(&mut limited, &mut outfile).map_err(|e| {
            debug!("Failed to decompress {:?}: {}", rel_path, e);
            PipelineError::CorruptArchive
        })?;
        if copied > remaining {
            warn!("Archive {:?} expands beyond {} bytes", zip_path, max_bytes);
            return Err(PipelineError::InvalidInput(format!(
                "archive expands beyond the {} MB extraction limit",
                max_bytes / (1024 * 1024)
            )));
        }
        remaining -= copied;
        written += 1;
    }

    Ok(written)
}

/// Finds the primary `.shp` file below `dir`.
///
/// When several are present the lexicographically smallest relative path is
/// chosen so the result never depends on directory enumeration order.
/// macOS resource forks (`__MACOSX/`, `._*`) and hidden files are ignored.
pub fn locate_dataset(dir: &Path) -> Result<VectorDataset, PipelineError> {
    let mut candidates = Vec::new();
    collect_datasets(dir, dir, &mut candidates)?;
    candidates.sort();

    let mut candidates = candidates.into_iter();
    let chosen = candidates.next().ok_or(PipelineError::NoDatasetFound)?;
    let ignored: Vec<PathBuf> = candidates.collect();
    if !ignored.is_empty() {
        warn!(
            "Archive contains {} datasets; importing {:?} and ignoring {:?}",
            ignored.len() + 1,
            chosen,
            ignored
        );
    }

    VectorDataset::from_shp(dir.join(chosen))
}

fn collect_datasets(
    root: &Path,
    current: &Path,
    acc: &mut Vec<PathBuf>,
) -> Result<(), PipelineError> {
    for entry in fs::read_dir(current)? {
        let path = entry?.path();
        let rel = path.strip_prefix(root).map_err(|e| {
            PipelineError::Internal(format!("failed to compute relative path: {e}"))
        })?;
        if is_hidden(rel) {
            continue;
        }
        if path.is_dir() {
            collect_datasets(root, &path, acc)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(DATASET_EXTENSION))
        {
            acc.push(rel.to_path_buf());
        }
    }
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name == "__MACOSX"
        }
        _ => false,
    })
}
