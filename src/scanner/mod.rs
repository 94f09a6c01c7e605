//! Filesystem scanning pipeline: discovery, metadata extraction, file row
//! upserts, missing-file marking, and parallel fingerprint extraction.

pub mod discovery;
pub mod metadata;

use anyhow::Result;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{Database, NewFileRecord};
use crate::fingerprint::{self, ExtractPolicy};

pub use discovery::discover_images;
pub use metadata::ImageMetadata;

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { total_files: usize },
    Fingerprinting { current: usize, total: usize, path: String },
    Completed { scanned: usize, partial: usize, failed: usize },
    Error { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub discovered: usize,
    pub scanned: usize,
    /// Fingerprinted with content hashes only (decode failed).
    pub partial: usize,
    /// Could not be read at all.
    pub failed: usize,
    /// Previously tracked files no longer on disk.
    pub marked_missing: usize,
}

pub struct Scanner {
    config: Config,
}

impl Scanner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Scan one directory tree: register every discovered image, mark
    /// vanished files missing, then fingerprint in parallel. The cancel flag
    /// stops fingerprinting between files; work already stored stays stored.
    pub fn scan_directory(
        &self,
        directory: &Path,
        db: &Database,
        progress_tx: Option<mpsc::Sender<ScanProgress>>,
        cancel: Arc<AtomicBool>,
    ) -> Result<ScanResult> {
        let image_paths =
            discovery::discover_images(directory, &self.config.scanner.image_extensions)?;
        let mut result = ScanResult {
            discovered: image_paths.len(),
            ..ScanResult::default()
        };

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Started {
                total_files: image_paths.len(),
            });
        }

        // Discovery alone decides what is on disk; a registration failure
        // or a cancelled scan must not count a present file as vanished.
        let on_disk: HashSet<String> = image_paths
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect();

        // Register metadata serially; SQLite writes do not parallelize.
        let mut work: Vec<(i64, std::path::PathBuf)> = Vec::with_capacity(image_paths.len());
        for path in &image_paths {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            match self.register_file(db, path) {
                Ok(id) => {
                    work.push((id, path.clone()));
                }
                Err(e) => {
                    result.failed += 1;
                    tracing::warn!("cannot register {}: {}", path.display(), e);
                    if let Some(ref tx) = progress_tx {
                        let _ = tx.send(ScanProgress::Error {
                            message: format!("{}: {}", path.display(), e),
                        });
                    }
                }
            }
        }

        // Files under this directory that exist in the database but not on
        // disk anymore. Marked, never deleted.
        for (id, path) in db.paths_under(&directory.to_string_lossy())? {
            if !on_disk.contains(&path) {
                db.set_missing(id, true)?;
                result.marked_missing += 1;
                tracing::info!("marked missing: {}", path);
            }
        }

        let policy = self.config.grouping.extract_policy();
        let (scanned, partial, failed) =
            fingerprint_files(db, &work, &policy, progress_tx.as_ref(), &cancel);
        result.scanned = scanned;
        result.partial = partial;
        result.failed += failed;

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Completed {
                scanned: result.scanned,
                partial: result.partial,
                failed: result.failed,
            });
        }

        tracing::info!(
            "scan of {}: {} discovered, {} fingerprinted ({} partial), {} failed, {} missing",
            directory.display(),
            result.discovered,
            result.scanned,
            result.partial,
            result.failed,
            result.marked_missing
        );
        Ok(result)
    }

    fn register_file(&self, db: &Database, path: &Path) -> Result<i64> {
        let fs_meta = std::fs::metadata(path)?;
        let meta = metadata::extract_metadata(path).unwrap_or_default();

        db.upsert_file(&NewFileRecord {
            path: path.to_string_lossy().to_string(),
            size_bytes: fs_meta.len() as i64,
            modified_at: fs_meta
                .modified()
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).format("%Y-%m-%d %H:%M:%S").to_string()),
            width: meta.width,
            height: meta.height,
            taken_at: meta.taken_at,
            camera: meta.camera,
            format: meta.format,
        })
    }
}

/// Fingerprint the given files with a parallel extraction stage and a serial
/// store stage. Returns (stored, partial, failed).
fn fingerprint_files(
    db: &Database,
    work: &[(i64, std::path::PathBuf)],
    policy: &ExtractPolicy,
    progress_tx: Option<&mpsc::Sender<ScanProgress>>,
    cancel: &Arc<AtomicBool>,
) -> (usize, usize, usize) {
    let total = work.len();
    let counter = std::sync::atomic::AtomicUsize::new(0);

    let extractions: Vec<(i64, &Path, Result<fingerprint::Extraction, fingerprint::FingerprintError>)> =
        work.par_iter()
            .filter(|_| !cancel.load(Ordering::Relaxed))
            .map_with(progress_tx.cloned(), |tx, (id, path)| {
                let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(tx) = tx {
                    let _ = tx.send(ScanProgress::Fingerprinting {
                        current,
                        total,
                        path: path.to_string_lossy().to_string(),
                    });
                }
                (*id, path.as_path(), fingerprint::extract(*id, path, policy))
            })
            .collect();

    let mut stored = 0;
    let mut partial = 0;
    let mut failed = 0;
    for (_, path, extraction) in extractions {
        match extraction {
            Ok(extraction) => {
                if extraction.is_partial() {
                    partial += 1;
                }
                match db.store_fingerprint(&extraction.record) {
                    Ok(()) => stored += 1,
                    Err(e) => {
                        failed += 1;
                        tracing::warn!("cannot store fingerprint for {}: {}", path.display(), e);
                    }
                }
            }
            Err(e) => {
                failed += 1;
                tracing::warn!("cannot fingerprint {}: {}", path.display(), e);
            }
        }
    }
    (stored, partial, failed)
}
