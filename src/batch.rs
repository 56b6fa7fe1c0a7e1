//! Apply, clear or rename across many files.
//!
//! Files are processed one after another. A failure on one file is recorded
//! in its [`BatchItem`] and the batch moves on; nothing is rolled back.
//! Cancellation is checked before each file, never in the middle of a write.
//!
//! # Example
//!
//! ```rust,no_run
//! use photo_meta::batch::{collect_images, Batch, BatchOp};
//! use photo_meta::NormalizedMetadata;
//! use std::path::PathBuf;
//!
//! let mut meta = NormalizedMetadata::new();
//! meta.set("XPSubject", "Training Event");
//!
//! let files = collect_images(&[PathBuf::from("./photos")]);
//! let report = Batch::new(BatchOp::Apply(meta))
//!     .on_progress(|p| println!("[{}/{}] {}", p.done, p.total, p.path.display()))
//!     .run(&files);
//! println!("{}", report.summary());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::codec::{clear_metadata, read_metadata, write_metadata, WriteMode, WriteOptions, WriteResult};
use crate::container::ImageFormat;
use crate::error::CodecError;
use crate::metadata::NormalizedMetadata;
use crate::rename::{rename_file, RenameRule};

/// What a batch does to each file.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Overlay these values onto each file's own metadata. Empty values
    /// remove the field.
    Apply(NormalizedMetadata),
    /// Remove all EXIF, XMP and IPTC.
    Clear,
    Rename(RenameRule),
}

impl BatchOp {
    fn verb(&self) -> &'static str {
        match self {
            BatchOp::Apply(_) => "apply",
            BatchOp::Clear => "clear",
            BatchOp::Rename(_) => "rename",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub write: WriteOptions,
    /// Write results here (same file name) instead of replacing the source.
    /// Ignored by rename.
    pub output_dir: Option<PathBuf>,
    /// Copy the source to `<name>.<ext>.bak` before replacing it.
    pub backup_originals: bool,
}

/// What happened to one file that succeeded.
#[derive(Debug)]
pub enum Done {
    Written(WriteResult),
    Renamed { to: PathBuf },
}

#[derive(Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub outcome: Result<Done, CodecError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per processed file, in order.
    pub items: Vec<BatchItem>,
    /// Files never reached because the batch was cancelled.
    pub not_processed: usize,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &CodecError)> {
        self.items
            .iter()
            .filter_map(|i| i.outcome.as_ref().err().map(|e| (i.path.as_path(), e)))
    }

    pub fn summary(&self) -> String {
        format!("Done: {} succeeded, {} failed", self.succeeded(), self.failed())
    }
}

/// Sent after each file.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    /// Files finished so far, this one included.
    pub done: usize,
    pub total: usize,
    pub path: PathBuf,
    /// The error, when this file failed.
    pub error: Option<String>,
}

type ProgressFn = Box<dyn FnMut(&BatchProgress) + Send>;

/// A configured batch operation.
pub struct Batch {
    op: BatchOp,
    options: BatchOptions,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressFn>,
}

impl Batch {
    pub fn new(op: BatchOp) -> Self {
        Self {
            op,
            options: BatchOptions::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a cancel flag. Setting it stops the batch before the next file.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(&BatchProgress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Process `paths` in order on the current thread.
    pub fn run(mut self, paths: &[PathBuf]) -> BatchReport {
        let total = paths.len();
        let mut report = BatchReport::default();
        log::info!("Starting {} on {total} file(s)", self.op.verb());
        if self.options.write.dry_run {
            log::info!("DRY RUN: no files will be modified");
        }

        for (i, path) in paths.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                report.not_processed = total - i;
                log::warn!("Cancelled after {i} of {total} file(s)");
                break;
            }

            log::info!("[{}/{}] {}", i + 1, total, path.display());
            let outcome = self.process(path, i);
            if let Err(e) = &outcome {
                log::error!("  {}: {e}", path.display());
            }

            if let Some(progress) = self.progress.as_mut() {
                progress(&BatchProgress {
                    done: i + 1,
                    total,
                    path: path.clone(),
                    error: outcome.as_ref().err().map(|e| e.to_string()),
                });
            }
            report.items.push(BatchItem {
                path: path.clone(),
                outcome,
            });
        }

        log::debug!("{}", report.summary());
        report
    }

    /// Run on a blocking worker, streaming progress over a channel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, paths: Vec<PathBuf>) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let Batch {
            op,
            options,
            cancel,
            progress: mut inner,
        } = self;
        let handle_cancel = Arc::clone(&cancel);
        let batch = Batch {
            op,
            options,
            cancel,
            progress: Some(Box::new(move |p: &BatchProgress| {
                if let Some(f) = inner.as_mut() {
                    f(p);
                }
                // The receiver may have been dropped; the batch still finishes.
                let _ = tx.send(p.clone());
            })),
        };
        let task = tokio::task::spawn_blocking(move || batch.run(&paths));
        BatchHandle {
            progress: rx,
            cancel: handle_cancel,
            task,
        }
    }

    fn process(&self, path: &Path, position: usize) -> Result<Done, CodecError> {
        match &self.op {
            BatchOp::Apply(overlay) => {
                let out = read_metadata(path)?;
                let mut merged = out.metadata;
                merged.merge(overlay);
                let mode = self.prepare(path)?;
                let result = write_metadata(path, &merged, &out.raw, &mode, self.options.write)?;
                for e in &result.field_errors {
                    log::warn!("  {e}");
                }
                if !result.skipped_fields.is_empty() {
                    log::info!("  Skipped: {}", result.skipped_fields.join(", "));
                }
                Ok(Done::Written(result))
            }
            BatchOp::Clear => {
                let mode = self.prepare(path)?;
                Ok(Done::Written(clear_metadata(path, &mode, self.options.write)?))
            }
            BatchOp::Rename(rule) => {
                let to = rule.target(path, position);
                if self.options.write.dry_run {
                    log::info!("[dry-run] would rename to {}", to.display());
                } else {
                    rename_file(path, &to)?;
                }
                Ok(Done::Renamed { to })
            }
        }
    }

    /// Work out where the result goes and take a backup when the source is
    /// about to be replaced.
    fn prepare(&self, path: &Path) -> Result<WriteMode, CodecError> {
        if let Some(dir) = &self.options.output_dir {
            fs::create_dir_all(dir).map_err(|e| CodecError::from_io(dir, e))?;
            let name = path.file_name().ok_or_else(|| CodecError::InvalidValue {
                field: "path".into(),
                reason: format!("{} has no file name", path.display()),
            })?;
            return Ok(WriteMode::SaveAs(dir.join(name)));
        }
        if self.options.backup_originals && !self.options.write.dry_run {
            backup_file(path)?;
        }
        Ok(WriteMode::Overwrite)
    }
}

/// A batch running on a worker thread.
pub struct BatchHandle {
    pub progress: mpsc::UnboundedReceiver<BatchProgress>,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// Stop before the next file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Wait for the worker to finish.
    pub async fn join(self) -> Result<BatchReport, tokio::task::JoinError> {
        self.task.await
    }
}

/// Apply `meta` to every file with default options.
pub fn apply_to_all(paths: &[PathBuf], meta: &NormalizedMetadata, options: BatchOptions) -> BatchReport {
    Batch::new(BatchOp::Apply(meta.clone())).options(options).run(paths)
}

/// Clear every file.
pub fn clear_all(paths: &[PathBuf], options: BatchOptions) -> BatchReport {
    Batch::new(BatchOp::Clear).options(options).run(paths)
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of files and directories. Directories are walked
/// recursively (following symlinks) in file-name order.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if ImageFormat::is_supported_path(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && ImageFormat::is_supported_path(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Copy `path` to `<path>.<ext>.bak` unless a backup already exists.
fn backup_file(path: &Path) -> Result<PathBuf, CodecError> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        fs::copy(path, &backup_path).map_err(|e| CodecError::from_io(&backup_path, e))?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMode;
    use std::io::Cursor;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn fixture(dir: &Path, name: &str) -> PathBuf {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 120, 200]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        let path = dir.join(name);
        fs::write(&path, out.into_inner()).unwrap();
        path
    }

    fn subject(text: &str) -> NormalizedMetadata {
        let mut meta = NormalizedMetadata::new();
        meta.set("XPSubject", text);
        meta
    }

    // ── collect ──

    #[test]
    fn collects_supported_files_in_order() {
        let dir = TempDir::new().unwrap();
        fixture(dir.path(), "b.jpg");
        fixture(dir.path(), "a.JPG");
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fixture(&dir.path().join("sub"), "c.jpeg");

        let found = collect_images(&[dir.path().to_path_buf(), dir.path().join("missing.jpg")]);
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.JPG", "b.jpg", "c.jpeg"]);
    }

    // ── apply / clear ──

    #[test]
    fn apply_keeps_each_files_own_fields() {
        let dir = TempDir::new().unwrap();
        let f1 = fixture(dir.path(), "f1.jpg");
        let f2 = fixture(dir.path(), "f2.jpg");
        let first = read_metadata(&f1).unwrap();
        let mut own = first.metadata.clone();
        own.set("Artist", "Lt. Reyes");
        write_metadata(&f1, &own, &first.raw, &WriteMode::Overwrite, WriteOptions::default()).unwrap();

        let report = apply_to_all(&[f1.clone(), f2.clone()], &subject("Training Event"), BatchOptions::default());
        assert_eq!(report.summary(), "Done: 2 succeeded, 0 failed");

        let a = read_metadata(&f1).unwrap().metadata;
        assert_eq!(a.text("Artist").as_deref(), Some("Lt. Reyes"));
        assert_eq!(a.text("XPSubject").as_deref(), Some("Training Event"));
        assert_eq!(a.text("dc:subject").as_deref(), Some("Training Event"));
        let b = read_metadata(&f2).unwrap().metadata;
        assert!(b.get("Artist").is_none());
        assert_eq!(b.text("XPSubject").as_deref(), Some("Training Event"));
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let f1 = fixture(dir.path(), "f1.jpg");
        let missing = dir.path().join("gone.jpg");
        let f3 = fixture(dir.path(), "f3.jpg");

        let report = apply_to_all(&[f1, missing.clone(), f3], &subject("x"), BatchOptions::default());
        assert_eq!((report.succeeded(), report.failed()), (2, 1));
        let (path, err) = report.failures().next().unwrap();
        assert_eq!(path, missing.as_path());
        assert!(matches!(err, CodecError::Io { .. }));
    }

    #[test]
    fn output_dir_leaves_sources_alone() {
        let dir = TempDir::new().unwrap();
        let f1 = fixture(dir.path(), "f1.jpg");
        let before = fs::read(&f1).unwrap();
        let out = dir.path().join("out");

        let options = BatchOptions {
            output_dir: Some(out.clone()),
            backup_originals: true,
            ..Default::default()
        };
        let report = apply_to_all(&[f1.clone()], &subject("copy"), options);
        assert_eq!(report.failed(), 0);
        assert_eq!(fs::read(&f1).unwrap(), before);
        assert!(!dir.path().join("f1.jpg.bak").exists());
        let copy = read_metadata(&out.join("f1.jpg")).unwrap().metadata;
        assert_eq!(copy.text("XPSubject").as_deref(), Some("copy"));
    }

    #[test]
    fn backup_then_clear() {
        let dir = TempDir::new().unwrap();
        let f1 = fixture(dir.path(), "f1.jpg");
        apply_to_all(&[f1.clone()], &subject("gone soon"), BatchOptions::default());
        let tagged = fs::read(&f1).unwrap();

        let options = BatchOptions {
            backup_originals: true,
            ..Default::default()
        };
        let report = clear_all(&[f1.clone()], options);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(fs::read(dir.path().join("f1.jpg.bak")).unwrap(), tagged);
        assert!(read_metadata(&f1).unwrap().metadata.is_empty());
    }

    // ── rename ──

    #[test]
    fn rename_batch_uses_positions() {
        let dir = TempDir::new().unwrap();
        let files = vec![fixture(dir.path(), "x.jpg"), fixture(dir.path(), "y.jpg")];
        let rule = RenameRule::new(RenameMode::Pattern { pattern: "event_{index}".into() }).padding(2);
        let report = Batch::new(BatchOp::Rename(rule)).run(&files);
        assert_eq!(report.succeeded(), 2);
        assert!(dir.path().join("event_01.jpg").exists());
        assert!(dir.path().join("event_02.jpg").exists());
        assert!(!files[0].exists());
    }

    #[test]
    fn rename_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let files = vec![fixture(dir.path(), "x.jpg")];
        let options = BatchOptions {
            write: WriteOptions {
                dry_run: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = Batch::new(BatchOp::Rename(RenameRule::new(RenameMode::Increment)))
            .options(options)
            .run(&files);
        assert!(matches!(&report.items[0].outcome, Ok(Done::Renamed { to }) if to.ends_with("x_1.jpg")));
        assert!(files[0].exists());
    }

    // ── cancel / progress ──

    #[test]
    fn cancel_stops_at_file_boundary() {
        let dir = TempDir::new().unwrap();
        let files: Vec<_> = (0..4).map(|i| fixture(dir.path(), &format!("f{i}.jpg"))).collect();
        let flag = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let report = {
            let flag = Arc::clone(&flag);
            let seen = Arc::clone(&seen);
            Batch::new(BatchOp::Apply(subject("partial")))
                .cancel_flag(Arc::clone(&flag))
                .on_progress(move |p| {
                    seen.lock().unwrap().push(p.done);
                    if p.done == 2 {
                        flag.store(true, Ordering::Relaxed);
                    }
                })
                .run(&files)
        };

        assert!(report.cancelled);
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.not_processed, 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        let untouched = read_metadata(&files[3]).unwrap().metadata;
        assert!(untouched.get("XPSubject").is_none());
    }

    #[tokio::test]
    async fn spawned_batch_streams_progress() {
        let dir = TempDir::new().unwrap();
        let files: Vec<_> = (0..3).map(|i| fixture(dir.path(), &format!("f{i}.jpg"))).collect();

        let mut handle = Batch::new(BatchOp::Clear).spawn(files);
        let mut updates = Vec::new();
        while let Some(p) = handle.progress.recv().await {
            updates.push((p.done, p.total, p.error.is_none()));
        }
        let report = handle.join().await.unwrap();
        assert_eq!(updates, vec![(1, 3, true), (2, 3, true), (3, 3, true)]);
        assert_eq!(report.summary(), "Done: 3 succeeded, 0 failed");
    }
}
