pub mod cancel;
pub mod container;
pub mod date;
pub mod error;
pub mod media;
pub mod scan;
pub mod writer;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use cancel::{CancellationToken, CancelledError};
pub use container::{extract_capture_date, sniff, ContainerFormat};
pub use date::{read_capture_date, DateResult, DateSource};
pub use error::ParseError;
pub use writer::ConflictPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Card or folder to import from
    pub source: PathBuf,
    /// Library roots; every photo is copied to each of them
    pub destinations: Vec<PathBuf>,
    /// Optional label appended to each day folder
    #[serde(default)]
    pub shoot_name: String,
    #[serde(default)]
    pub conflict: ConflictPolicy,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub total_photos: u64,
    /// Distinct capture days
    pub days: u64,
    pub from_metadata: u64,
    pub from_mtime: u64,
    pub files_written: u64,
    pub files_skipped: u64,
    /// Copies that would be made (dry run) or were attempted
    pub planned: u64,
    /// Destination files that already existed
    #[serde(default)]
    pub conflicts: Vec<PathBuf>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Control options for an import run.
#[derive(Debug, Clone, Default)]
pub struct ImportControl {
    /// Cancellation token checked between files.
    pub cancel_token: Option<CancellationToken>,
}

impl ImportControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn check(&self) -> Result<(), CancelledError> {
        match self.cancel_token {
            Some(ref token) => token.check(),
            None => Ok(()),
        }
    }
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - std::time::Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Run the import pipeline: scan, date, plan, copy.
pub fn import(
    options: &ImportOptions,
    control: &ImportControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ImportResult> {
    let tp = ThrottledProgress::new(progress_callback);
    control.check()?;

    if options.destinations.is_empty() {
        anyhow::bail!("no destination folder given");
    }
    let shoot_name = writer::sanitize_shoot_name(&options.shoot_name);

    // Stage 1: Scan
    let mut media_list = scan::scan_source(&options.source, &tp)?;
    info!(photos = media_list.len(), source = %options.source.display(), "scan complete");
    if media_list.is_empty() {
        return Ok(ImportResult::default());
    }
    control.check()?;

    // Stage 2: Dates, one independent engine call per file
    let total = media_list.len() as u64;
    let counter = AtomicU64::new(0);
    let mut warnings: Vec<String> = media_list
        .par_iter_mut()
        .filter_map(|m| {
            let current = counter.fetch_add(1, Ordering::Relaxed);
            tp.report("date", current, total, &m.filename);
            match date::read_capture_date(&m.path) {
                Ok(result) => {
                    m.date = Some(result.date);
                    m.date_source = Some(result.source);
                    None
                }
                Err(err) => {
                    warn!(path = %m.path.display(), error = %err, "no date for photo");
                    Some(format!("{}: {}", m.path.display(), err))
                }
            }
        })
        .collect();
    control.check()?;

    let from_metadata = media_list
        .iter()
        .filter(|m| m.date_source == Some(DateSource::Metadata))
        .count() as u64;
    let from_mtime = media_list
        .iter()
        .filter(|m| m.date_source == Some(DateSource::ModifiedTime))
        .count() as u64;
    let days: BTreeSet<_> = media_list.iter().filter_map(|m| m.day()).collect();
    info!(days = days.len(), from_metadata, from_mtime, "dates resolved");

    // Stage 3: Plan
    let conflicts = writer::find_conflicts(&media_list, &options.destinations, &shoot_name);
    if !conflicts.is_empty() {
        info!(count = conflicts.len(), policy = ?options.conflict, "destination files already exist");
    }
    let plans = writer::plan_copies(&media_list, &options.destinations, &shoot_name, options.conflict);
    let planned = plans
        .iter()
        .filter(|p| p.action != writer::CopyAction::Skip)
        .count() as u64;

    let mut result = ImportResult {
        total_photos: total,
        days: days.len() as u64,
        from_metadata,
        from_mtime,
        files_written: 0,
        files_skipped: plans.len() as u64 - planned,
        planned,
        conflicts,
        warnings: Vec::new(),
    };

    if options.dry_run {
        info!(planned, "dry run, nothing copied");
        result.warnings = warnings;
        return Ok(result);
    }

    // Stage 4: Copy
    let write_result = writer::write_output(&media_list, &plans, &tp, control.cancel_token.as_ref())?;
    info!(
        written = write_result.files_written,
        skipped = write_result.files_skipped,
        "import complete"
    );
    warnings.extend(write_result.warnings);

    result.files_written = write_result.files_written;
    result.files_skipped = write_result.files_skipped;
    result.warnings = warnings;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::tiff::tests::build_tiff;
    use crate::container::tiff::TAG_DATE_TIME_ORIGINAL;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn noop(_: &str, _: u64, _: u64, _: &str) {}

    fn card(root: &Path) {
        let dir = root.join("DCIM/100CANON");
        fs::create_dir_all(&dir).unwrap();
        let tiff = build_tiff(&[], &[(TAG_DATE_TIME_ORIGINAL, "2026:01:04 07:15:33")]);
        fs::write(dir.join("IMG_0001.DNG"), &tiff).unwrap();
        fs::write(dir.join("IMG_0002.PNG"), b"\x89PNG\r\n\x1a\n").unwrap();
        fs::write(dir.join("._IMG_0001.DNG"), b"apple double").unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let mtime = filetime::FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(dir.join("IMG_0002.PNG"), mtime).unwrap();
    }

    fn options(source: &Path, dest: &Path) -> ImportOptions {
        ImportOptions {
            source: source.to_path_buf(),
            destinations: vec![dest.to_path_buf()],
            shoot_name: "Winter: Lake".to_string(),
            conflict: ConflictPolicy::Skip,
            dry_run: false,
        }
    }

    #[test]
    fn test_import_end_to_end() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        card(src.path());

        let result = import(&options(src.path(), out.path()), &ImportControl::new(), &noop).unwrap();
        assert_eq!(result.total_photos, 2);
        assert_eq!(result.from_metadata, 1);
        assert_eq!(result.from_mtime, 1);
        assert_eq!(result.files_written, 2);
        assert!(out
            .path()
            .join("2026/2026-01/2026-01-04 Winter_ Lake/IMG_0001.DNG")
            .exists());

        // second run finds everything in place
        let again = import(&options(src.path(), out.path()), &ImportControl::new(), &noop).unwrap();
        assert_eq!(again.conflicts.len(), 2);
        assert_eq!(again.files_written, 0);
        assert_eq!(again.files_skipped, 2);
    }

    #[test]
    fn test_import_dry_run_writes_nothing() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        card(src.path());

        let mut opts = options(src.path(), out.path());
        opts.dry_run = true;
        let result = import(&opts, &ImportControl::new(), &noop).unwrap();
        assert_eq!(result.planned, 2);
        assert_eq!(result.files_written, 0);
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_import_requires_destination() {
        let src = tempdir().unwrap();
        let mut opts = options(src.path(), src.path());
        opts.destinations.clear();
        assert!(import(&opts, &ImportControl::new(), &noop).is_err());
    }

    #[test]
    fn test_import_cancelled_before_start() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        card(src.path());

        let token = CancellationToken::new();
        token.cancel();
        let control = ImportControl::new().with_cancel_token(token);
        let err = import(&options(src.path(), out.path()), &control, &noop).unwrap_err();
        assert!(err.downcast_ref::<CancelledError>().is_some());
    }

    #[test]
    fn test_options_defaults_from_json() {
        let opts: ImportOptions =
            serde_json::from_str(r#"{"source": "/card", "destinations": ["/lib"]}"#).unwrap();
        assert_eq!(opts.conflict, ConflictPolicy::Skip);
        assert!(!opts.dry_run);
        assert!(opts.shoot_name.is_empty());
    }
}
