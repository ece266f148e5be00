use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cancel::{CancellationToken, CancelledError};
use crate::media::Media;
use crate::ThrottledProgress;

/// Folder for photos without any date.
pub const UNKNOWN_DATE_DIR: &str = "date-unknown";

const INVALID_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// What to do when a destination file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Leave the existing file alone.
    #[default]
    Skip,
    /// Replace the existing file.
    Overwrite,
    /// Copy under a numbered name, e.g. `IMG_0001 (2).CR3`.
    Rename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyAction {
    Copy,
    Overwrite,
    Skip,
}

/// One planned copy of one photo to one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    /// Index into the media list
    pub media_index: usize,
    pub dest: PathBuf,
    pub action: CopyAction,
}

/// Result of the write phase.
#[derive(Debug, Default)]
pub struct WriteResult {
    pub files_written: u64,
    pub files_skipped: u64,
    pub warnings: Vec<String>,
}

/// Replace characters most filesystems reject, trim surrounding spaces and dots.
pub fn sanitize_shoot_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string()
}

/// `base/YYYY/YYYY-MM/YYYY-MM-DD[ shoot]`, or `base/date-unknown[ shoot]`.
pub fn build_folder_path(base: &Path, day: Option<NaiveDate>, shoot_name: &str) -> PathBuf {
    let Some(day) = day else {
        let leaf = if shoot_name.is_empty() {
            UNKNOWN_DATE_DIR.to_string()
        } else {
            format!("{} {}", UNKNOWN_DATE_DIR, shoot_name)
        };
        return base.join(leaf);
    };

    let leaf = if shoot_name.is_empty() {
        day.format("%Y-%m-%d").to_string()
    } else {
        format!("{} {}", day.format("%Y-%m-%d"), shoot_name)
    };
    base.join(day.format("%Y").to_string())
        .join(day.format("%Y-%m").to_string())
        .join(leaf)
}

/// Numbered variant of `filename`: `IMG_0001.CR3` -> `IMG_0001 (2).CR3`.
fn numbered_name(filename: &str, n: u32) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    }
}

/// Directory listings, read once per folder instead of one stat per file.
#[derive(Default)]
struct ExistingFiles {
    by_dir: HashMap<PathBuf, HashSet<OsString>>,
}

impl ExistingFiles {
    fn contains(&mut self, path: &Path) -> bool {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        self.by_dir
            .entry(dir.to_path_buf())
            .or_insert_with(|| {
                fs::read_dir(dir)
                    .map(|entries| entries.flatten().map(|e| e.file_name()).collect())
                    .unwrap_or_default()
            })
            .contains(name)
    }
}

/// Destination files that already exist, for every photo and destination.
pub fn find_conflicts(media: &[Media], destinations: &[PathBuf], shoot_name: &str) -> Vec<PathBuf> {
    let mut existing = ExistingFiles::default();
    let mut conflicts = Vec::new();
    for base in destinations {
        for m in media {
            let dest = build_folder_path(base, m.day(), shoot_name).join(&m.filename);
            if existing.contains(&dest) {
                conflicts.push(dest);
            }
        }
    }
    conflicts
}

/// Assign a destination path to every (photo, destination) pair.
///
/// Sequential: two photos of the same run that land on the same name are
/// always renamed, `policy` only decides about files already on disk.
pub fn plan_copies(
    media: &[Media],
    destinations: &[PathBuf],
    shoot_name: &str,
    policy: ConflictPolicy,
) -> Vec<CopyPlan> {
    let mut existing = ExistingFiles::default();
    let mut used_paths: HashSet<PathBuf> = HashSet::new();
    let mut plans = Vec::with_capacity(media.len() * destinations.len());

    for base in destinations {
        for (idx, m) in media.iter().enumerate() {
            let folder = build_folder_path(base, m.day(), shoot_name);
            let base_dest = folder.join(&m.filename);

            let taken_by_run = used_paths.contains(&base_dest);
            let on_disk = !taken_by_run && existing.contains(&base_dest);

            let (dest, action) = match (taken_by_run, on_disk, policy) {
                (false, false, _) => (base_dest, CopyAction::Copy),
                (false, true, ConflictPolicy::Skip) => (base_dest, CopyAction::Skip),
                (false, true, ConflictPolicy::Overwrite) => (base_dest, CopyAction::Overwrite),
                _ => {
                    let mut n = 2;
                    let dest = loop {
                        let candidate = folder.join(numbered_name(&m.filename, n));
                        if !used_paths.contains(&candidate) && !existing.contains(&candidate) {
                            break candidate;
                        }
                        n += 1;
                    };
                    (dest, CopyAction::Copy)
                }
            };

            used_paths.insert(dest.clone());
            plans.push(CopyPlan {
                media_index: idx,
                dest,
                action,
            });
        }
    }
    plans
}

/// Copy one file, keeping the source's access and modification times.
fn copy_preserving_times(src: &Path, dest: &Path) -> std::io::Result<()> {
    fs::copy(src, dest)?;
    let meta = fs::metadata(src)?;
    filetime::set_file_times(
        dest,
        filetime::FileTime::from_last_access_time(&meta),
        filetime::FileTime::from_last_modification_time(&meta),
    )
}

/// Execute a plan: create folders, then copy in parallel.
pub fn write_output(
    media: &[Media],
    plans: &[CopyPlan],
    progress: &ThrottledProgress,
    cancel_token: Option<&CancellationToken>,
) -> anyhow::Result<WriteResult> {
    let work: Vec<&CopyPlan> = plans.iter().filter(|p| p.action != CopyAction::Skip).collect();
    let files_skipped = (plans.len() - work.len()) as u64;

    // Create each destination folder once
    let mut created_dirs: HashSet<&Path> = HashSet::new();
    for plan in &work {
        if let Some(dir) = plan.dest.parent() {
            if created_dirs.insert(dir) {
                fs::create_dir_all(dir)?;
            }
        }
    }

    if work.is_empty() {
        return Ok(WriteResult {
            files_written: 0,
            files_skipped,
            warnings: Vec::new(),
        });
    }

    let total = work.len() as u64;
    let write_counter = AtomicU64::new(0);
    let written = AtomicU64::new(0);
    let cancelled = AtomicBool::new(false);
    let warnings: Mutex<Vec<String>> = Mutex::new(Vec::new());

    let num_threads = rayon::current_num_threads();
    let chunk_size = (work.len() + num_threads - 1) / num_threads;

    std::thread::scope(|s| -> anyhow::Result<()> {
        let handles: Vec<_> = work
            .chunks(chunk_size)
            .map(|chunk| {
                let write_counter = &write_counter;
                let written = &written;
                let cancelled = &cancelled;
                let warnings = &warnings;
                s.spawn(move || {
                    for plan in chunk {
                        if let Some(token) = cancel_token {
                            if token.check().is_err() {
                                cancelled.store(true, Ordering::SeqCst);
                                return;
                            }
                        }

                        let m = &media[plan.media_index];
                        match copy_preserving_times(&m.path, &plan.dest) {
                            Ok(()) => {
                                written.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(err) => {
                                warn!(src = %m.path.display(), dest = %plan.dest.display(), error = %err, "copy failed");
                                if let Ok(mut w) = warnings.lock() {
                                    w.push(format!("{}: {}", m.path.display(), err));
                                }
                            }
                        }

                        let current = write_counter.fetch_add(1, Ordering::Relaxed);
                        progress.report("copy", current, total, &m.filename);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join()
                .map_err(|_| anyhow::anyhow!("copy worker thread panicked"))?;
        }
        Ok(())
    })?;

    if cancelled.load(Ordering::SeqCst) {
        return Err(CancelledError.into());
    }

    Ok(WriteResult {
        files_written: written.into_inner(),
        files_skipped,
        warnings: warnings.into_inner().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::tempdir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(9, 30, 0).unwrap()
    }

    fn photo(dir: &Path, sub: &str, name: &str, date: Option<NaiveDateTime>) -> Media {
        let folder = dir.join(sub);
        fs::create_dir_all(&folder).unwrap();
        let path = folder.join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        let mut m = Media::new(path, name.to_string(), name.len() as u64);
        m.date = date;
        m
    }

    fn noop() -> impl Fn(&str, u64, u64, &str) + Send + Sync {
        |_: &str, _: u64, _: u64, _: &str| {}
    }

    #[test]
    fn test_sanitize_shoot_name() {
        assert_eq!(sanitize_shoot_name("Smith/Jones: Wedding?"), "Smith_Jones_ Wedding_");
        assert_eq!(sanitize_shoot_name("  ..Trip.. "), "Trip");
        assert_eq!(sanitize_shoot_name(""), "");
    }

    #[test]
    fn test_build_folder_path() {
        let base = Path::new("/photos");
        let d = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(
            build_folder_path(base, d, "Beach"),
            PathBuf::from("/photos/2024/2024-03/2024-03-09 Beach")
        );
        assert_eq!(build_folder_path(base, d, ""), PathBuf::from("/photos/2024/2024-03/2024-03-09"));
        assert_eq!(build_folder_path(base, None, ""), PathBuf::from("/photos/date-unknown"));
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("IMG_0001.CR3", 2), "IMG_0001 (2).CR3");
        assert_eq!(numbered_name("README", 3), "README (3)");
    }

    #[test]
    fn test_same_name_in_one_run_is_renamed() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let media = vec![
            photo(src.path(), "100CANON", "IMG_0001.JPG", Some(day(2024, 5, 1))),
            photo(src.path(), "101CANON", "IMG_0001.JPG", Some(day(2024, 5, 1))),
        ];
        let plans = plan_copies(&media, &[out.path().to_path_buf()], "", ConflictPolicy::Skip);
        let folder = out.path().join("2024/2024-05/2024-05-01");
        assert_eq!(plans[0].dest, folder.join("IMG_0001.JPG"));
        assert_eq!(plans[1].dest, folder.join("IMG_0001 (2).JPG"));
        assert!(plans.iter().all(|p| p.action == CopyAction::Copy));
    }

    #[test]
    fn test_conflict_policies() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let media = vec![photo(src.path(), "DCIM", "DSC_0007.NEF", Some(day(2023, 12, 31)))];
        let folder = out.path().join("2023/2023-12/2023-12-31 NYE");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("DSC_0007.NEF"), b"old").unwrap();
        let dests = [out.path().to_path_buf()];

        assert_eq!(find_conflicts(&media, &dests, "NYE"), vec![folder.join("DSC_0007.NEF")]);

        let skip = plan_copies(&media, &dests, "NYE", ConflictPolicy::Skip);
        assert_eq!(skip[0].action, CopyAction::Skip);

        let over = plan_copies(&media, &dests, "NYE", ConflictPolicy::Overwrite);
        assert_eq!(over[0].action, CopyAction::Overwrite);
        assert_eq!(over[0].dest, folder.join("DSC_0007.NEF"));

        let rename = plan_copies(&media, &dests, "NYE", ConflictPolicy::Rename);
        assert_eq!(rename[0].dest, folder.join("DSC_0007 (2).NEF"));
    }

    #[test]
    fn test_write_output_copies_and_keeps_mtime() {
        let src = tempdir().unwrap();
        let out_a = tempdir().unwrap();
        let out_b = tempdir().unwrap();
        let media = vec![
            photo(src.path(), "DCIM", "A.RAF", Some(day(2022, 1, 2))),
            photo(src.path(), "DCIM", "B.RAF", None),
        ];
        let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&media[0].path, mtime).unwrap();

        let dests = [out_a.path().to_path_buf(), out_b.path().to_path_buf()];
        let plans = plan_copies(&media, &dests, "", ConflictPolicy::Skip);
        let cb = noop();
        let tp = ThrottledProgress::new(&cb);
        let result = write_output(&media, &plans, &tp, None).unwrap();

        assert_eq!(result.files_written, 4);
        assert_eq!(result.files_skipped, 0);
        for out in [&out_a, &out_b] {
            let copied = out.path().join("2022/2022-01/2022-01-02/A.RAF");
            assert_eq!(fs::read(&copied).unwrap(), b"A.RAF");
            let meta = fs::metadata(&copied).unwrap();
            assert_eq!(filetime::FileTime::from_last_modification_time(&meta), mtime);
            assert!(out.path().join("date-unknown/B.RAF").exists());
        }
    }

    #[test]
    fn test_write_output_cancelled() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let media = vec![photo(src.path(), "DCIM", "C.ORF", Some(day(2021, 6, 6)))];
        let plans = plan_copies(&media, &[out.path().to_path_buf()], "", ConflictPolicy::Skip);

        let token = CancellationToken::new();
        token.cancel();
        let cb = noop();
        let tp = ThrottledProgress::new(&cb);
        let err = write_output(&media, &plans, &tp, Some(&token)).unwrap_err();
        assert!(err.downcast_ref::<CancelledError>().is_some());
    }
}
