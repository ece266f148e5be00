use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::container;

/// Bytes read from the start of a file before metadata is walked. RAW headers
/// and their EXIF blocks sit well inside this; the pixel data behind them is
/// never needed.
pub const METADATA_WINDOW: u64 = 16 * 1024 * 1024;

/// Where a photo's date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateSource {
    /// Capture date embedded in the file.
    Metadata,
    /// File modification time, used when metadata has no usable date.
    ModifiedTime,
}

/// Result of date resolution: date + where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateResult {
    pub date: NaiveDateTime,
    pub source: DateSource,
}

/// Prefer the embedded capture date, else the modification time.
pub fn resolve_date(
    metadata_date: Option<NaiveDateTime>,
    modified: Option<NaiveDateTime>,
) -> Option<DateResult> {
    if let Some(date) = metadata_date {
        return Some(DateResult {
            date,
            source: DateSource::Metadata,
        });
    }
    modified.map(|date| DateResult {
        date,
        source: DateSource::ModifiedTime,
    })
}

/// Local modification time of a file, if the platform reports one.
pub fn modified_time(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}

/// Read the leading [`METADATA_WINDOW`] of a file and extract its capture date.
pub fn read_metadata_date(path: &Path) -> anyhow::Result<Option<NaiveDateTime>> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    file.take(METADATA_WINDOW).read_to_end(&mut bytes)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    Ok(container::extract_capture_date(&bytes, extension))
}

/// Capture date of the file at `path`, falling back to its modification time.
pub fn read_capture_date(path: &Path) -> anyhow::Result<DateResult> {
    let metadata_date = read_metadata_date(path)?;
    resolve_date(metadata_date, modified_time(path))
        .ok_or_else(|| anyhow::anyhow!("no capture date or modification time for {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::tiff::tests::build_tiff;
    use crate::container::tiff::TAG_DATE_TIME_ORIGINAL;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_prefers_metadata() {
        let meta = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        let mtime = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let r = resolve_date(Some(meta), Some(mtime)).unwrap();
        assert_eq!((r.date, r.source), (meta, DateSource::Metadata));

        let r = resolve_date(None, Some(mtime)).unwrap();
        assert_eq!((r.date, r.source), (mtime, DateSource::ModifiedTime));

        assert!(resolve_date(None, None).is_none());
    }

    #[test]
    fn test_read_capture_date_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("IMG_0001.DNG");
        let tiff = build_tiff(&[], &[(TAG_DATE_TIME_ORIGINAL, "2026:01:04 07:15:33")]);
        std::fs::write(&path, &tiff).unwrap();

        let r = read_capture_date(&path).unwrap();
        assert_eq!(r.source, DateSource::Metadata);
        assert_eq!(r.date.to_string(), "2026-01-04 07:15:33");
    }

    #[test]
    fn test_falls_back_to_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("IMG_0002.JPG");
        std::fs::write(&path, b"\xFF\xD8\xFF\xD9").unwrap();

        let mtime = NaiveDate::from_ymd_opt(2019, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let local = mtime.and_local_timezone(Local).single().unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(local.timestamp(), 0)).unwrap();

        let r = read_capture_date(&path).unwrap();
        assert_eq!(r.source, DateSource::ModifiedTime);
        assert_eq!(r.date, mtime);
    }
}
