use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};

use crate::date::DateSource;

#[derive(Debug, Clone)]
pub struct Media {
    /// Full path on the card
    pub path: PathBuf,
    /// Just the filename
    pub filename: String,
    /// File size in bytes
    pub size: u64,
    /// Resolved date (capture date, else modification time)
    pub date: Option<NaiveDateTime>,
    /// Where `date` came from
    pub date_source: Option<DateSource>,
}

impl Media {
    pub fn new(path: PathBuf, filename: String, size: u64) -> Self {
        Self {
            path,
            filename,
            size,
            date: None,
            date_source: None,
        }
    }

    /// Calendar day the photo is filed under.
    pub fn day(&self) -> Option<NaiveDate> {
        self.date.map(|d| d.date())
    }
}
