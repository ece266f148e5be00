//! Capture-date extraction straight from container bytes.
//!
//! The sniffer picks one [`ContainerFormat`], the matching [`DateWalker`]
//! finds the raw date field, and [`decode`] turns it into a calendar value.
//! Every failure along the way ends as `None`: callers get a date or nothing.

pub mod bmff;
pub mod decode;
pub mod jpeg;
pub mod raf;
pub mod reader;
pub mod sniff;
pub mod tiff;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::error::{ParseError, Result};
use reader::ByteReader;

pub use sniff::{extension_kind, is_supported_extension, sniff, ContainerFormat, ExtensionKind};

/// Undecoded date value, borrowed from the byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDateValue<'a> {
    /// EXIF ASCII `YYYY:MM:DD HH:MM:SS`.
    Ascii(&'a [u8]),
    /// RAF binary date record.
    Packed([u8; raf::PACKED_DATE_LEN]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDateField<'a> {
    /// Walker that produced the value.
    pub format: ContainerFormat,
    pub value: RawDateValue<'a>,
}

/// Locates the capture date field inside one container family.
///
/// `Ok(None)` means the structure is sound but carries no date;
/// errors mean the structure itself could not be trusted.
pub trait DateWalker {
    fn find_date<'a>(&self, reader: &ByteReader<'a>) -> Result<Option<RawDateField<'a>>>;
}

impl ContainerFormat {
    pub fn walker(self) -> Option<&'static dyn DateWalker> {
        match self {
            ContainerFormat::JpegExif => Some(&jpeg::JpegWalker),
            ContainerFormat::TiffRaw => Some(&tiff::TiffWalker),
            ContainerFormat::BoxRaw => Some(&bmff::BoxWalker),
            ContainerFormat::FlatRaw => Some(&raf::FlatWalker),
            ContainerFormat::Unrecognized => None,
        }
    }
}

pub use decode::decode;

/// Capture date of a file's bytes, or `None` when it cannot be determined.
///
/// `extension` is the file name extension (with or without the dot); it only
/// matters when no signature matches. Never panics on malformed input.
pub fn extract_capture_date(bytes: &[u8], extension: &str) -> Option<NaiveDateTime> {
    match try_extract(bytes, extension) {
        Ok(Some(date)) => Some(date),
        Ok(None) => {
            debug!(extension, "no usable capture date in metadata");
            None
        }
        Err(err) => {
            debug!(extension, error = %err, "metadata walk failed");
            None
        }
    }
}

/// Same as [`extract_capture_date`] but keeps the reason for failure.
///
/// `Ok(None)` covers both a missing date tag and a date that does not decode
/// to a valid calendar value.
pub fn try_extract(bytes: &[u8], extension: &str) -> Result<Option<NaiveDateTime>> {
    if extension_kind(extension) == Some(ExtensionKind::NoMetadata) {
        return Ok(None);
    }

    let format = sniff(bytes, extension);
    let walker = format.walker().ok_or(ParseError::UnsupportedContainer)?;
    let raw = walker.find_date(&ByteReader::new(bytes))?;
    Ok(raw.and_then(|field| decode(&field.value)))
}
