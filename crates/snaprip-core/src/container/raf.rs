//! Fujifilm RAF walker.
//!
//! Layout (all integers big-endian):
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! | 0      | 16   | magic `FUJIFILMCCD-RAW ` |
//! | 16     | 4    | format version, ASCII |
//! | 20     | 8    | camera id |
//! | 28     | 32   | camera model, NUL padded |
//! | 60     | 4    | directory version |
//! | 64     | 20   | reserved |
//! | 84     | 24   | offset table: (offset, length) of JPEG preview, record directory, CFA data |
//!
//! The record directory is a `u32` record count followed by `{u16 tag,
//! u16 size, payload}` records. Fujifilm does not document a capture date
//! record; cameras keep DateTimeOriginal in the EXIF block of the JPEG
//! preview, and that is where the date usually comes from. A record with tag
//! [`TAG_CAPTURE_DATE`] ([`PACKED_DATE_LEN`] bytes: `u16` year, then month,
//! day, hour, minute, second) is optional and wins when present.

use super::jpeg::JpegWalker;
use super::reader::{ByteOrder, ByteReader};
use super::{ContainerFormat, DateWalker, RawDateField, RawDateValue};
use crate::error::{ParseError, Result};
use tracing::debug;

pub const RAF_MAGIC: &[u8; 16] = b"FUJIFILMCCD-RAW ";
pub const OFFSET_TABLE_AT: usize = 84;
pub const HEADER_LEN: usize = OFFSET_TABLE_AT + 24;
pub const TAG_CAPTURE_DATE: u16 = 0x9300;
pub const PACKED_DATE_LEN: usize = 7;

const MODEL_AT: usize = 28;
const MODEL_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn is_empty(&self) -> bool {
        self.offset == 0 || self.len == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RafHeader {
    pub format_version: [u8; 4],
    pub model: String,
    pub jpeg: Span,
    pub records: Span,
}

pub fn read_header(reader: &ByteReader<'_>) -> Result<RafHeader> {
    if reader.bytes_at(0, RAF_MAGIC.len())? != RAF_MAGIC {
        return Err(ParseError::malformed("missing RAF magic"));
    }
    let model = reader.bytes_at(MODEL_AT, MODEL_LEN)?;
    let model_end = model.iter().position(|&b| b == 0).unwrap_or(MODEL_LEN);

    // the third pair (CFA data) is not needed for dating
    let mut table = reader.window(OFFSET_TABLE_AT, HEADER_LEN - OFFSET_TABLE_AT)?;
    let mut span = || -> Result<Span> {
        Ok(Span {
            offset: table.read_u32(ByteOrder::Big)? as usize,
            len: table.read_u32(ByteOrder::Big)? as usize,
        })
    };

    Ok(RafHeader {
        format_version: reader.array_at::<4>(16)?,
        model: String::from_utf8_lossy(&model[..model_end]).into_owned(),
        jpeg: span()?,
        records: span()?,
    })
}

/// Find the capture date record in the record directory. Unknown tags are
/// skipped; records that overrun the directory are malformed.
pub fn read_capture_record(reader: &ByteReader<'_>, records: Span) -> Result<Option<[u8; PACKED_DATE_LEN]>> {
    if records.is_empty() {
        return Ok(None);
    }
    let mut dir = reader.window(records.offset, records.len)?;
    if dir.remaining() < 4 {
        return Err(ParseError::malformed("RAF record directory too short for its count"));
    }
    let count = dir.read_u32(ByteOrder::Big)?;

    for index in 0..count {
        if dir.remaining() < 4 {
            return Err(ParseError::malformed(format!(
                "RAF record {index} of {count} starts past the directory end"
            )));
        }
        let tag = dir.read_u16(ByteOrder::Big)?;
        let size = dir.read_u16(ByteOrder::Big)? as usize;
        if dir.remaining() < size {
            return Err(ParseError::malformed(format!(
                "RAF record {tag:#06x} ({size} bytes) overruns the directory"
            )));
        }
        let payload = dir.read_bytes(size)?;

        if tag == TAG_CAPTURE_DATE {
            let packed: [u8; PACKED_DATE_LEN] = payload.try_into().map_err(|_| {
                ParseError::malformed(format!("RAF date record is {size} bytes, expected {PACKED_DATE_LEN}"))
            })?;
            return Ok(Some(packed));
        }
    }
    Ok(None)
}

/// Walker for Fujifilm RAF files.
pub struct FlatWalker;

impl DateWalker for FlatWalker {
    fn find_date<'a>(&self, reader: &ByteReader<'a>) -> Result<Option<RawDateField<'a>>> {
        let header = read_header(reader)?;

        if let Some(packed) = read_capture_record(reader, header.records)? {
            return Ok(Some(RawDateField {
                format: ContainerFormat::FlatRaw,
                value: RawDateValue::Packed(packed),
            }));
        }

        let version = String::from_utf8_lossy(&header.format_version);
        if header.jpeg.is_empty() {
            debug!(model = %header.model, %version, "RAF has neither a date record nor a preview");
            return Ok(None);
        }
        debug!(model = %header.model, %version, "no RAF date record, reading preview EXIF");
        let preview = reader.window(header.jpeg.offset, header.jpeg.len)?;
        Ok(JpegWalker.find_date(&preview)?.map(|raw| RawDateField {
            format: ContainerFormat::FlatRaw,
            value: raw.value,
        }))
    }
}
