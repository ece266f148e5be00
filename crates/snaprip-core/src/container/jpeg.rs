use super::reader::{ByteOrder, ByteReader};
use super::tiff;
use super::{ContainerFormat, DateWalker, RawDateField, RawDateValue};
use crate::error::{ParseError, Result};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP1: u8 = 0xE1;
const TEM: u8 = 0x01;
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

fn is_standalone(marker: u8) -> bool {
    marker == TEM || (0xD0..=0xD7).contains(&marker)
}

/// Offset of the TIFF header inside the EXIF block, or `None` when the file
/// has no EXIF block.
///
/// JPEG files are walked segment by segment up to the start of scan. Anything
/// else (HEIC items) is searched for the `Exif\0\0` marker directly.
pub fn find_exif_payload(reader: &ByteReader<'_>) -> Result<Option<usize>> {
    if reader.array_at::<2>(0).ok() == Some([0xFF, SOI]) {
        find_app1(reader)
    } else {
        Ok(scan_for_exif(reader.as_slice()))
    }
}

fn find_app1(reader: &ByteReader<'_>) -> Result<Option<usize>> {
    let mut cur = *reader;
    cur.seek(2)?;

    loop {
        if cur.read_u8()? != 0xFF {
            return Err(ParseError::malformed(format!(
                "expected JPEG marker at offset {}",
                cur.position() - 1
            )));
        }
        let mut marker = cur.read_u8()?;
        while marker == 0xFF {
            marker = cur.read_u8()?;
        }

        match marker {
            SOS | EOI => return Ok(None),
            m if is_standalone(m) => continue,
            _ => {}
        }

        let len = cur.read_u16(ByteOrder::Big)? as usize;
        if len < 2 {
            return Err(ParseError::malformed(format!("JPEG segment length {len}")));
        }
        let payload_at = cur.position();
        let payload = cur.read_bytes(len - 2)?;

        if marker == APP1 && payload.starts_with(EXIF_HEADER) {
            return Ok(Some(payload_at + EXIF_HEADER.len()));
        }
    }
}

fn scan_for_exif(data: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = data[from..]
        .windows(EXIF_HEADER.len())
        .position(|w| w == EXIF_HEADER)
    {
        let tiff_at = from + found + EXIF_HEADER.len();
        if tiff::read_header(&ByteReader::new(&data[tiff_at..])).is_ok() {
            return Some(tiff_at);
        }
        from = from + found + 1;
    }
    None
}

/// Walker for JPEG (and HEIC) files carrying an EXIF block.
pub struct JpegWalker;

impl DateWalker for JpegWalker {
    fn find_date<'a>(&self, reader: &ByteReader<'a>) -> Result<Option<RawDateField<'a>>> {
        let Some(tiff_at) = find_exif_payload(reader)? else {
            return Ok(None);
        };
        let tags = tiff::read_date_tags(&reader.tail(tiff_at)?)?;
        Ok(tags.best().map(|bytes| RawDateField {
            format: ContainerFormat::JpegExif,
            value: RawDateValue::Ascii(bytes),
        }))
    }
}
