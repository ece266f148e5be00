//! ISO base media box walker for Canon CR3.
//!
//! CR3 keeps its TIFF metadata in `moov / uuid(Canon) / CMT1..CMT4`. CMT1 holds
//! IFD0 and CMT2 the EXIF IFD, each as a self-contained TIFF block.

use super::reader::{ByteOrder, ByteReader};
use super::tiff::{self, DateTags};
use super::{ContainerFormat, DateWalker, RawDateField, RawDateValue};
use crate::error::{ParseError, Result};

/// User type of Canon's metadata `uuid` box.
pub const CANON_METADATA_UUID: [u8; 16] = [
    0x85, 0xc0, 0xb6, 0x87, 0x82, 0x0f, 0x11, 0xe0, 0x81, 0x11, 0xf4, 0xce, 0x46, 0x2b, 0x6a, 0x48,
];

/// Deepest container nesting walked.
pub const MAX_BOX_DEPTH: usize = 8;

const BOX_HEADER_LEN: usize = 8;
const LARGE_BOX_HEADER_LEN: usize = 16;
const USER_TYPE_LEN: usize = 16;

/// Embedded TIFF blocks carrying date tags.
const TIFF_BLOCKS: &[&[u8; 4]] = &[b"CMT1", b"CMT2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub kind: [u8; 4],
    pub offset: usize,
    /// Header bytes including the large-size field and `uuid` user type.
    pub header_len: usize,
    /// Total size including the header.
    pub size: usize,
    pub user_type: Option<[u8; 16]>,
}

impl BoxHeader {
    pub fn payload_start(&self) -> usize {
        self.offset + self.header_len
    }

    pub fn payload_len(&self) -> usize {
        self.size - self.header_len
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Read the box header at `offset`; the box must end at or before `parent_end`.
pub fn read_box_header(reader: &ByteReader<'_>, offset: usize, parent_end: usize) -> Result<BoxHeader> {
    let declared = reader.u32_at(offset, ByteOrder::Big)?;
    let kind = reader.array_at::<4>(offset + 4)?;

    let (size, mut header_len) = match declared {
        0 => (parent_end.saturating_sub(offset), BOX_HEADER_LEN),
        1 => {
            let large = reader.u64_at(offset + BOX_HEADER_LEN, ByteOrder::Big)?;
            let large = usize::try_from(large)
                .map_err(|_| ParseError::malformed(format!("box size {large} overflows")))?;
            (large, LARGE_BOX_HEADER_LEN)
        }
        n => (n as usize, BOX_HEADER_LEN),
    };

    let user_type = if &kind == b"uuid" {
        let uuid = reader.array_at::<USER_TYPE_LEN>(offset + header_len)?;
        header_len += USER_TYPE_LEN;
        Some(uuid)
    } else {
        None
    };

    if size < header_len {
        return Err(ParseError::malformed(format!(
            "box {} at {offset} declares size {size}, smaller than its header",
            String::from_utf8_lossy(&kind)
        )));
    }
    if offset.checked_add(size).map_or(true, |end| end > parent_end) {
        return Err(ParseError::malformed(format!(
            "box {} at {offset} (size {size}) overruns its parent ending at {parent_end}",
            String::from_utf8_lossy(&kind)
        )));
    }

    Ok(BoxHeader {
        kind,
        offset,
        header_len,
        size,
        user_type,
    })
}

#[derive(Default)]
struct BoxWalk<'a> {
    tags: DateTags<'a>,
    metadata_seen: bool,
}

fn walk_boxes<'a>(
    reader: &ByteReader<'a>,
    start: usize,
    end: usize,
    depth: usize,
    walk: &mut BoxWalk<'a>,
) -> Result<()> {
    if depth > MAX_BOX_DEPTH {
        return Err(ParseError::malformed(format!("boxes nested deeper than {MAX_BOX_DEPTH}")));
    }

    let mut pos = start;
    while pos < end {
        if end - pos < BOX_HEADER_LEN {
            return Err(ParseError::malformed(format!(
                "{} stray bytes at {pos} inside a box list",
                end - pos
            )));
        }
        let header = read_box_header(reader, pos, end)?;

        match &header.kind {
            b"moov" => {
                walk_boxes(reader, header.payload_start(), header.end(), depth + 1, walk)?;
            }
            b"uuid" if header.user_type == Some(CANON_METADATA_UUID) => {
                walk_boxes(reader, header.payload_start(), header.end(), depth + 1, walk)?;
                walk.metadata_seen = true;
            }
            kind if TIFF_BLOCKS.contains(&kind) => {
                let block = reader.window(header.payload_start(), header.payload_len())?;
                walk.tags = walk.tags.merge(tiff::read_date_tags(&block)?);
            }
            _ => {}
        }

        if walk.metadata_seen {
            return Ok(());
        }
        pos = header.end();
    }
    Ok(())
}

/// Walker for box-structured RAW files.
pub struct BoxWalker;

impl DateWalker for BoxWalker {
    fn find_date<'a>(&self, reader: &ByteReader<'a>) -> Result<Option<RawDateField<'a>>> {
        let mut walk = BoxWalk::default();
        walk_boxes(reader, 0, reader.len(), 0, &mut walk)?;
        Ok(walk.tags.best().map(|bytes| RawDateField {
            format: ContainerFormat::BoxRaw,
            value: RawDateValue::Ascii(bytes),
        }))
    }
}
