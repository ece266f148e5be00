//! TIFF image file directory walker.
//!
//! Only walks as far as the capture date needs: IFD0 and the EXIF sub-IFD it
//! points at. The next-IFD chain (thumbnails, previews) is never followed.

use super::reader::{ByteOrder, ByteReader};
use super::{ContainerFormat, DateWalker, RawDateField, RawDateValue};
use crate::error::{ParseError, Result};

/// DateTime (IFD0): last modification of the image.
pub const TAG_DATE_TIME: u16 = 0x0132;
/// Pointer to the EXIF sub-IFD.
pub const TAG_EXIF_IFD: u16 = 0x8769;
pub const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
pub const TAG_DATE_TIME_DIGITIZED: u16 = 0x9004;

/// Standard TIFF magic.
pub const TIFF_MAGIC: u16 = 42;
/// Olympus ORF ("IIRO" / "IIRS").
pub const ORF_MAGIC: u16 = 0x4F52;
pub const ORF_MAGIC_ALT: u16 = 0x5352;
/// Panasonic RW2 ("IIU\0").
pub const RW2_MAGIC: u16 = 0x0055;

/// Size of one IFD entry in bytes.
pub const IFD_ENTRY_LEN: usize = 12;
pub const TIFF_HEADER_LEN: usize = 8;
/// Deepest EXIF pointer nesting accepted.
pub const MAX_IFD_DEPTH: usize = 2;

pub fn is_tiff_magic(magic: u16) -> bool {
    matches!(magic, TIFF_MAGIC | ORF_MAGIC | ORF_MAGIC_ALT | RW2_MAGIC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
    Ifd,
    Unknown(u16),
}

impl FieldType {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            6 => FieldType::SByte,
            7 => FieldType::Undefined,
            8 => FieldType::SShort,
            9 => FieldType::SLong,
            10 => FieldType::SRational,
            11 => FieldType::Float,
            12 => FieldType::Double,
            13 => FieldType::Ifd,
            other => FieldType::Unknown(other),
        }
    }

    pub fn unit_size(self) -> Option<usize> {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => Some(1),
            FieldType::Short | FieldType::SShort => Some(2),
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => Some(4),
            FieldType::Rational | FieldType::SRational | FieldType::Double => Some(8),
            FieldType::Unknown(_) => None,
        }
    }
}

/// One 12-byte directory entry.
///
/// `slot` is the position of the 4-byte value/offset field inside the byte
/// source. Values wider than the slot live elsewhere and the slot holds their
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: u16,
    pub field_type: FieldType,
    pub count: u32,
    pub slot: usize,
}

impl TagEntry {
    pub fn byte_len(&self) -> Option<usize> {
        self.field_type
            .unit_size()?
            .checked_mul(self.count as usize)
    }

    /// The entry's value bytes, dereferencing the slot when the value does not fit.
    pub fn value<'a>(&self, reader: &ByteReader<'a>, order: ByteOrder) -> Result<&'a [u8]> {
        let len = self.byte_len().ok_or_else(|| {
            ParseError::malformed(format!("tag {:#06x} has unknown field type", self.tag))
        })?;
        if len <= 4 {
            reader.bytes_at(self.slot, len)
        } else {
            let offset = reader.u32_at(self.slot, order)? as usize;
            reader.bytes_at(offset, len)
        }
    }

    /// Offset stored by a pointer tag such as [`TAG_EXIF_IFD`].
    pub fn pointer(&self, reader: &ByteReader<'_>, order: ByteOrder) -> Result<u32> {
        match self.field_type {
            FieldType::Long | FieldType::Ifd | FieldType::Undefined => reader.u32_at(self.slot, order),
            FieldType::Short => reader.u16_at(self.slot, order).map(u32::from),
            other => Err(ParseError::malformed(format!(
                "pointer tag {:#06x} has field type {:?}",
                self.tag, other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub order: ByteOrder,
    pub first_ifd: u32,
}

pub fn read_header(reader: &ByteReader<'_>) -> Result<TiffHeader> {
    let order = ByteOrder::from_marker(reader.array_at::<2>(0)?)
        .ok_or_else(|| ParseError::malformed("missing TIFF byte-order marker"))?;
    let magic = reader.u16_at(2, order)?;
    if !is_tiff_magic(magic) {
        return Err(ParseError::malformed(format!("bad TIFF magic {magic:#06x}")));
    }
    let first_ifd = reader.u32_at(4, order)?;
    Ok(TiffHeader { order, first_ifd })
}

/// Read the entries of the directory at `offset`.
pub fn read_ifd(reader: &ByteReader<'_>, order: ByteOrder, offset: usize) -> Result<Vec<TagEntry>> {
    let count = reader.u16_at(offset, order)? as usize;
    let start = offset + 2;
    // one bounds check for the whole table
    reader.bytes_at(start, count * IFD_ENTRY_LEN)?;

    (0..count)
        .map(|i| {
            let at = start + i * IFD_ENTRY_LEN;
            Ok(TagEntry {
                tag: reader.u16_at(at, order)?,
                field_type: FieldType::from_raw(reader.u16_at(at + 2, order)?),
                count: reader.u32_at(at + 4, order)?,
                slot: at + 8,
            })
        })
        .collect()
}

/// Raw date values found while walking, first occurrence of each kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateTags<'a> {
    pub original: Option<&'a [u8]>,
    pub digitized: Option<&'a [u8]>,
    /// IFD0 DateTime.
    pub modified: Option<&'a [u8]>,
}

impl<'a> DateTags<'a> {
    pub fn is_empty(&self) -> bool {
        self.original.is_none() && self.digitized.is_none() && self.modified.is_none()
    }

    /// Fill gaps in `self` from `other`.
    pub fn merge(self, other: DateTags<'a>) -> Self {
        Self {
            original: self.original.or(other.original),
            digitized: self.digitized.or(other.digitized),
            modified: self.modified.or(other.modified),
        }
    }

    /// The value to decode: original, then digitized, then DateTime.
    pub fn best(&self) -> Option<&'a [u8]> {
        self.original.or(self.digitized).or(self.modified)
    }
}

/// Walk a TIFF structure starting at offset 0 of `reader`.
pub fn read_date_tags<'a>(reader: &ByteReader<'a>) -> Result<DateTags<'a>> {
    let header = read_header(reader)?;
    let mut walk = IfdWalk::default();
    if header.first_ifd == 0 {
        return Ok(walk.tags);
    }
    walk_ifd(reader, header.order, header.first_ifd as usize, 0, &mut walk)?;
    Ok(walk.tags)
}

#[derive(Default)]
struct IfdWalk<'a> {
    tags: DateTags<'a>,
    /// Directories entered so far, in walk order.
    visited: Vec<usize>,
    /// Set once an EXIF pointer has been followed; later ones are ignored.
    exif_followed: bool,
}

fn walk_ifd<'a>(
    reader: &ByteReader<'a>,
    order: ByteOrder,
    offset: usize,
    depth: usize,
    walk: &mut IfdWalk<'a>,
) -> Result<()> {
    if depth > MAX_IFD_DEPTH {
        return Err(ParseError::malformed(format!(
            "EXIF pointer chain deeper than {MAX_IFD_DEPTH} at offset {offset}"
        )));
    }
    walk.visited.push(offset);

    for entry in read_ifd(reader, order, offset)? {
        match entry.tag {
            TAG_DATE_TIME_ORIGINAL if walk.tags.original.is_none() => {
                walk.tags.original = Some(entry.value(reader, order)?);
            }
            TAG_DATE_TIME_DIGITIZED if walk.tags.digitized.is_none() => {
                walk.tags.digitized = Some(entry.value(reader, order)?);
            }
            TAG_DATE_TIME if depth == 0 && walk.tags.modified.is_none() => {
                walk.tags.modified = Some(entry.value(reader, order)?);
            }
            TAG_EXIF_IFD => {
                let sub = entry.pointer(reader, order)? as usize;
                if sub == 0 {
                    continue;
                }
                if walk.visited.contains(&sub) {
                    return Err(ParseError::malformed(format!(
                        "EXIF pointer at IFD {offset} loops back to IFD {sub}"
                    )));
                }
                // one EXIF sub-IFD per file, repeats are not walked
                if walk.exif_followed {
                    continue;
                }
                walk.exif_followed = true;
                walk_ifd(reader, order, sub, depth + 1, walk)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Walker for files that are a TIFF structure from byte 0.
pub struct TiffWalker;

impl DateWalker for TiffWalker {
    fn find_date<'a>(&self, reader: &ByteReader<'a>) -> Result<Option<RawDateField<'a>>> {
        Ok(read_date_tags(reader)?.best().map(|bytes| RawDateField {
            format: ContainerFormat::TiffRaw,
            value: RawDateValue::Ascii(bytes),
        }))
    }
}
