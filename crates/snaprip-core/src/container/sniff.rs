use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;

/// Number of leading bytes the sniffer looks at.
pub const SNIFF_LEN: usize = 64;

/// Container family of a photo file, chosen once before walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerFormat {
    /// JPEG with an APP1 EXIF segment (HEIC is routed here by extension).
    JpegExif,
    /// Bare TIFF structure at offset 0: TIFF, DNG, CR2, NEF, ARW, ORF, RW2...
    TiffRaw,
    /// ISO base media boxes (Canon CR3).
    BoxRaw,
    /// Fujifilm RAF header with its own offset table.
    FlatRaw,
    Unrecognized,
}

/// What the file extension alone says about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    Walk(ContainerFormat),
    /// Supported photo type that carries no capture date worth walking for.
    NoMetadata,
}

/// Photo extensions the importer picks up, grouped by maker as cameras write them.
pub const SUPPORTED_EXTENSIONS: &[(&str, ExtensionKind)] = &[
    // Standard images
    ("jpg", ExtensionKind::Walk(ContainerFormat::JpegExif)),
    ("jpeg", ExtensionKind::Walk(ContainerFormat::JpegExif)),
    ("heic", ExtensionKind::Walk(ContainerFormat::JpegExif)),
    ("png", ExtensionKind::NoMetadata),
    ("tif", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("tiff", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Adobe / DJI / Ricoh
    ("dng", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Canon
    ("cr2", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("cr3", ExtensionKind::Walk(ContainerFormat::BoxRaw)),
    // Nikon
    ("nef", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("nrw", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Sony
    ("arw", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("srf", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("sr2", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Fujifilm
    ("raf", ExtensionKind::Walk(ContainerFormat::FlatRaw)),
    // Olympus
    ("orf", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Panasonic
    ("rw2", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("raw", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Phase One / Leaf
    ("iiq", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Pentax
    ("pef", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("ptx", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    // Hasselblad
    ("3fr", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
    ("fff", ExtensionKind::Walk(ContainerFormat::TiffRaw)),
];

static EXTENSION_TABLE: LazyLock<HashMap<&'static str, ExtensionKind>> =
    LazyLock::new(|| SUPPORTED_EXTENSIONS.iter().copied().collect());

const RAF_MAGIC: &[u8] = b"FUJIFILMCCD-RAW ";
const CR3_BRAND: &[u8; 4] = b"crx ";

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// Look up an extension (with or without the leading dot, any case).
pub fn extension_kind(ext: &str) -> Option<ExtensionKind> {
    EXTENSION_TABLE.get(normalize_extension(ext).as_str()).copied()
}

pub fn is_supported_extension(ext: &str) -> bool {
    extension_kind(ext).is_some()
}

/// Classify a file from its leading bytes, using the extension only when no
/// signature matches. Pure: same input, same answer.
pub fn sniff(header: &[u8], ext: &str) -> ContainerFormat {
    let header = &header[..header.len().min(SNIFF_LEN)];

    if is_jpeg(header) {
        ContainerFormat::JpegExif
    } else if is_tiff(header) {
        ContainerFormat::TiffRaw
    } else if is_cr3(header) {
        ContainerFormat::BoxRaw
    } else if header.starts_with(RAF_MAGIC) {
        ContainerFormat::FlatRaw
    } else {
        match extension_kind(ext) {
            Some(ExtensionKind::Walk(format)) => format,
            _ => ContainerFormat::Unrecognized,
        }
    }
}

fn is_jpeg(header: &[u8]) -> bool {
    // SOI followed by the next marker; APP1 may sit behind a JFIF APP0.
    header.len() >= 3 && header[0] == 0xFF && header[1] == 0xD8 && header[2] == 0xFF
}

fn is_tiff(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }
    let magic = match &header[..2] {
        b"II" => u16::from_le_bytes([header[2], header[3]]),
        b"MM" => u16::from_be_bytes([header[2], header[3]]),
        _ => return false,
    };
    super::tiff::is_tiff_magic(magic)
}

fn is_cr3(header: &[u8]) -> bool {
    if header.len() < 16 || &header[4..8] != b"ftyp" {
        return false;
    }
    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let end = size.clamp(16, header.len());
    // major brand, minor version, then compatible brands
    &header[8..12] == CR3_BRAND
        || header[16..end]
            .chunks_exact(4)
            .any(|brand| brand == CR3_BRAND)
}
