//! Synthetic container builders shared by the integration tests.
#![allow(dead_code)]

pub const TAG_DATE_TIME: u16 = 0x0132;
pub const TAG_EXIF_IFD: u16 = 0x8769;
pub const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;

fn ascii_entry(out: &mut Vec<u8>, tag: u16, len: usize, at: usize) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&(len as u32).to_le_bytes());
    out.extend_from_slice(&(at as u32).to_le_bytes());
}

fn pointer_entry(out: &mut Vec<u8>, tag: u16, target: usize) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(target as u32).to_le_bytes());
}

/// Little-endian TIFF: IFD0 with an optional DateTime and an EXIF pointer,
/// EXIF IFD with an optional DateTimeOriginal. Value bytes trail both IFDs.
pub fn tiff(date_time: Option<&str>, original: Option<&str>) -> Vec<u8> {
    let ifd0_entries = 1 + usize::from(date_time.is_some());
    let exif_at = 8 + 2 + ifd0_entries * 12 + 4;
    let exif_entries = usize::from(original.is_some());
    let mut data_at = exif_at + 2 + exif_entries * 12 + 4;
    let mut blobs = Vec::new();

    let mut out = b"II*\0\x08\0\0\0".to_vec();
    out.extend_from_slice(&(ifd0_entries as u16).to_le_bytes());
    if let Some(text) = date_time {
        let bytes = [text.as_bytes(), b"\0"].concat();
        ascii_entry(&mut out, TAG_DATE_TIME, bytes.len(), data_at);
        data_at += bytes.len();
        blobs.extend(bytes);
    }
    pointer_entry(&mut out, TAG_EXIF_IFD, exif_at);
    out.extend_from_slice(&0u32.to_le_bytes());

    out.extend_from_slice(&(exif_entries as u16).to_le_bytes());
    if let Some(text) = original {
        let bytes = [text.as_bytes(), b"\0"].concat();
        ascii_entry(&mut out, TAG_DATE_TIME_ORIGINAL, bytes.len(), data_at);
        blobs.extend(bytes);
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend(blobs);
    out
}

/// TIFF whose EXIF IFD points back at itself.
pub fn self_referencing_tiff() -> Vec<u8> {
    let mut out = b"II*\0\x08\0\0\0".to_vec();
    out.extend_from_slice(&1u16.to_le_bytes());
    pointer_entry(&mut out, TAG_EXIF_IFD, 26);
    out.extend_from_slice(&0u32.to_le_bytes());
    // EXIF IFD at 26 points to 26
    out.extend_from_slice(&1u16.to_le_bytes());
    pointer_entry(&mut out, TAG_EXIF_IFD, 26);
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

pub fn jpeg(tiff: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(tiff);
    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0xFF, 0xD9]);
    out
}

pub fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

pub const CANON_METADATA_UUID: [u8; 16] = [
    0x85, 0xc0, 0xb6, 0x87, 0x82, 0x0f, 0x11, 0xe0, 0x81, 0x11, 0xf4, 0xce, 0x46, 0x2b, 0x6a, 0x48,
];

/// CR3 with `cmt1`/`cmt2` in the Canon metadata box and a trailing mdat.
pub fn cr3(cmt1: &[u8], cmt2: &[u8]) -> Vec<u8> {
    let mut canon = CANON_METADATA_UUID.to_vec();
    canon.extend(boxed(b"CMT1", cmt1));
    canon.extend(boxed(b"CMT2", cmt2));

    let mut file = boxed(b"ftyp", b"crx \0\0\0\x01crx isom");
    file.extend(boxed(b"moov", &boxed(b"uuid", &canon)));
    file.extend(boxed(b"mdat", &[0x5A; 64]));
    file
}

/// RAF with the given records and no JPEG preview.
pub fn raf(records: &[(u16, &[u8])]) -> Vec<u8> {
    let mut out = b"FUJIFILMCCD-RAW 0201FF129502".to_vec();
    let mut model = b"X100V".to_vec();
    model.resize(32, 0);
    out.extend(model);
    out.extend_from_slice(b"0100");
    out.extend_from_slice(&[0; 20]);

    let mut dir = (records.len() as u32).to_be_bytes().to_vec();
    for (tag, payload) in records {
        dir.extend_from_slice(&tag.to_be_bytes());
        dir.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        dir.extend_from_slice(payload);
    }
    for (offset, len) in [(0u32, 0u32), (108, dir.len() as u32), (0, 0)] {
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
    }
    out.extend(dir);
    out
}
