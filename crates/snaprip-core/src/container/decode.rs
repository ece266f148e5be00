use chrono::{NaiveDate, NaiveDateTime};

use super::raf::PACKED_DATE_LEN;
use super::RawDateValue;

pub fn decode(value: &RawDateValue<'_>) -> Option<NaiveDateTime> {
    match value {
        RawDateValue::Ascii(bytes) => decode_ascii(bytes),
        RawDateValue::Packed(bytes) => decode_packed(bytes),
    }
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` value.
///
/// Trailing NULs and padding are ignored. Some writers use `-`, `/` or `.` in
/// the date part; those are accepted too. A value carrying only the date part
/// resolves to midnight. Anything that is not a real calendar moment
/// (e.g. `0000:00:00 00:00:00` from cameras with an unset clock) is `None`.
pub fn decode_ascii(bytes: &[u8]) -> Option<NaiveDateTime> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.trim_end_matches(['\0', ' ']).trim();

    let (date_part, time_part) = match text.split_once(' ') {
        Some((d, t)) => (d, Some(t.trim())),
        None => (text, None),
    };

    let mut date_fields = date_part.split([':', '-', '/', '.']);
    let year = parse_field(date_fields.next()?, 4)?;
    let month = parse_field(date_fields.next()?, 2)?;
    let day = parse_field(date_fields.next()?, 2)?;
    if date_fields.next().is_some() {
        return None;
    }

    let (hour, minute, second) = match time_part {
        Some(t) => {
            let mut time_fields = t.split(':');
            let h = parse_field(time_fields.next()?, 2)?;
            let m = parse_field(time_fields.next()?, 2)?;
            let s = parse_field(time_fields.next()?, 2)?;
            if time_fields.next().is_some() {
                return None;
            }
            (h, m, s)
        }
        None => (0, 0, 0),
    };

    to_datetime(year as i32, month, day, hour, minute, second)
}

/// Decode the 7-byte RAF date record: big-endian `u16` year, then one byte
/// each for month, day, hour, minute and second.
pub fn decode_packed(bytes: &[u8; PACKED_DATE_LEN]) -> Option<NaiveDateTime> {
    let year = u16::from_be_bytes([bytes[0], bytes[1]]);
    to_datetime(
        i32::from(year),
        u32::from(bytes[2]),
        u32::from(bytes[3]),
        u32::from(bytes[4]),
        u32::from(bytes[5]),
        u32::from(bytes[6]),
    )
}

fn parse_field(field: &str, width: usize) -> Option<u32> {
    if field.len() != width || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn to_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<NaiveDateTime> {
    if year == 0 {
        return None;
    }
    // and_hms_opt rejects second 60; leap seconds only exist in the nanosecond form
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
