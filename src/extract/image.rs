// Copyright (C) 2026  Caprica Software Limited
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! EXIF reading for images.

use std::{fs::File, io::BufReader};

use exif::{DateTime, Exif, In, Rational, Tag, Value};

use super::{DetectedFile, ExtractError};
use crate::model::{MediaRecord, MediaRecordBuilder};

/// Reads dimensions, capture date and GPS position.
///
/// An image without an EXIF block still yields a record titled after the
/// file.
pub(super) fn read_exif(file: &DetectedFile) -> Result<MediaRecord, ExtractError> {
    let handle = File::open(&file.path).map_err(|source| ExtractError::Io {
        path: file.path.clone(),
        source,
    })?;

    let mut builder = MediaRecordBuilder::new(file.path.as_str());
    builder
        .content_type(file.content_type.as_str())?
        .etag(file.etag.as_str())?
        .title(file.fallback_title())?
        .kind(file.kind)?;

    let exif = match exif::Reader::new().read_from_container(&mut BufReader::new(handle)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_) | exif::Error::BlankValue(_)) => return Ok(builder.build()?),
        Err(e) => return Err(file.decode_error(e)),
    };

    if let Some(width) = dimension(&exif, Tag::PixelXDimension, Tag::ImageWidth) {
        builder.width(width)?;
    }
    if let Some(height) = dimension(&exif, Tag::PixelYDimension, Tag::ImageLength) {
        builder.height(height)?;
    }
    if let Some(date) = capture_date(&exif) {
        builder.date(date)?;
    }
    if let (Some(latitude), Some(longitude)) = (
        coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S'),
        coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W'),
    ) {
        builder.latitude(latitude)?.longitude(longitude)?;
    }

    Ok(builder.build()?)
}

fn dimension(exif: &Exif, tag: Tag, fallback: Tag) -> Option<i32> {
    exif.get_field(tag, In::PRIMARY)
        .or_else(|| exif.get_field(fallback, In::PRIMARY))
        .and_then(|field| field.value.get_uint(0))
        .and_then(|v| i32::try_from(v).ok())
}

fn capture_date(exif: &Exif) -> Option<String> {
    let field = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))?;

    match &field.value {
        Value::Ascii(parts) => parts.first().and_then(|raw| format_date(raw)),
        _ => None,
    }
}

/// Converts an EXIF `YYYY:MM:DD HH:MM:SS` stamp to ISO 8601.
fn format_date(raw: &[u8]) -> Option<String> {
    let dt = DateTime::from_ascii(raw).ok()?;
    Some(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
    ))
}

fn coordinate(exif: &Exif, tag: Tag, reference: Tag, negative: u8) -> Option<f64> {
    let Value::Rational(parts) = &exif.get_field(tag, In::PRIMARY)?.value else {
        return None;
    };
    let degrees = dms_to_degrees(parts)?;

    let is_negative = exif
        .get_field(reference, In::PRIMARY)
        .is_some_and(|field| match &field.value {
            Value::Ascii(parts) => parts
                .first()
                .and_then(|s| s.first())
                .is_some_and(|c| c.eq_ignore_ascii_case(&negative)),
            _ => false,
        });

    Some(if is_negative { -degrees } else { degrees })
}

/// Degrees, minutes and seconds to decimal degrees.
fn dms_to_degrees(parts: &[Rational]) -> Option<f64> {
    let [degrees, minutes, seconds] = parts else {
        return None;
    };
    if degrees.denom == 0 || minutes.denom == 0 || seconds.denom == 0 {
        return None;
    }

    Some(degrees.to_f64() + minutes.to_f64() / 60.0 + seconds.to_f64() / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    #[test]
    fn converts_dms() {
        let degrees = dms_to_degrees(&[r(51, 1), r(30, 1), r(36, 1)]).unwrap();
        assert!((degrees - 51.51).abs() < 1e-9);

        assert_eq!(dms_to_degrees(&[r(1, 1), r(2, 1)]), None);
        assert_eq!(dms_to_degrees(&[r(1, 0), r(2, 1), r(3, 1)]), None);
    }

    #[test]
    fn formats_capture_date() {
        assert_eq!(
            format_date(b"2016:09:11 13:46:21").as_deref(),
            Some("2016-09-11T13:46:21")
        );
        assert_eq!(format_date(b"garbage"), None);
    }
}
