//! Read the handful of EXIF fields the gallery shows for a photo.
//!
//! Values are returned "raw": numbers are rendered the way a decimal prints
//! (`50`, `4.5`), exposure time as `1/N` when it is a unit fraction, and
//! strings trimmed of their NUL padding. Presentation (`f/`, ` mm`, joining
//! make and model) is left to the caller.

pub mod error;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;

use exif::{Exif, Field, In, Rational, Reader, Tag, Value};
use exn::{OptionExt, ResultExt};
use std::io::Cursor;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// EXIF fields of one image, every one of them present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExifFields {
    pub make: String,
    pub model: String,
    /// Lens model string when the camera writes one, otherwise the
    /// LensSpecification quadruple rendered as `24-70mm f/2.8`, a range
    /// collapsing to one value when both ends match.
    pub lens: String,
    pub focal_length: String,
    pub f_number: String,
    pub exposure_time: String,
    pub iso: u32,
}

/// Parse the EXIF block out of an image container (JPEG, TIFF-based raw
/// formats, HEIF, PNG, WebP) and pull out every [`ExifFields`] field.
///
/// Fails as a whole if any single field is missing: callers never see a
/// partially-populated result.
#[instrument(level = "debug", skip(data), fields(size = data.len()))]
pub fn read_fields(data: &[u8]) -> Result<ExifFields> {
    let exif = Reader::new().read_from_container(&mut Cursor::new(data)).or_raise(|| ErrorKind::InvalidImage)?;
    Ok(ExifFields {
        make: ascii(&exif, Tag::Make, "make")?,
        model: ascii(&exif, Tag::Model, "model")?,
        lens: lens(&exif)?,
        focal_length: decimal(required(&exif, Tag::FocalLength, "focal length")?, "focal length")?,
        f_number: decimal(required(&exif, Tag::FNumber, "f-number")?, "f-number")?,
        exposure_time: exposure(required(&exif, Tag::ExposureTime, "exposure time")?)?,
        iso: required(&exif, Tag::PhotographicSensitivity, "iso")?
            .value
            .get_uint(0)
            .ok_or_raise(|| ErrorKind::MissingField("iso"))?,
    })
}

fn required<'a>(exif: &'a Exif, tag: Tag, name: &'static str) -> Result<&'a Field> {
    exif.get_field(tag, In::PRIMARY).ok_or_raise(|| ErrorKind::MissingField(name))
}

fn parse_error(field: &Field, name: &'static str) -> ErrorKind {
    ErrorKind::ParseError {
        field: name,
        value: field.display_value().to_string(),
    }
}

/// The first string of an ASCII field. `display_value()` would wrap it in
/// quotes, so the bytes are read directly.
fn ascii_value(field: &Field) -> Option<String> {
    let Value::Ascii(ref strings) = field.value else {
        return None;
    };
    let text = String::from_utf8_lossy(strings.first()?);
    let text = text.trim_matches(char::from(0)).trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn ascii(exif: &Exif, tag: Tag, name: &'static str) -> Result<String> {
    let field = required(exif, tag, name)?;
    ascii_value(field).ok_or_raise(|| ErrorKind::MissingField(name))
}

fn rationals(field: &Field) -> Option<&[Rational]> {
    match field.value {
        Value::Rational(ref values) if values.iter().all(|r| r.denom != 0) => Some(values),
        _ => None,
    }
}

/// Render a rational the way a decimal number prints: `50`, `4.5`, `5.6`.
fn render(value: &Rational) -> String {
    value.to_f64().to_string()
}

fn decimal(field: &Field, name: &'static str) -> Result<String> {
    let value = rationals(field).and_then(|v| v.first()).ok_or_raise(|| parse_error(field, name))?;
    Ok(render(value))
}

fn exposure(field: &Field) -> Result<String> {
    let value = rationals(field).and_then(|v| v.first()).ok_or_raise(|| parse_error(field, "exposure time"))?;
    Ok(render_exposure(value))
}

fn render_exposure(value: &Rational) -> String {
    if value.num != 0 && value.num < value.denom && value.denom % value.num == 0 {
        format!("1/{}", value.denom / value.num)
    } else {
        render(value)
    }
}

fn lens(exif: &Exif) -> Result<String> {
    if let Some(model) = exif.get_field(Tag::LensModel, In::PRIMARY).and_then(ascii_value) {
        return Ok(model);
    }
    let field = required(exif, Tag::LensSpecification, "lens")?;
    match rationals(field) {
        Some([min_focal, max_focal, min_f, max_f, ..]) => Ok(render_lens_specification(min_focal, max_focal, min_f, max_f)),
        _ => exn::bail!(parse_error(field, "lens")),
    }
}

fn render_lens_specification(min_focal: &Rational, max_focal: &Rational, min_f: &Rational, max_f: &Rational) -> String {
    let range = |low: &Rational, high: &Rational| {
        let (low, high) = (render(low), render(high));
        if low == high { low } else { format!("{low}-{high}") }
    };
    format!("{}mm f/{}", range(min_focal, max_focal), range(min_f, max_f))
}
