use crate::models::PhotoRecord;
use crate::reload::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use serde_json::Value;
use shutter_exif::ExifFields;
use shutter_storage::{BackendHandle, validate_file_name};
use std::path::Path;

/// The variant whose EXIF data describes the photo.
const SOURCE_VARIANT: &str = "raw";

/// Read the EXIF data of the record's `raw` variant and return a copy of the
/// record carrying the display fields derived from it.
///
/// All or nothing: on any error the caller still holds the original record,
/// and no field has been touched.
pub(crate) async fn enrich(backend: &BackendHandle, record: &PhotoRecord) -> Result<PhotoRecord> {
    let raw = record.variant(SOURCE_VARIANT).ok_or_raise(|| ErrorKind::MissingVariant(SOURCE_VARIANT))?;
    let raw = validate_file_name(raw).or_raise(|| ErrorKind::MissingVariant(SOURCE_VARIANT))?;
    let bytes = backend.read(&Path::new(&record.id).join(raw)).await.or_raise(|| ErrorKind::Storage)?;
    let fields = shutter_exif::read_fields(&bytes).or_raise(|| ErrorKind::Exif)?;
    Ok(apply(record.clone(), fields))
}

/// Format raw EXIF values the way the gallery displays them.
pub(crate) fn apply(mut record: PhotoRecord, fields: ExifFields) -> PhotoRecord {
    let focal_length = fields.focal_length.split('.').next().unwrap_or_default();
    record.camera = Some(format!("{} {}", fields.make, fields.model));
    record.lens = Some(fields.lens);
    record.focal_length = Some(format!("{focal_length} mm"));
    record.f_number = Some(format!("f/{}", fields.f_number));
    record.shutter_speed = Some(Value::String(fields.exposure_time));
    record.iso = Some(Value::from(fields.iso));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tags;
    use rstest::rstest;
    use serde_json::json;
    use shutter_storage::backend::MockBackend;
    use std::sync::Arc;

    const ID: &str = "0b6f9f4e-3c1a-4b59-9d0c-8f6d2f0a7e11";

    fn fields(focal_length: &str) -> ExifFields {
        ExifFields {
            make: "SONY".to_string(),
            model: "ILCE-7M3".to_string(),
            lens: "FE 24-70mm F2.8 GM".to_string(),
            focal_length: focal_length.to_string(),
            f_number: "5.6".to_string(),
            exposure_time: "1/250".to_string(),
            iso: 100,
        }
    }

    fn record_with_raw(raw: Option<&str>) -> PhotoRecord {
        let mut record = PhotoRecord::new(ID, Tags::from([("wildlife".to_string(), true)]), 1);
        if let Some(raw) = raw {
            record.set_variant("raw", raw).unwrap();
        }
        record
    }

    #[rstest]
    #[case("50", "50 mm")]
    #[case("23.45", "23 mm")]
    #[case("70.0", "70 mm")]
    fn test_apply_formats_fields(#[case] raw_focal_length: &str, #[case] expected: &str) {
        let record = apply(record_with_raw(Some("raw.ARW")), fields(raw_focal_length));
        assert_eq!(record.camera.as_deref(), Some("SONY ILCE-7M3"));
        assert_eq!(record.lens.as_deref(), Some("FE 24-70mm F2.8 GM"));
        assert_eq!(record.focal_length.as_deref(), Some(expected));
        assert_eq!(record.f_number.as_deref(), Some("f/5.6"));
        assert_eq!(record.shutter_speed, Some(json!("1/250")));
        assert_eq!(record.iso, Some(json!(100)));
        // Everything else is untouched.
        assert_eq!(record.variant("raw"), Some("raw.ARW"));
        assert_eq!(record.tags.len(), 1);
    }

    #[tokio::test]
    async fn test_enrich_reads_raw_variant() {
        let backend: BackendHandle =
            Arc::new(MockBackend::with_files([(format!("{ID}/raw.ARW"), shutter_exif::fixture::sample())]));
        let enriched = enrich(&backend, &record_with_raw(Some("raw.ARW"))).await.unwrap();
        assert_eq!(enriched.camera.as_deref(), Some("SONY ILCE-7M3"));
        assert_eq!(enriched.lens.as_deref(), Some("FE 50mm F1.8"));
        assert_eq!(enriched.focal_length.as_deref(), Some("50 mm"));
        assert_eq!(enriched.f_number.as_deref(), Some("f/2.8"));
        assert_eq!(enriched.shutter_speed, Some(json!("1/250")));
        assert_eq!(enriched.iso, Some(json!(400)));
    }

    #[tokio::test]
    async fn test_enrich_failures() {
        let backend: BackendHandle = Arc::new(MockBackend::with_files([(format!("{ID}/raw.ARW"), b"garbage".to_vec())]));

        let err = enrich(&backend, &record_with_raw(None)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingVariant("raw")));

        let err = enrich(&backend, &record_with_raw(Some("../raw.ARW"))).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingVariant("raw")));

        let err = enrich(&backend, &record_with_raw(Some("missing.ARW"))).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));

        let err = enrich(&backend, &record_with_raw(Some("raw.ARW"))).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Exif));
    }
}
