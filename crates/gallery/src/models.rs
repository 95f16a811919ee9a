use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shutter_store::Document;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Tag name to flag. Only `true` entries count when filtering.
pub type Tags = BTreeMap<String, bool>;

/// Top-level record fields that can never be used as a variant name.
const RESERVED_FIELDS: [&str; 9] =
    ["id", "tags", "uploadTimestamp", "camera", "lens", "focalLength", "fNumber", "shutterSpeed", "iso"];

/// Check that `raw` is a photo identity as [`Gallery::begin`] issues them: a
/// lowercase, hyphenated UUID. Anything else (including other spellings of
/// the same UUID) would name a folder that doesn't exist, or worse.
///
/// [`Gallery::begin`]: crate::Gallery::begin
pub fn parse_identity(raw: &str) -> Result<&str> {
    match Uuid::try_parse(raw) {
        Ok(uuid) if uuid.hyphenated().to_string() == raw => Ok(raw),
        _ => exn::bail!(ErrorKind::InvalidInput(format!("`{raw}` is not a photo identity"))),
    }
}

/// Variant name of an uploaded file: everything before the first `.`
/// (`raw.ARW` is `raw`, `big_thumb.v2.jpg` is `big_thumb`).
pub fn variant_name(file_name: &str) -> Result<&str> {
    let name = file_name.split('.').next().unwrap_or_default();
    check_variant_name(name)?;
    Ok(name)
}

fn check_variant_name(name: &str) -> Result<()> {
    if name.is_empty() || RESERVED_FIELDS.contains(&name) {
        exn::bail!(ErrorKind::InvalidInput(format!("`{name}` is not a usable variant name")));
    }
    Ok(())
}

/// The metadata of one photo, as written to its sidecar and upserted into
/// the `photos` collection.
///
/// Variant filenames (`raw`, `full`, `big_thumb`, `small_thumb`, or anything
/// else a client uploaded) and any field this type doesn't know about live
/// in [`extra`](Self::extra), so a read-modify-write cycle never drops data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub tags: Tags,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_number: Option<String>,
    /// Stored as read from the EXIF data: a string such as `1/250` when this
    /// crate enriched the record, but whatever JSON an older tool wrote
    /// (often a bare number) is kept as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PhotoRecord {
    /// A freshly-issued record: identity, tags and upload time, nothing else.
    pub fn new(id: impl Into<String>, tags: Tags, upload_timestamp: i64) -> Self {
        Self {
            id: id.into(),
            tags,
            upload_timestamp: Some(upload_timestamp),
            camera: None,
            lens: None,
            focal_length: None,
            f_number: None,
            shutter_speed: None,
            iso: None,
            extra: Map::new(),
        }
    }

    /// Filename stored for the given variant, if any.
    pub fn variant(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }

    /// Point the variant `name` at `file_name`, replacing any earlier upload
    /// of the same variant.
    pub fn set_variant(&mut self, name: &str, file_name: &str) -> Result<()> {
        check_variant_name(name)?;
        self.extra.insert(name.to_string(), Value::String(file_name.to_string()));
        Ok(())
    }

    /// The record as a store document.
    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self) {
            Ok(Value::Object(document)) => Ok(document),
            _ => exn::bail!(ErrorKind::Sidecar),
        }
    }
}

/// Every tag name seen during one reload, each mapped to `true`.
///
/// Built up by the reload loop and flushed as a single document once the
/// walk is over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagIndex(BTreeMap<String, bool>);

impl TagIndex {
    /// Add every key of `tags`, whatever its flag.
    pub fn merge(&mut self, tags: &Tags) {
        for name in tags.keys() {
            self.0.insert(name.clone(), true);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn to_document(&self) -> Document {
        self.0.iter().map(|(name, flag)| (name.clone(), Value::Bool(*flag))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let input = json!({
            "id": "0b6f9f4e-3c1a-4b59-9d0c-8f6d2f0a7e11",
            "tags": {"wildlife": true},
            "uploadTimestamp": 1_700_000_000_000i64,
            "raw": "raw.ARW",
            "small_thumb": "small_thumb.jpg",
            "location": {"lat": 51.5, "lon": -0.12},
        });
        let record: PhotoRecord = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(record.variant("raw"), Some("raw.ARW"));
        assert_eq!(record.upload_timestamp, Some(1_700_000_000_000));
        assert_eq!(Value::Object(record.to_document().unwrap()), input);
    }

    #[test]
    fn test_exif_fields_use_camel_case() {
        let mut record = PhotoRecord::new("id", Tags::new(), 1);
        record.focal_length = Some("50 mm".to_string());
        record.f_number = Some("f/2.8".to_string());
        record.shutter_speed = Some(json!("1/250"));
        record.iso = Some(json!(400));
        let document = record.to_document().unwrap();
        assert_eq!(document["focalLength"], json!("50 mm"));
        assert_eq!(document["fNumber"], json!("f/2.8"));
        assert_eq!(document["shutterSpeed"], json!("1/250"));
        assert_eq!(document["iso"], json!(400));
        assert!(!document.contains_key("camera"));
    }

    #[test]
    fn test_set_variant_replaces() {
        let mut record = PhotoRecord::new("id", Tags::new(), 1);
        record.set_variant("full", "full.jpg").unwrap();
        record.set_variant("full", "full.png").unwrap();
        assert_eq!(record.variant("full"), Some("full.png"));
        assert_eq!(record.extra.len(), 1);
    }

    #[rstest]
    #[case("")]
    #[case("id")]
    #[case("tags")]
    #[case("camera")]
    #[case("uploadTimestamp")]
    fn test_set_variant_rejects_reserved(#[case] name: &str) {
        let mut record = PhotoRecord::new("id", Tags::new(), 1);
        let err = record.set_variant(name, "x.jpg").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidInput(_)));
    }

    #[rstest]
    #[case(json!(2), json!(100))]
    #[case(json!(0.004), json!("100"))]
    #[case(json!("1/250"), json!([100, 200]))]
    fn test_exposure_values_kept_raw(#[case] shutter_speed: Value, #[case] iso: Value) {
        let input = json!({
            "id": "0b6f9f4e-3c1a-4b59-9d0c-8f6d2f0a7e11",
            "tags": {},
            "shutterSpeed": shutter_speed,
            "iso": iso,
        });
        let record: PhotoRecord = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(record.shutter_speed, Some(shutter_speed));
        assert_eq!(record.iso, Some(iso));
        assert!(record.extra.is_empty());
        assert_eq!(Value::Object(record.to_document().unwrap()), input);
    }

    #[rstest]
    #[case(json!({"tags": {}}))]
    #[case(json!({"id": "x"}))]
    #[case(json!({"id": "x", "tags": ["wildlife"]}))]
    #[case(json!({"id": 7, "tags": {}}))]
    fn test_rejects_incomplete_records(#[case] input: Value) {
        assert!(serde_json::from_value::<PhotoRecord>(input).is_err());
    }

    #[rstest]
    #[case("0b6f9f4e-3c1a-4b59-9d0c-8f6d2f0a7e11", true)]
    #[case("0B6F9F4E-3C1A-4B59-9D0C-8F6D2F0A7E11", false)]
    #[case("0b6f9f4e3c1a4b599d0c8f6d2f0a7e11", false)]
    #[case("{0b6f9f4e-3c1a-4b59-9d0c-8f6d2f0a7e11}", false)]
    #[case("../etc", false)]
    #[case("", false)]
    fn test_parse_identity(#[case] raw: &str, #[case] valid: bool) {
        assert_eq!(parse_identity(raw).is_ok(), valid, "{raw}");
    }

    #[rstest]
    #[case("raw.ARW", Some("raw"))]
    #[case("big_thumb.v2.jpg", Some("big_thumb"))]
    #[case("full", Some("full"))]
    #[case(".jpg", None)]
    #[case("id.jpg", None)]
    #[case("tags.json", None)]
    fn test_variant_name(#[case] file_name: &str, #[case] expected: Option<&str>) {
        assert_eq!(variant_name(file_name).ok(), expected);
    }

    #[test]
    fn test_tag_index_merge() {
        let mut index = TagIndex::default();
        index.merge(&Tags::from([("wildlife".to_string(), true)]));
        index.merge(&Tags::from([("bird".to_string(), false), ("wildlife".to_string(), true)]));
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["bird", "wildlife"]);
        assert_eq!(Value::Object(index.to_document()), json!({"bird": true, "wildlife": true}));
    }
}
