//! Read-only queries over what the last reload stored.

use crate::Gallery;
use crate::error::{ErrorKind, Result};
use crate::models::parse_identity;
use exn::ResultExt;
use shutter_store::Document;

/// Fields returned for each photo in a listing.
const SUMMARY_FIELDS: [&str; 3] = ["id", "big_thumb", "small_thumb"];
/// Fields returned for a single photo's details.
const DETAIL_FIELDS: [&str; 10] = [
    "id",
    "camera",
    "fNumber",
    "focalLength",
    "full",
    "iso",
    "lens",
    "raw",
    "shutterSpeed",
    "uploadTimestamp",
];

/// A set of tag names that must all be flagged `true` on a photo.
///
/// Parsed from whitespace-separated names (`wildlife bird`); an empty query
/// matches every photo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery(Vec<String>);

impl TagQuery {
    pub fn parse(expression: &str) -> Self {
        Self(expression.split_whitespace().map(str::to_string).collect())
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }
}

/// Copy only `fields` out of `document`, skipping those it doesn't have.
fn project(document: &Document, fields: &[&str]) -> Document {
    fields.iter().filter_map(|field| document.get(*field).map(|value| (field.to_string(), value.clone()))).collect()
}

impl Gallery {
    /// The tag index flushed by the last reload, or an empty mapping if no
    /// reload has flushed one yet.
    pub async fn all_tags(&self) -> Result<Document> {
        let tags = self.photos.tags().await.or_raise(|| ErrorKind::Store)?;
        Ok(tags.unwrap_or_default())
    }

    /// `{id, big_thumb, small_thumb}` of every photo matching `query`, in
    /// the order they were first stored.
    pub async fn photos_by_tags(&self, query: &TagQuery) -> Result<Vec<Document>> {
        let documents = self.photos.find_by_tags(query.tags()).await.or_raise(|| ErrorKind::Store)?;
        Ok(documents.iter().map(|document| project(document, &SUMMARY_FIELDS)).collect())
    }

    /// The detail fields of one photo, as a zero- or one-element list.
    pub async fn photo_data(&self, id: &str) -> Result<Vec<Document>> {
        let id = parse_identity(id)?;
        let document = self.photos.get(id).await.or_raise(|| ErrorKind::Store)?;
        Ok(document.iter().map(|document| project(document, &DETAIL_FIELDS)).collect())
    }
}
