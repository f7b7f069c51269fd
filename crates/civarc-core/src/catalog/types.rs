//! Typed catalog payloads.
//!
//! Only the fields the archiver reads are typed. The raw JSON of every
//! response is kept next to the parsed value and archived verbatim, so fields
//! this crate does not know about survive unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A catalog model version (`/model-versions/...`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVersion {
    pub id: u64,
    pub model_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub trained_words: Vec<String>,
    #[serde(default)]
    pub images: Vec<CatalogImage>,
}

/// A preview image or video attached to a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub url: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Every other field, kept for the asset sidecar.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogImage {
    pub fn is_video(&self) -> bool {
        self.media_type.as_deref() == Some("video")
    }
}

/// A catalog model (`/models/{id}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogModel {
    pub id: u64,
    pub name: String,
    #[serde(default, rename = "type")]
    pub model_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nsfw: Option<bool>,
    #[serde(default)]
    pub creator: Option<CatalogCreator>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogCreator {
    #[serde(default)]
    pub username: Option<String>,
}

/// A parsed payload together with the exact JSON it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub parsed: T,
    pub raw: Value,
}

impl<T: serde::de::DeserializeOwned> Fetched<T> {
    /// Parse `raw`, failing when a required field is missing or mistyped.
    pub fn from_value(raw: Value) -> std::result::Result<Self, serde_json::Error> {
        let parsed = T::deserialize(&raw)?;
        Ok(Self { parsed, raw })
    }
}

/// Outcome of a catalog lookup that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Found(T),
    /// The catalog answered with a permanent "no such resource" status.
    NotFound { status: u16 },
}

impl<T> LookupOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            LookupOutcome::Found(value) => Some(value),
            LookupOutcome::NotFound { .. } => None,
        }
    }
}

/// Accept a missing, null or unparseable timestamp as `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| match DateTime::parse_from_rfc3339(&s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring unparseable catalog timestamp '{}': {}", s, e);
            None
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_parses_known_fields() {
        let raw = json!({
            "id": 11,
            "modelId": 7,
            "name": "v1.0",
            "updatedAt": "2024-03-01T12:00:00.000Z",
            "baseModel": "SDXL 1.0",
            "trainedWords": ["foo"],
            "images": [{"url": "https://i.test/1.jpeg", "type": "image", "nsfwLevel": 1}],
            "somethingNew": true
        });
        let fetched = Fetched::<CatalogVersion>::from_value(raw.clone()).unwrap();
        assert_eq!(fetched.parsed.model_id, 7);
        assert_eq!(
            fetched.parsed.updated_at.unwrap().to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );
        assert_eq!(fetched.parsed.images[0].extra["nsfwLevel"], 1);
        assert_eq!(fetched.raw, raw);
    }

    #[test]
    fn test_version_requires_model_id() {
        let result = Fetched::<CatalogVersion>::from_value(json!({"id": 11}));
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_timestamp_degrades_to_none() {
        let fetched =
            Fetched::<CatalogVersion>::from_value(json!({"id": 1, "modelId": 2, "updatedAt": "yesterday"}))
                .unwrap();
        assert!(fetched.parsed.updated_at.is_none());
    }

    #[test]
    fn test_model_requires_name() {
        assert!(Fetched::<CatalogModel>::from_value(json!({"id": 7})).is_err());
        let model = Fetched::<CatalogModel>::from_value(json!({"id": 7, "name": "M", "type": "LORA"}))
            .unwrap();
        assert_eq!(model.parsed.model_type.as_deref(), Some("LORA"));
    }

    #[test]
    fn test_image_round_trips_extra_fields() {
        let raw = json!({"url": "https://i.test/1.mp4", "type": "video", "meta": {"seed": 1}});
        let image: CatalogImage = serde_json::from_value(raw.clone()).unwrap();
        assert!(image.is_video());
        assert_eq!(serde_json::to_value(&image).unwrap(), raw);
    }
}
