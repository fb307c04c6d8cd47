use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_TOKENS_PER_CHUNK: u32 = 200;
pub const DEFAULT_MAX_OVERLAP_TOKENS: u32 = 20;

/// Remote document store as reported by the service.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchStore {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "int64")]
    pub active_documents_count: Option<i64>,
    #[serde(default, deserialize_with = "int64")]
    pub pending_documents_count: Option<i64>,
    #[serde(default, deserialize_with = "int64")]
    pub failed_documents_count: Option<i64>,
    #[serde(default, deserialize_with = "int64")]
    pub size_bytes: Option<i64>,
}

impl fmt::Display for FileSearchStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(display_name) = &self.display_name {
            write!(f, " ({})", display_name)?;
        }
        write!(
            f,
            " active={} pending={} failed={}",
            self.active_documents_count.unwrap_or(0),
            self.pending_documents_count.unwrap_or(0),
            self.failed_documents_count.unwrap_or(0)
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListStoresPage {
    #[serde(default)]
    pub file_search_stores: Vec<FileSearchStore>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Long-running operation handle returned by uploads.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationStatus>,
    #[serde(default)]
    pub response: Option<JsonValue>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkingOptions {
    pub max_tokens_per_chunk: u32,
    pub max_overlap_tokens: u32,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: DEFAULT_MAX_TOKENS_PER_CHUNK,
            max_overlap_tokens: DEFAULT_MAX_OVERLAP_TOKENS,
        }
    }
}

impl ChunkingOptions {
    /// Chunking is only configured when at least one bound is given; the other takes its default.
    pub fn from_parts(max_tokens_per_chunk: Option<u32>, max_overlap_tokens: Option<u32>) -> Option<Self> {
        if max_tokens_per_chunk.is_none() && max_overlap_tokens.is_none() {
            return None;
        }
        let defaults = Self::default();
        Some(Self {
            max_tokens_per_chunk: max_tokens_per_chunk.unwrap_or(defaults.max_tokens_per_chunk),
            max_overlap_tokens: max_overlap_tokens.unwrap_or(defaults.max_overlap_tokens),
        })
    }
}

/// Document-level metadata usable by retrieval filters.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMetadata {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
}

impl CustomMetadata {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), string_value: Some(value.into()), numeric_value: None }
    }

    pub fn numeric(key: impl Into<String>, value: f64) -> Self {
        Self { key: key.into(), string_value: None, numeric_value: Some(value) }
    }
}

impl FromStr for CustomMetadata {
    type Err = String;

    /// Parses `key=value`; values that read as numbers are sent as numeric metadata.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| format!("Invalid metadata '{}': expected key=value", s))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid metadata '{}': empty key", s));
        }
        let value = value.trim();
        match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(Self::numeric(key, number)),
            _ => Ok(Self::string(key, value.trim_matches('"'))),
        }
    }
}

// Google encodes int64 fields as JSON strings.
fn int64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error> where D: Deserializer<'de> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Option::<Int64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Int64::Number(n)) => Ok(Some(n)),
        Some(Int64::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_is_omitted_without_bounds() {
        assert_eq!(ChunkingOptions::from_parts(None, None), None);
    }

    #[test]
    fn chunking_fills_missing_bound_with_default() {
        let options = ChunkingOptions::from_parts(Some(512), None).unwrap();
        assert_eq!(options.max_tokens_per_chunk, 512);
        assert_eq!(options.max_overlap_tokens, DEFAULT_MAX_OVERLAP_TOKENS);

        let options = ChunkingOptions::from_parts(None, Some(50)).unwrap();
        assert_eq!(options.max_tokens_per_chunk, DEFAULT_MAX_TOKENS_PER_CHUNK);
        assert_eq!(options.max_overlap_tokens, 50);
    }

    #[test]
    fn metadata_parses_numbers_and_strings() {
        let version: CustomMetadata = "version=2".parse().unwrap();
        assert_eq!(version, CustomMetadata::numeric("version", 2.0));

        let category: CustomMetadata = "category=\"support\"".parse().unwrap();
        assert_eq!(category, CustomMetadata::string("category", "support"));

        assert!("no-separator".parse::<CustomMetadata>().is_err());
        assert!("=value".parse::<CustomMetadata>().is_err());
    }

    #[test]
    fn store_accepts_string_encoded_counts() {
        let store: FileSearchStore = serde_json::from_str(
            r#"{
                "name": "fileSearchStores/faq-123",
                "displayName": "FAQ Store",
                "createTime": "2025-11-07T10:00:00.123456Z",
                "activeDocumentsCount": "3",
                "sizeBytes": 4096
            }"#
        ).unwrap();

        assert_eq!(store.active_documents_count, Some(3));
        assert_eq!(store.size_bytes, Some(4096));
        assert_eq!(store.pending_documents_count, None);
        assert!(store.create_time.is_some());
        assert_eq!(
            store.to_string(),
            "fileSearchStores/faq-123 (FAQ Store) active=3 pending=0 failed=0"
        );
    }
}
