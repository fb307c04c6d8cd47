use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;

/// Evidence attached to a generated answer.
///
/// Chunks are decoded one at a time, so a chunk with an unexpected shape is set aside in
/// `rejected_chunks` instead of hiding the others. Supports are only ever logged and stay raw.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroundingMetadata {
    pub grounding_chunks: Option<Vec<GroundingChunk>>,
    pub rejected_chunks: Vec<RejectedChunk>,
    pub grounding_supports: Option<Vec<JsonValue>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingChunk {
    #[serde(default)]
    pub retrieved_context: Option<RetrievedContext>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file_search_store: Option<String>,
}

impl RetrievedContext {
    /// Title if non-empty, else URI if non-empty.
    pub fn label(&self) -> Option<&str> {
        fn non_empty(s: &Option<String>) -> Option<&str> {
            s.as_deref().filter(|v| !v.is_empty())
        }
        non_empty(&self.title).or_else(|| non_empty(&self.uri))
    }
}

/// A chunk that could not be decoded, by its position in the wire list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedChunk {
    pub index: usize,
    pub reason: String,
}

/// Grounding as received with one generation.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Grounding {
    #[default]
    Absent,
    Present(GroundingMetadata),
    /// The metadata as a whole does not have the expected shape.
    Malformed(String),
}

impl Grounding {
    pub fn from_value(value: Option<JsonValue>) -> Self {
        let mut raw = match value {
            None | Some(JsonValue::Null) => {
                return Grounding::Absent;
            }
            Some(JsonValue::Object(map)) => map,
            Some(other) => {
                return Grounding::Malformed(format!("expected an object, got {}", other));
            }
        };

        let chunks = match raw.remove("groundingChunks") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Array(items)) => Some(items),
            Some(other) => {
                return Grounding::Malformed(format!("groundingChunks is not a list: {}", other));
            }
        };

        let mut metadata = GroundingMetadata::default();
        if let Some(items) = chunks {
            let mut decoded = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match serde_json::from_value::<GroundingChunk>(item) {
                    Ok(chunk) => decoded.push(chunk),
                    Err(e) => metadata.rejected_chunks.push(RejectedChunk { index, reason: e.to_string() }),
                }
            }
            metadata.grounding_chunks = Some(decoded);
        }

        metadata.grounding_supports = match raw.remove("groundingSupports") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Array(items)) => Some(items),
            Some(other) => Some(vec![other]),
        };

        Grounding::Present(metadata)
    }
}
