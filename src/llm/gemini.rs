use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client, RequestBuilder, Response };
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use url::Url;

use super::grounding::Grounding;
use super::{ GeminiConfig, GenerateRequest, Generation, KnowledgeService, DEFAULT_BASE_URL };
use crate::error::{ ConfigError, ServiceError };
use crate::models::store::{ ChunkingOptions, CustomMetadata, FileSearchStore, ListStoresPage, Operation };
use crate::rag::tool::FileSearchTool;
use crate::store::StoreApi;

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const LIST_PAGE_SIZE: u32 = 20;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    tools: Vec<Tool<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool<'a> {
    file_search: &'a FileSearchTool,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a GenerateRequest) -> Self {
        let contents = request.contents
            .iter()
            .map(|msg| Content {
                role: msg.role().wire_name(),
                parts: vec![Part { text: msg.text() }],
            })
            .collect();
        let system_instruction = request.system_instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|text| SystemInstruction { parts: vec![Part { text }] });

        Self {
            contents,
            system_instruction,
            tools: vec![Tool { file_search: &request.tool }],
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    // Kept raw so a surprising shape only costs the citations, not the answer.
    #[serde(default)]
    grounding_metadata: Option<JsonValue>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    pub(crate) fn into_generation(self) -> Result<Generation, ServiceError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return match self.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => Err(ServiceError::Blocked(reason)),
                None => Err(ServiceError::EmptyResponse("NO_CANDIDATES".to_string())),
            };
        };

        let texts: Vec<String> = candidate.content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text)
            .collect();

        if texts.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
            return Err(ServiceError::EmptyResponse(reason));
        }

        Ok(Generation {
            text: texts.concat(),
            grounding: Grounding::from_value(candidate.grounding_metadata),
        })
    }
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() { msg } else { format!("{}: {}", status_text, msg) }
        })
        .unwrap_or_else(|_| body.to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateStoreRequest<'a> {
    display_name: &'a str,
}

/// Document settings sent when an upload session is opened.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadMetadata {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_metadata: Vec<CustomMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunking_config: Option<ChunkingConfig>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChunkingConfig {
    white_space_config: WhiteSpaceConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
struct WhiteSpaceConfig {
    max_tokens_per_chunk: u32,
    max_overlap_tokens: u32,
}

impl From<ChunkingOptions> for ChunkingConfig {
    fn from(options: ChunkingOptions) -> Self {
        Self {
            white_space_config: WhiteSpaceConfig {
                max_tokens_per_chunk: options.max_tokens_per_chunk,
                max_overlap_tokens: options.max_overlap_tokens,
            },
        }
    }
}

/// REST client for the Gemini API: content generation and file search stores.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: Url,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let raw = base_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BASE_URL);
        // Relative joins must append to the base path, not replace its last segment.
        let normalized = format!("{}/", raw.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|source| ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            source,
        })?;

        Ok(Self {
            http: Client::new(),
            api_key,
            base_url,
        })
    }

    pub fn from_config(config: &GeminiConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        Self::new(api_key, config.base_url.as_deref())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> Result<Url, ServiceError> {
        self.join(&format!("{}/{}", API_VERSION, path.trim_start_matches('/')))
    }

    fn upload_api_url(&self, path: &str) -> Result<Url, ServiceError> {
        self.join(&format!("upload/{}/{}", API_VERSION, path.trim_start_matches('/')))
    }

    fn join(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url.join(path).map_err(|source| ServiceError::InvalidEndpoint {
            path: path.to_string(),
            source,
        })
    }

    async fn dispatch(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send().await
            .map_err(|source| ServiceError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text().await
            .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
        Err(ServiceError::Api {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: api_error_message(&body),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder
    ) -> Result<T, ServiceError> {
        let response = self.dispatch(endpoint, request).await?;
        let body = response.text().await.map_err(|source| ServiceError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl StoreApi for GeminiClient {
    async fn create_store(&self, display_name: &str) -> Result<FileSearchStore, ServiceError> {
        let url = self.api_url("fileSearchStores")?;
        let request = self.http.post(url.clone()).json(&CreateStoreRequest { display_name });
        self.send_json(url.as_str(), request).await
    }

    async fn list_stores_page(
        &self,
        page_token: Option<&str>
    ) -> Result<ListStoresPage, ServiceError> {
        let url = self.api_url("fileSearchStores")?;
        let mut request = self.http.get(url.clone()).query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        self.send_json(url.as_str(), request).await
    }

    async fn get_store(&self, name: &str) -> Result<FileSearchStore, ServiceError> {
        let url = self.api_url(name)?;
        let request = self.http.get(url.clone());
        self.send_json(url.as_str(), request).await
    }

    async fn delete_store(&self, name: &str, force: bool) -> Result<(), ServiceError> {
        let url = self.api_url(name)?;
        let request = self.http.delete(url.clone()).query(&[("force", force.to_string())]);
        self.dispatch(url.as_str(), request).await?;
        Ok(())
    }

    async fn start_upload(
        &self,
        store_name: &str,
        metadata: &UploadMetadata,
        content_length: u64,
        mime_type: &str
    ) -> Result<String, ServiceError> {
        let url = self.upload_api_url(&format!("{}:uploadToFileSearchStore", store_name))?;
        let request = self.http
            .post(url.clone())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", content_length.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(metadata);
        let response = self.dispatch(url.as_str(), request).await?;

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::UploadSession(format!("{} header missing", UPLOAD_URL_HEADER)))
    }

    async fn finish_upload(&self, upload_url: &str, bytes: Vec<u8>) -> Result<Operation, ServiceError> {
        let request = self.http
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes);
        self.send_json(upload_url, request).await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, ServiceError> {
        let url = self.api_url(name)?;
        let request = self.http.get(url.clone());
        self.send_json(url.as_str(), request).await
    }
}

#[async_trait]
impl KnowledgeService for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ServiceError> {
        info!(
            "GeminiClient::generate() → model={} stores={:?} turns={}",
            request.model,
            request.tool.store_names,
            request.contents.len()
        );
        let url = self.api_url(&format!("models/{}:generateContent", request.model))?;
        let body = GenerateContentRequest::from_request(request);
        let http_request = self.http.post(url.clone()).json(&body);
        let response: GenerateContentResponse = self.send_json(url.as_str(), http_request).await?;
        debug!("Gemini returned {} candidate(s)", response.candidates.len());
        response.into_generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use serde_json::json;

    fn parse(body: JsonValue) -> Result<Generation, ServiceError> {
        serde_json::from_value::<GenerateContentResponse>(body).unwrap().into_generation()
    }

    #[test]
    fn request_body_carries_history_persona_and_tool() {
        let request = GenerateRequest {
            model: "gemini-2.5-flash".into(),
            contents: vec![
                ChatMessage::user("What is the capital?"),
                ChatMessage::assistant("Riyadh."),
                ChatMessage::user("And the currency?")
            ],
            system_instruction: Some("Answer formally.".into()),
            tool: FileSearchTool::for_store("fileSearchStores/abc").with_metadata_filter(
                Some("year=2024".into())
            ),
        };

        let body = serde_json::to_value(GenerateContentRequest::from_request(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "What is the capital?" }] },
                    { "role": "model", "parts": [{ "text": "Riyadh." }] },
                    { "role": "user", "parts": [{ "text": "And the currency?" }] }
                ],
                "systemInstruction": { "parts": [{ "text": "Answer formally." }] },
                "tools": [{ "fileSearch": {
                    "fileSearchStoreNames": ["fileSearchStores/abc"],
                    "metadataFilter": "year=2024"
                } }]
            })
        );
    }

    #[test]
    fn empty_system_instruction_is_omitted() {
        let request = GenerateRequest {
            model: "m".into(),
            contents: vec![ChatMessage::user("q")],
            system_instruction: Some(" ".into()),
            tool: FileSearchTool::for_store("s"),
        };
        let body = serde_json::to_value(GenerateContentRequest::from_request(&request)).unwrap();
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn generation_joins_text_parts_and_skips_thoughts() {
        let generation = parse(
            json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "Article 3 " },
                    { "text": "applies." }
                ] },
                "finishReason": "STOP"
            }]
        })
        ).unwrap();
        assert_eq!(generation.text, "Article 3 applies.");
        assert_eq!(generation.grounding, Grounding::Absent);
    }

    #[test]
    fn generation_keeps_malformed_grounding_as_a_value() {
        let generation = parse(
            json!({
            "candidates": [{
                "content": { "parts": [{ "text": "I don't know" }] },
                "groundingMetadata": { "groundingChunks": "unexpected" }
            }]
        })
        ).unwrap();
        assert_eq!(generation.text, "I don't know");
        assert!(matches!(generation.grounding, Grounding::Malformed(_)));
    }

    #[test]
    fn generation_keeps_good_chunks_next_to_bad_ones() {
        let generation = parse(
            json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Per Regulation A" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "retrievedContext": { "title": "Regulation A" } },
                        { "retrievedContext": 7 }
                    ],
                    "groundingSupports": [{ "groundingChunkIndices": null }]
                }
            }]
        })
        ).unwrap();
        let Grounding::Present(metadata) = generation.grounding else {
            panic!("expected grounding metadata");
        };
        assert_eq!(metadata.grounding_chunks.map(|c| c.len()), Some(1));
        assert_eq!(metadata.rejected_chunks.len(), 1);
    }

    #[test]
    fn blocked_prompt_is_a_service_error() {
        let err = parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap_err();
        assert!(matches!(err, ServiceError::Blocked(ref r) if r == "SAFETY"));
    }

    #[test]
    fn candidate_without_text_is_a_service_error() {
        let err = parse(json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] })).unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResponse(ref r) if r == "MAX_TOKENS"));

        let err = parse(json!({})).unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResponse(ref r) if r == "NO_CANDIDATES"));
    }

    #[test]
    fn api_errors_use_google_envelope() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(api_error_message(body), "RESOURCE_EXHAUSTED: Quota exceeded");
        assert_eq!(api_error_message("upstream timeout"), "upstream timeout");
    }

    #[test]
    fn urls_are_built_under_the_versioned_base() {
        let client = GeminiClient::new("key", Some("http://localhost:8080/proxy")).unwrap();
        assert_eq!(
            client.api_url("models/gemini-2.5-flash:generateContent").unwrap().as_str(),
            "http://localhost:8080/proxy/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            client.upload_api_url("fileSearchStores/abc:uploadToFileSearchStore").unwrap().as_str(),
            "http://localhost:8080/proxy/upload/v1beta/fileSearchStores/abc:uploadToFileSearchStore"
        );

        let default = GeminiClient::new("key", None).unwrap();
        assert_eq!(
            default.api_url("fileSearchStores").unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/fileSearchStores"
        );
    }

    #[test]
    fn missing_key_or_bad_url_is_a_config_error() {
        assert!(matches!(GeminiClient::new(" ", None), Err(ConfigError::MissingApiKey)));
        assert!(
            matches!(
                GeminiClient::new("key", Some("not a url")),
                Err(ConfigError::InvalidBaseUrl { .. })
            )
        );
        assert!(
            matches!(
                GeminiClient::from_config(&GeminiConfig::default()),
                Err(ConfigError::MissingApiKey)
            )
        );
    }

    #[test]
    fn upload_metadata_serializes_chunking_and_custom_metadata() {
        let metadata = UploadMetadata {
            display_name: "faq.pdf".into(),
            mime_type: Some("application/pdf".into()),
            custom_metadata: vec![CustomMetadata::string("category", "support")],
            chunking_config: ChunkingOptions::from_parts(Some(200), None).map(ChunkingConfig::from),
        };
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            json!({
                "displayName": "faq.pdf",
                "mimeType": "application/pdf",
                "customMetadata": [{ "key": "category", "stringValue": "support" }],
                "chunkingConfig": { "whiteSpaceConfig": { "maxTokensPerChunk": 200, "maxOverlapTokens": 20 } }
            })
        );
    }
}
