use async_trait::async_trait;
use log::{ info, warn };
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::{ Duration, Instant };

use crate::error::{ ServiceError, StoreError };
use crate::llm::gemini::{ ChunkingConfig, GeminiClient, UploadMetadata };
use crate::llm::{ GenerateRequest, KnowledgeService, DEFAULT_MODEL };
use crate::models::chat::{ ChatMessage, ChatResponse };
use crate::models::store::{ ChunkingOptions, CustomMetadata, FileSearchStore, ListStoresPage, Operation };
use crate::rag::citations::{ extract_citations, LogTrace };
use crate::rag::tool::FileSearchTool;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Defaults to the file's base name.
    pub display_name: Option<String>,
    pub chunking: Option<ChunkingOptions>,
    pub custom_metadata: Vec<CustomMetadata>,
}

/// Remote calls behind `StoreAdmin`, one request each.
#[async_trait]
pub(crate) trait StoreApi: KnowledgeService {
    async fn create_store(&self, display_name: &str) -> Result<FileSearchStore, ServiceError>;
    async fn list_stores_page(&self, page_token: Option<&str>) -> Result<ListStoresPage, ServiceError>;
    async fn get_store(&self, name: &str) -> Result<FileSearchStore, ServiceError>;
    async fn delete_store(&self, name: &str, force: bool) -> Result<(), ServiceError>;
    /// Opens a resumable upload session and returns the URL the bytes go to.
    async fn start_upload(
        &self,
        store_name: &str,
        metadata: &UploadMetadata,
        content_length: u64,
        mime_type: &str
    ) -> Result<String, ServiceError>;
    async fn finish_upload(&self, upload_url: &str, bytes: Vec<u8>) -> Result<Operation, ServiceError>;
    async fn get_operation(&self, name: &str) -> Result<Operation, ServiceError>;
}

/// Operator-side management of remote file search stores.
#[derive(Clone)]
pub struct StoreAdmin {
    api: Arc<dyn StoreApi>,
}

impl StoreAdmin {
    pub fn new(client: GeminiClient) -> Self {
        Self::with_api(Arc::new(client))
    }

    pub(crate) fn with_api(api: Arc<dyn StoreApi>) -> Self {
        Self { api }
    }

    pub async fn create(&self, display_name: &str) -> Result<FileSearchStore, StoreError> {
        let store = self.api.create_store(display_name).await?;
        info!("Created store: {}", store.name);
        Ok(store)
    }

    /// All stores, following pagination to the end.
    pub async fn list(&self) -> Result<Vec<FileSearchStore>, StoreError> {
        let mut stores = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.api.list_stores_page(page_token.as_deref()).await?;
            stores.extend(page.file_search_stores);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => {
                    page_token = Some(token);
                }
                None => {
                    break;
                }
            }
        }
        Ok(stores)
    }

    pub async fn get(&self, name: &str) -> Result<FileSearchStore, StoreError> {
        Ok(self.api.get_store(name).await?)
    }

    /// With `force`, documents and chunks inside the store are deleted too.
    pub async fn delete(&self, name: &str, force: bool) -> Result<(), StoreError> {
        self.api.delete_store(name, force).await?;
        info!("Deleted store: {}", name);
        Ok(())
    }

    /// Force-deletes every store; returns the names removed.
    pub async fn cleanup(&self) -> Result<Vec<String>, StoreError> {
        let mut deleted = Vec::new();
        for store in self.list().await? {
            self.delete(&store.name, true).await?;
            deleted.push(store.name);
        }
        info!("Cleanup complete ({} store(s) deleted)", deleted.len());
        Ok(deleted)
    }

    /// Uploads a local file for indexing and returns the long-running operation handle.
    pub async fn upload(
        &self,
        store_name: &str,
        file_path: &Path,
        options: UploadOptions
    ) -> Result<Operation, StoreError> {
        let prepared = prepare_upload(file_path, options).await?;
        let bytes = tokio::fs::read(file_path).await.map_err(|source| StoreError::Io {
            path: file_path.to_path_buf(),
            source,
        })?;
        info!(
            "Uploading {} ({} bytes, {}) to {}",
            file_path.display(),
            bytes.len(),
            prepared.mime_type,
            store_name
        );

        let upload_url = self.api.start_upload(
            store_name,
            &prepared.metadata,
            bytes.len() as u64,
            &prepared.mime_type
        ).await?;
        let operation = self.api.finish_upload(&upload_url, bytes).await?;
        info!("Uploaded file: {} (operation {})", prepared.metadata.display_name, operation.name);
        Ok(operation)
    }

    /// Uploads every file in `dir` whose extension matches, case-insensitively.
    pub async fn upload_dir(
        &self,
        store_name: &str,
        dir: &Path,
        extension: &str
    ) -> Result<Vec<(PathBuf, Operation)>, StoreError> {
        let files = matching_files(dir, extension).await?;
        if files.is_empty() {
            warn!("No *.{} files found in {}", extension, dir.display());
        }
        let mut uploaded = Vec::with_capacity(files.len());
        for path in files {
            let operation = self.upload(store_name, &path, UploadOptions::default()).await?;
            uploaded.push((path, operation));
        }
        Ok(uploaded)
    }

    /// Polls an operation until it is done, failing on a reported error or after `timeout`.
    pub async fn wait_for_operation(
        &self,
        operation: Operation,
        poll_interval: Duration,
        timeout: Duration
    ) -> Result<Operation, StoreError> {
        let started = Instant::now();
        let mut current = operation;
        loop {
            if current.done {
                if let Some(status) = &current.error {
                    return Err(
                        ServiceError::OperationFailed {
                            name: current.name.clone(),
                            message: status.message.clone().unwrap_or_else(|| "unknown error".into()),
                        }.into()
                    );
                }
                info!("Operation {} done", current.name);
                return Ok(current);
            }
            if started.elapsed() >= timeout {
                return Err(
                    ServiceError::OperationTimeout {
                        name: current.name,
                        waited: started.elapsed(),
                    }.into()
                );
            }
            tokio::time::sleep(poll_interval).await;
            current = self.api.get_operation(&current.name).await?;
        }
    }

    /// One-shot retrieval question with no history and no persona.
    pub async fn search(
        &self,
        store_name: &str,
        query: &str,
        model: Option<&str>,
        metadata_filter: Option<String>
    ) -> Result<ChatResponse, StoreError> {
        let request = GenerateRequest {
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            contents: vec![ChatMessage::user(query)],
            system_instruction: None,
            tool: FileSearchTool::for_store(store_name).with_metadata_filter(metadata_filter),
        };
        let generation = self.api.generate(&request).await?;
        let citations = extract_citations(&generation.grounding, &LogTrace);
        Ok(ChatResponse {
            text: generation.text,
            citations,
        })
    }
}

struct PreparedUpload {
    metadata: UploadMetadata,
    mime_type: String,
}

async fn prepare_upload(file_path: &Path, options: UploadOptions) -> Result<PreparedUpload, StoreError> {
    match tokio::fs::metadata(file_path).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(file_path.to_path_buf()));
        }
        Err(source) => {
            return Err(StoreError::Io { path: file_path.to_path_buf(), source });
        }
    }

    let display_name = options.display_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| {
            file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| file_path.display().to_string());
    let mime_type = mime_guess::from_path(file_path).first_or_octet_stream().to_string();

    Ok(PreparedUpload {
        metadata: UploadMetadata {
            display_name,
            mime_type: Some(mime_type.clone()),
            custom_metadata: options.custom_metadata,
            chunking_config: options.chunking.map(ChunkingConfig::from),
        },
        mime_type,
    })
}

async fn matching_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, StoreError> {
    let wanted = extension.trim_start_matches('.').to_lowercase();
    let io_err = |source| StoreError::Io { path: dir.to_path_buf(), source };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(dir.to_path_buf()));
        }
        Err(e) => {
            return Err(io_err(e));
        }
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase() == wanted)
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
