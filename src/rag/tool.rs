use serde::Serialize;

/// Retrieval tool declaration that scopes the model's file search to named stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchTool {
    #[serde(rename = "fileSearchStoreNames")]
    pub store_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_filter: Option<String>,
}

impl FileSearchTool {
    pub fn for_store(store_name: impl Into<String>) -> Self {
        Self {
            store_names: vec![store_name.into()],
            metadata_filter: None,
        }
    }

    /// Restricts retrieval to documents matching a filter such as `category="support"`.
    /// Blank filters are ignored.
    pub fn with_metadata_filter(mut self, filter: Option<String>) -> Self {
        self.metadata_filter = filter.filter(|f| !f.trim().is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_store_names_and_filter() {
        let tool = FileSearchTool::for_store("fileSearchStores/abc").with_metadata_filter(
            Some("category=\"support\"".into())
        );
        assert_eq!(
            serde_json::to_value(&tool).unwrap(),
            json!({
                "fileSearchStoreNames": ["fileSearchStores/abc"],
                "metadataFilter": "category=\"support\""
            })
        );
    }

    #[test]
    fn blank_filter_is_dropped() {
        let tool = FileSearchTool::for_store("stores/abc").with_metadata_filter(Some("  ".into()));
        assert_eq!(tool.metadata_filter, None);
        assert_eq!(
            serde_json::to_value(&tool).unwrap(),
            json!({ "fileSearchStoreNames": ["stores/abc"] })
        );
    }
}
