//! `fetch_document`: read an uploaded document from the object store.

use crate::error::{StoreError, ToolError};
use crate::tool::{Tool, ToolDefinition, str_arg};
use async_trait::async_trait;
use rootcause::Report;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Key/value access to stored documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the document text, or `None` if there is no such key.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, Report<StoreError>>;
}

/// In-process document store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: HashMap<String, String>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document.
    #[must_use]
    pub fn with_document(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.insert(key.into(), content.into());
        self
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Report<StoreError>> {
        Ok(self.documents.get(key).cloned())
    }
}

/// Document fetch tool.
#[derive(Clone, Default)]
pub struct DocumentsTool {
    store: Option<Arc<dyn DocumentStore>>,
}

impl DocumentsTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DocumentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("fetch_document", "Fetch the content of an uploaded document.")
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "key": {
                        "type": "string",
                        "description": "File name of the document to fetch (e.g. \"API_Guide.pdf\")"
                    }
                },
                "required": ["key"]
            }))
    }

    async fn execute(&self, arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        let Some(key) = str_arg(&arguments, "key") else {
            return Ok(json!({ "error": "Document key is required." }));
        };
        let Some(store) = &self.store else {
            return Ok(json!({ "error": "document store not configured; cannot fetch document" }));
        };

        match store.get(key).await {
            Ok(Some(content)) => Ok(json!({ "content": content })),
            Ok(None) => Ok(json!({ "content": format!("Document '{key}' does not exist.") })),
            Err(report) => Err(ToolError::ExecutionFailed {
                name: "fetch_document".to_string(),
                reason: report.current_context().to_string(),
            }),
        }
    }
}
