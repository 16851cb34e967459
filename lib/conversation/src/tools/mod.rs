//! Built-in tool catalog.
//!
//! Each tool talks to an optional external collaborator. A missing
//! collaborator selects the tool's degraded mode instead of failing.

mod chat_log;
mod documents;
mod products;
mod weather;
mod web;

pub use chat_log::ChatLogTool;
pub use documents::{DocumentStore, DocumentsTool, InMemoryDocumentStore};
pub use products::{
    InMemoryProductCatalog, Product, ProductCatalog, ProductQuery, ProductsTool, mock_products,
};
pub use weather::{WeatherReading, WeatherTool};
pub use web::{
    SearchProvider, SerpApiSearch, WebTool, extract_text_from_html, fallback_search_link,
};

use crate::log::ChatLog;
use crate::tool::ToolRegistry;
use std::sync::Arc;

/// External collaborators of the built-in tools.
#[derive(Clone)]
pub struct BuiltinTools {
    /// Shared HTTP client for page fetches.
    pub http: reqwest::Client,
    /// Search backend.
    pub search: Arc<dyn SearchProvider>,
    /// Product catalog.
    pub catalog: Option<Arc<dyn ProductCatalog>>,
    /// Document store.
    pub documents: Option<Arc<dyn DocumentStore>>,
    /// Chat log.
    pub chat_log: Option<Arc<dyn ChatLog>>,
}

impl BuiltinTools {
    /// Collaborators with nothing configured: every tool runs degraded.
    #[must_use]
    pub fn unconfigured(http: reqwest::Client) -> Self {
        Self {
            search: Arc::new(SerpApiSearch::new(http.clone(), None)),
            http,
            catalog: None,
            documents: None,
            chat_log: None,
        }
    }

    /// Registers every built-in tool.
    pub fn register_into(self, registry: &mut ToolRegistry) {
        registry.register(WeatherTool);
        registry.register(WebTool::new(self.http, self.search));
        registry.register(ProductsTool::new(self.catalog));
        registry.register(DocumentsTool::new(self.documents));
        registry.register(ChatLogTool::new(self.chat_log));
    }

    /// Builds a registry containing the built-in catalog.
    #[must_use]
    pub fn into_registry(self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        self.register_into(&mut registry);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_every_builtin() {
        let registry = BuiltinTools::unconfigured(reqwest::Client::new()).into_registry();
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "get_weather",
                "web_search",
                "get_products",
                "fetch_document",
                "save_chat_message"
            ]
        );
        for spec in registry.to_specs() {
            assert_eq!(spec.function.parameters["type"], "object");
        }
    }
}
