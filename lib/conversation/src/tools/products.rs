//! `get_products`: product lookup against a catalog.

use crate::error::{StoreError, ToolError};
use crate::tool::{Tool, ToolDefinition, str_arg, u64_arg};
use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use tracing::warn;

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

/// A catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Price in minor currency units.
    pub price: i64,
    /// Units in stock; `None` for unmetered offerings.
    pub stock_quantity: Option<i64>,
    /// Category label.
    pub category: Option<String>,
}

/// Filters for a catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    /// Substring matched against the product name.
    pub query: Option<String>,
    /// Exact category.
    pub category: Option<String>,
    /// Maximum number of records.
    pub limit: u32,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ProductQuery {
    /// Returns true if `product` passes the filters.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let name_ok = self
            .query
            .as_deref()
            .is_none_or(|q| product.name.contains(q));
        let category_ok = self
            .category
            .as_deref()
            .is_none_or(|c| product.category.as_deref() == Some(c));
        name_ok && category_ok
    }
}

/// Read access to the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns matching products ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the catalog cannot be queried.
    async fn find(&self, query: &ProductQuery) -> Result<Vec<Product>, Report<StoreError>>;
}

/// Built-in sample catalog, served when no catalog is configured.
#[must_use]
pub fn mock_products() -> Vec<Product> {
    let product = |id: &str, name: &str, description: &str, price, stock, category: &str| Product {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        price,
        stock_quantity: stock,
        category: Some(category.to_string()),
    };
    vec![
        product("1", "Parlance Assistant", "Conversational AI assistant", 500_000, Some(100), "AI"),
        product(
            "2",
            "Edge Worker Plan",
            "Serverless deployment at the edge",
            120_000,
            Some(1000),
            "Infrastructure",
        ),
        product(
            "3",
            "Object Storage",
            "Low-cost S3-compatible object storage",
            5_000,
            None,
            "Storage",
        ),
        product("4", "Managed SQL", "Serverless SQL database", 25_000, None, "Database"),
        product(
            "5",
            "AI Rollout Consulting",
            "Professional services for AI projects",
            10_000_000,
            Some(10),
            "Service",
        ),
    ]
}

/// In-process catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Vec<Product>,
}

impl InMemoryProductCatalog {
    /// Creates a catalog over the given products.
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find(&self, query: &ProductQuery) -> Result<Vec<Product>, Report<StoreError>> {
        let mut found: Vec<Product> = self
            .products
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.truncate(query.limit as usize);
        Ok(found)
    }
}

/// Product lookup tool.
#[derive(Clone, Default)]
pub struct ProductsTool {
    catalog: Option<Arc<dyn ProductCatalog>>,
}

impl ProductsTool {
    /// Creates the tool. Without a catalog the sample products are served.
    #[must_use]
    pub fn new(catalog: Option<Arc<dyn ProductCatalog>>) -> Self {
        Self { catalog }
    }

    fn sample(query: &ProductQuery) -> Vec<Product> {
        mock_products()
            .into_iter()
            .take(query.limit as usize)
            .collect()
    }
}

#[async_trait]
impl Tool for ProductsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "get_products",
            "Look up products in the catalog. Can filter by a name query or by category.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text to search for in product names (e.g. \"AI Agent\")"
                },
                "category": { "type": "string", "description": "Product category to filter by" },
                "limit": {
                    "type": "number",
                    "description": "Maximum number of results to return",
                    "default": DEFAULT_LIMIT
                }
            },
            "required": []
        }))
    }

    async fn execute(&self, arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        let query = ProductQuery {
            query: str_arg(&arguments, "query").map(str::to_string),
            category: str_arg(&arguments, "category").map(str::to_string),
            limit: u64_arg(&arguments, "limit")
                .map_or(DEFAULT_LIMIT, |n| u32::try_from(n).unwrap_or(MAX_LIMIT))
                .min(MAX_LIMIT),
        };

        let products = match &self.catalog {
            None => Self::sample(&query),
            Some(catalog) => match catalog.find(&query).await {
                Ok(products) => products,
                Err(report) => match report.current_context() {
                    StoreError::Unavailable { .. } => {
                        warn!(error = %report, "product catalog unavailable, serving samples");
                        Self::sample(&query)
                    }
                    StoreError::OperationFailed { reason, .. } => {
                        return Err(ToolError::ExecutionFailed {
                            name: "get_products".to_string(),
                            reason: reason.clone(),
                        });
                    }
                },
            },
        };

        Ok(json!({ "data": products }))
    }
}
