//! Product catalog repository.

use super::store_error;
use async_trait::async_trait;
use parlance_conversation::StoreError;
use parlance_conversation::tools::{Product, ProductCatalog, ProductQuery};
use rootcause::Report;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::instrument;

const STORE: &str = "product catalog";

/// Row type for catalog queries.
#[derive(FromRow)]
struct ProductRow {
    id: String,
    name: String,
    description: Option<String>,
    price: i64,
    stock_quantity: Option<i64>,
    category: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            stock_quantity: row.stock_quantity,
            category: row.category,
        }
    }
}

/// Builds the lookup: name substring, exact category, ordered by id.
fn lookup_query(query: &ProductQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT id, name, description, price, stock_quantity, category FROM products_info",
    );
    let mut separator = " WHERE ";
    if let Some(text) = &query.query {
        builder
            .push(separator)
            .push("name LIKE ")
            .push_bind(format!("%{text}%"));
        separator = " AND ";
    }
    if let Some(category) = &query.category {
        builder
            .push(separator)
            .push("category = ")
            .push_bind(category.clone());
    }
    builder
        .push(" ORDER BY id LIMIT ")
        .push_bind(i64::from(query.limit));
    builder
}

/// Product catalog stored in the `products_info` table.
pub struct PgProductCatalog {
    pool: PgPool,
}

impl PgProductCatalog {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCatalog for PgProductCatalog {
    #[instrument(skip(self))]
    async fn find(&self, query: &ProductQuery) -> Result<Vec<Product>, Report<StoreError>> {
        let rows: Vec<ProductRow> = lookup_query(query)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error(STORE, e))?;
        Ok(rows.into_iter().map(Product::from).collect())
    }
}
