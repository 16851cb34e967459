//! PostgreSQL-backed stores.
//!
//! - `chatlog`: durable chat log, pruned per session on every write
//! - `products_info`: product catalog read by the `get_products` tool

pub mod chat_log;
pub mod products;

pub use chat_log::PgChatLog;
pub use products::PgProductCatalog;

use parlance_conversation::StoreError;
use rootcause::Report;

/// Classifies a database error. Connection-level faults mean the store is
/// unavailable; everything else is a failed operation.
fn store_error(store: &'static str, e: sqlx::Error) -> Report<StoreError> {
    let reason = e.to_string();
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable { store, reason }.into()
        }
        _ => StoreError::OperationFailed { store, reason }.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_faults_are_unavailable() {
        let report = store_error("catalog", sqlx::Error::PoolTimedOut);
        assert!(matches!(
            report.current_context(),
            StoreError::Unavailable { .. }
        ));

        let report = store_error("catalog", sqlx::Error::RowNotFound);
        assert!(matches!(
            report.current_context(),
            StoreError::OperationFailed { .. }
        ));
    }
}
