//! Document store backed by a NATS JetStream object store bucket.

use crate::config::NatsConfig;
use async_nats::jetstream::object_store::{self, GetErrorKind};
use async_trait::async_trait;
use parlance_conversation::StoreError;
use parlance_conversation::tools::DocumentStore;
use rootcause::Report;
use tokio::io::AsyncReadExt;
use tracing::instrument;

const STORE: &str = "document store";

/// Documents stored as objects keyed by name.
pub struct NatsDocumentStore {
    store: object_store::ObjectStore,
}

impl NatsDocumentStore {
    /// Connects to NATS and opens (or creates) the documents bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or bucket setup fails.
    pub async fn connect(config: &NatsConfig) -> Result<Self, Report<StoreError>> {
        let client =
            async_nats::connect(&config.url)
                .await
                .map_err(|e| StoreError::Unavailable {
                    store: STORE,
                    reason: format!("failed to connect: {e}"),
                })?;

        let jetstream = async_nats::jetstream::new(client);

        let store = jetstream
            .create_object_store(object_store::Config {
                bucket: config.bucket.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| StoreError::Unavailable {
                store: STORE,
                reason: format!("failed to open bucket '{}': {e}", config.bucket),
            })?;

        Ok(Self { store })
    }
}

#[async_trait]
impl DocumentStore for NatsDocumentStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, Report<StoreError>> {
        let mut object = match self.store.get(key).await {
            Ok(object) => object,
            Err(e) if matches!(e.kind(), GetErrorKind::NotFound) => return Ok(None),
            Err(e) => {
                return Err(StoreError::OperationFailed {
                    store: STORE,
                    reason: e.to_string(),
                }
                .into());
            }
        };

        let mut data = Vec::new();
        object
            .read_to_end(&mut data)
            .await
            .map_err(|e| StoreError::OperationFailed {
                store: STORE,
                reason: e.to_string(),
            })?;

        let text = String::from_utf8(data).map_err(|_| StoreError::OperationFailed {
            store: STORE,
            reason: format!("document '{key}' is not valid UTF-8"),
        })?;
        Ok(Some(text))
    }
}
