use parlance_ai::OpenAiCompatibleClient;
use parlance_conversation::tools::SerpApiSearch;
use parlance_conversation::{
    BuiltinTools, ChatLog, ConversationOrchestrator, InMemorySessionDirectory,
};
use parlance_server::{
    config::ServerConfig,
    db::{PgChatLog, PgProductCatalog},
    documents::NatsDocumentStore,
    hub::SessionHub,
    routes,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(provider = %config.provider.base_url, "Loaded configuration");

    let http = reqwest::Client::new();
    let mut tools = BuiltinTools::unconfigured(http.clone());
    tools.search = Arc::new(SerpApiSearch::new(http, config.serpapi_key.clone()));

    let mut chat_log: Option<Arc<dyn ChatLog>> = None;
    if let Some(database_url) = &config.database_url {
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .expect("failed to connect to database");

        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .expect("failed to run migrations");

        let log: Arc<dyn ChatLog> = Arc::new(PgChatLog::new(db_pool.clone()));
        tools.chat_log = Some(log.clone());
        tools.catalog = Some(Arc::new(PgProductCatalog::new(db_pool)));
        chat_log = Some(log);
    } else {
        tracing::warn!("DATABASE_URL not set; chat log disabled and sample products served");
    }

    if let Some(nats) = &config.nats {
        match NatsDocumentStore::connect(nats).await {
            Ok(store) => tools.documents = Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Document store unavailable; fetch_document is disabled"
                );
            }
        }
    }

    let client = OpenAiCompatibleClient::new(config.provider.clone())
        .expect("failed to build completion client");

    let mut orchestrator = ConversationOrchestrator::new(
        Arc::new(client),
        tools.into_registry(),
        config.orchestrator.clone(),
    );
    if let Some(log) = chat_log {
        orchestrator = orchestrator.with_chat_log(log);
    }
    tracing::info!(
        tools = orchestrator.tools().len(),
        model = %orchestrator.config().default_model,
        "Conversation engine ready"
    );

    let hub = SessionHub::new(
        Arc::new(orchestrator),
        Arc::new(InMemorySessionDirectory::new()),
    );
    let app = routes::router(Arc::new(hub));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
