use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use storechat::{
    AppState,
    chat::{
        store::{ChatStore, SqliteChatStore},
        translate::{MyMemoryTranslator, TranslationGateway},
    },
    config::Config,
};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storechat=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("failed to run migrations")?;

    let store: Arc<dyn ChatStore> = Arc::new(SqliteChatStore::new(db_pool));
    let translator = TranslationGateway::new(
        Arc::new(MyMemoryTranslator::new(config.translate_url, config.translate_email)),
        config.translate_timeout,
    );

    let app = storechat::app(AppState::new(store, translator)).layer(session_layer);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("chat relay listening on {}", config.bind_addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
