pub mod appresult;
pub mod chat;
pub mod config;
pub mod session;

use std::sync::Arc;

use axum::{extract::FromRef, routing::post, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};
use chat::{relay::ChatRelay, store::ChatStore, translate::TranslationGateway};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
    pub store: Arc<dyn ChatStore>,
    pub translator: TranslationGateway,
}

impl AppState {
    pub fn new(store: Arc<dyn ChatStore>, translator: TranslationGateway) -> Self {
        Self {
            relay: Arc::new(ChatRelay::new(store.clone(), translator.clone())),
            store,
            translator,
        }
    }
}

/// All routes of the relay. The session layer is added by the caller.
pub fn app(app_state: AppState) -> Router {
    Router::new()
        .nest("/chat", chat::router())
        .route("/translate", post(chat::http::translate_texts))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
