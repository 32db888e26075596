pub mod languages;
pub mod relay;
pub mod rooms;
pub mod store;
pub mod translate;
pub mod wire;

pub(crate) mod http;
mod ws;

use std::fmt;

use axum::{routing::get, Router};
use uuid::Uuid;

use crate::AppState;

/// Opaque handle for one live socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .route("/{purchase_id}/messages", get(http::messages))
        .route("/{purchase_id}/status", get(http::status))
}
