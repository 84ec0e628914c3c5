pub mod appresult;
pub mod config;
pub mod db;
pub mod res;
pub mod rooms;
pub mod telemetry;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub use appresult::{AppError, AppResult};
pub use config::Config;
use rooms::{ChatRelay, RelaySettings, SessionCookies, SqliteMessageStore};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: SqliteMessageStore,
    pub relay: Arc<ChatRelay>,
    pub cookies: SessionCookies,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, cookies: SessionCookies, settings: RelaySettings) -> Self {
        let store = SqliteMessageStore::new(db_pool);
        let relay = Arc::new(ChatRelay::new(Arc::new(store.clone()), settings));
        AppState { store, relay, cookies }
    }
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .nest("/r", rooms::router())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
