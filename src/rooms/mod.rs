mod context;
mod error;
mod history;
mod msg;
mod registry;
mod relay;
mod store;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use context::{ConnectionContext, RoomId, SessionCookies, UserId};
pub use error::RelayError;
pub use msg::{ChatMessage, Inbound};
pub use registry::{ConnectionId, Delivery, RoomRegistry};
pub use relay::{ChatRelay, Connection, ConnectionState, Outbox, RelaySettings};
pub use store::{MessageStore, PersistedMessage, SqliteMessageStore};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
        .route("/{room_id}/messages", get(history::messages))
}
