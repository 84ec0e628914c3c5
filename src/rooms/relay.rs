use std::{panic::Location, sync::Arc, time::Duration};

use axum::extract::ws::Message;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::{
    context::ConnectionContext,
    error::RelayError,
    msg::Inbound,
    registry::{ConnectionId, Delivery, RoomRegistry},
    store::MessageStore,
};

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub keepalive: String,
    pub peer_buffer: usize,
    pub write_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            keepalive: "ping".to_owned(),
            peer_buffer: 64,
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub context: ConnectionContext,
    pub opened_at: OffsetDateTime,
    state: ConnectionState,
}

impl Connection {
    fn new(context: ConnectionContext) -> Self {
        Self {
            id: Uuid::now_v7(),
            context,
            opened_at: OffsetDateTime::now_utc(),
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

pub type Outbox = mpsc::Receiver<Message>;

pub struct ChatRelay {
    registry: RoomRegistry,
    store: Arc<dyn MessageStore>,
    settings: RelaySettings,
}

impl ChatRelay {
    pub fn new(store: Arc<dyn MessageStore>, settings: RelaySettings) -> Self {
        Self {
            registry: RoomRegistry::new(),
            store,
            settings,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn open(&self, context: ConnectionContext) -> (Connection, Outbox) {
        let mut conn = Connection::new(context);
        let (tx, outbox) = mpsc::channel(self.settings.peer_buffer.max(1));

        self.registry.join(&conn.context.room, conn.id, tx);
        conn.state = ConnectionState::Open;

        info!(
            room = %conn.context.room,
            user = %conn.context.user,
            connection = %conn.id,
            "connection opened"
        );
        (conn, outbox)
    }

    /// Handles one frame from `conn`. Callers await it before reading the
    /// next frame, which keeps a connection's messages in order.
    pub async fn on_message(&self, conn: &Connection, frame: Message) -> Delivery {
        if conn.state != ConnectionState::Open {
            return Delivery::default();
        }

        let payload = match &frame {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => &data[..],
            _ => return Delivery::default(),
        };

        match Inbound::classify(payload, &self.settings.keepalive) {
            Inbound::KeepAlive => {
                trace!(connection = %conn.id, "keep-alive");
                return Delivery::default();
            }
            Inbound::Chat(msg) if msg.is_sent() => {
                let ConnectionContext { room, user } = &conn.context;
                match self.store.create(room, user, &msg.body).await {
                    Ok(stored) => debug!(%room, %user, message = %stored.id, "message stored"),
                    Err(err) => {
                        let err = RelayError::Persistence(err);
                        error!(%room, %user, kind = err.kind(), "{err}");
                    }
                }
            }
            Inbound::Chat(_) => {}
            Inbound::Opaque(err) => {
                warn!(connection = %conn.id, kind = err.kind(), "{err}, relaying as-is");
            }
        }

        self.registry.broadcast(&conn.context.room, conn.id, &frame)
    }

    /// Takes `conn` out of its room. Safe to call more than once.
    pub fn close(&self, conn: &mut Connection) {
        if conn.state == ConnectionState::Closed {
            return;
        }

        self.registry.leave(&conn.context.room, conn.id);
        conn.state = ConnectionState::Closed;

        info!(
            room = %conn.context.room,
            user = %conn.context.user,
            connection = %conn.id,
            lasted = %(OffsetDateTime::now_utc() - conn.opened_at),
            "connection closed"
        );
    }

    #[track_caller]
    pub fn on_error(&self, conn: &mut Connection, err: anyhow::Error) {
        let origin = Location::caller();
        let trace = err.backtrace().to_string();
        let err = RelayError::Transport(err);
        error!(
            kind = err.kind(),
            message = %err,
            origin = %origin,
            trace = %trace,
            room = %conn.context.room,
            connection = %conn.id,
            "transport error"
        );

        self.close(conn);
    }
}
