use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::RelayError;

pub const SENT: &str = "sent";

/// Wire form of a chat message. Fields the relay doesn't know about are kept
/// in `extra`, but peers always get the original bytes, never a re-encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub status: String,
    pub body: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn is_sent(&self) -> bool {
        self.status == SENT
    }
}

#[derive(Debug)]
pub enum Inbound {
    KeepAlive,
    Chat(ChatMessage),
    Opaque(RelayError),
}

impl Inbound {
    pub fn classify(payload: &[u8], keepalive: &str) -> Self {
        if payload == keepalive.as_bytes() {
            return Inbound::KeepAlive;
        }

        match serde_json::from_slice::<ChatMessage>(payload) {
            Ok(msg) => Inbound::Chat(msg),
            Err(err) => Inbound::Opaque(err.into()),
        }
    }

    pub fn is_relayed(&self) -> bool {
        !matches!(self, Inbound::KeepAlive)
    }
}
