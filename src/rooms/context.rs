use std::fmt;

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::Cookie;

use super::error::RelayError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

macro_rules! token_impl {
    ($T:ident) => {
        impl $T {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $T {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $T {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

token_impl!(RoomId);
token_impl!(UserId);

#[derive(Debug, Clone)]
pub struct SessionCookies {
    pub room: String,
    pub user: String,
}

impl Default for SessionCookies {
    fn default() -> Self {
        Self {
            room: "chat_id".to_owned(),
            user: "user_id".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub room: RoomId,
    pub user: UserId,
}

impl ConnectionContext {
    pub fn new(room: impl Into<RoomId>, user: impl Into<UserId>) -> Self {
        Self {
            room: room.into(),
            user: user.into(),
        }
    }

    /// Reads both tokens out of the `Cookie` headers of the upgrade request.
    /// Presence is the only check; empty values count as missing.
    pub fn from_headers(headers: &HeaderMap, names: &SessionCookies) -> Result<Self, RelayError> {
        let mut room = None;
        let mut user = None;

        let cookies = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok);
        for cookie in cookies {
            if cookie.value().is_empty() {
                continue;
            }
            if cookie.name() == names.room {
                room = Some(cookie.value().to_owned());
            } else if cookie.name() == names.user {
                user = Some(cookie.value().to_owned());
            }
        }

        let Some(room) = room else {
            return Err(RelayError::MalformedSession("room"));
        };
        let Some(user) = user else {
            return Err(RelayError::MalformedSession("user"));
        };

        Ok(Self::new(room, user))
    }
}
