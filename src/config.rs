use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{bail, Context};

use crate::rooms::{RelaySettings, SessionCookies};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub max_db_connections: u32,
    pub cookies: SessionCookies,
    pub relay: RelaySettings,
    pub log_filter: String,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let defaults = RelaySettings::default();
        let cookies = SessionCookies::default();

        let peer_buffer: usize = parse_or(&var, "RELAY_PEER_BUFFER", defaults.peer_buffer)?;
        if peer_buffer == 0 {
            bail!("RELAY_PEER_BUFFER must be at least 1");
        }
        let write_timeout: u64 = parse_or(&var, "RELAY_WRITE_TIMEOUT_SECS", defaults.write_timeout.as_secs())?;
        if write_timeout == 0 {
            bail!("RELAY_WRITE_TIMEOUT_SECS must be at least 1");
        }

        let log_json = match var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => false,
            Some("json") => true,
            Some(other) => bail!("LOG_FORMAT must be `pretty` or `json`, got `{other}`"),
        };

        Ok(Config {
            bind_addr: parse_or(&var, "RELAY_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: var("DATABASE_URL").unwrap_or("sqlite://chatrelay.db".to_owned()),
            max_db_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 16)?,
            cookies: SessionCookies {
                room: var("RELAY_ROOM_COOKIE").unwrap_or(cookies.room),
                user: var("RELAY_USER_COOKIE").unwrap_or(cookies.user),
            },
            relay: RelaySettings {
                keepalive: var("RELAY_KEEPALIVE").unwrap_or(defaults.keepalive),
                peer_buffer,
                write_timeout: Duration::from_secs(write_timeout),
            },
            log_filter: var("RUST_LOG").unwrap_or("info".to_owned()),
            log_json,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid {key} `{value}`")),
        None => Ok(default),
    }
}
