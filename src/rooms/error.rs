/// Everything that can go wrong while relaying one connection.
///
/// Only [`RelayError::MalformedSession`] ends a connection before it joins a
/// room; the rest are reported and the room keeps being served.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("malformed session: missing {0} token")]
    MalformedSession(&'static str),

    #[error("unparsable chat message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("failed to persist message: {0:#}")]
    Persistence(anyhow::Error),

    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),
}

impl RelayError {
    pub fn kind(&self) -> &'static str {
        use RelayError::*;
        match self {
            MalformedSession(_) => "malformed_session",
            Protocol(_) => "protocol",
            Persistence(_) => "persistence",
            Transport(_) => "transport",
        }
    }
}
