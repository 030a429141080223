use serde::{Deserialize, Serialize};

/// Transport name reported while the real-time channel is down.
pub const DISCONNECTED_TRANSPORT: &str = "N/A";

/// A score file staged for the viewer. Serializes as `{ "type", "url" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedScoreFile {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub transport: String,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            transport: DISCONNECTED_TRANSPORT.to_string(),
        }
    }

    pub fn connected(transport: impl Into<String>) -> Self {
        Self {
            connected: true,
            transport: transport.into(),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected()
    }
}
