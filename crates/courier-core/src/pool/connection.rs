//! Connection state as seen from outside the pool

use serde::{Deserialize, Serialize};

use crate::types::ToolSpec;

/// Liveness of one provider connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Ready,
    /// A call failed at the transport level; the next use reconnects
    Degraded,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of a provider connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConnection {
    pub id: String,
    pub state: ConnectionState,
    /// Closed for the rest of the process lifetime
    pub retired: bool,
    /// Unqualified tools last listed by the provider
    pub tools: Vec<ToolSpec>,
}
