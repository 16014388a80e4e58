//! Wire frames and endpoint addressing

use crate::node::Command;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One message on the wire, tagged with its channel name.
///
/// Encodes as `{"channel":"item","payload":"..."}` and so on; channel names
/// are part of the mesh protocol and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "camelCase")]
pub enum Frame {
    /// A work item forwarded to the server's pool tail
    Item(String),
    /// A work item forwarded to the server's pool front
    PriorityItem(String),
    /// A control-plane command
    Command(Command),
}

impl Frame {
    /// Encode as one newline-terminated JSON line.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode a single line; surrounding whitespace is tolerated.
    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Where a server listens and clients dial.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Unix domain socket path, `<socketRoot><appspace><id>`
    Unix(PathBuf),
    /// TCP host and port for networked transport mode
    Tcp(String, u16),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{}", path.display()),
            Endpoint::Tcp(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}
