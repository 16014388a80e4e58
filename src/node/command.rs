//! Control-plane commands
//!
//! A command names an action, optionally carries a value, and is optionally
//! scoped to a single node by session id. Commands arrive over the `command`
//! channel; the server hub re-broadcasts whatever the dispatch table returns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// When set, only the node with this session id executes the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl Command {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            sid: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            sid: None,
        }
    }

    /// Scope this command to one node's session id.
    pub fn scoped(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }
}
