//! Event types for the notification hub

use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq)]
pub enum NodeEventType {
    /// The pool drained to its configured minimum
    Empty,
    /// An item was dequeued by `run()` for external handling
    Process,
}

#[derive(Clone, Debug)]
pub struct NodeEvent {
    pub event_type: NodeEventType,
    pub timestamp: SystemTime,
    /// The dequeued item for `Process` events
    pub item: Option<String>,
}

impl NodeEvent {
    pub fn empty() -> Self {
        Self {
            event_type: NodeEventType::Empty,
            timestamp: SystemTime::now(),
            item: None,
        }
    }

    pub fn process(item: String) -> Self {
        Self {
            event_type: NodeEventType::Process,
            timestamp: SystemTime::now(),
            item: Some(item),
        }
    }
}
