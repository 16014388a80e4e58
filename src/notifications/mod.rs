//! Node event notifications
//!
//! A node announces pool activity (`empty`, `process`) to any number of
//! subscribers. Each node owns its hub; there is no process-wide service.

mod event;
mod manager;

pub use event::{NodeEvent, NodeEventType};
pub use manager::NotificationHub;
