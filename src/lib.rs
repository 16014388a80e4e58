pub mod app;
pub mod core;
pub mod node;
pub mod notifications;
pub mod pool;
pub mod transport;

include!(concat!(env!("OUT_DIR"), "/version.rs"));
