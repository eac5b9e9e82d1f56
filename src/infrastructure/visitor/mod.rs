//! Visitor infrastructure - Per-visitor assignment storage

mod redis;
mod session;

pub use redis::{RedisVisitorStore, DEFAULT_VISITOR_NAMESPACE};
pub use session::SessionVisitorStore;
