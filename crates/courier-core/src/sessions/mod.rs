//! Conversation session store
//!
//! - `SessionStore`: contract for durable backends
//! - `MemorySessionStore`: in-process implementation

mod memory;
mod traits;

pub use memory::MemorySessionStore;
pub use traits::{Session, SessionError, SessionGuard, SessionResult, SessionStore, SessionSummary};
