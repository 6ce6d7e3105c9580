//! Logging abstractions

mod traits;
mod noop;
mod tracing_logger;
mod memory;

pub use traits::{Logger, SharedLogger};
pub use noop::NoOpLogger;
pub use tracing_logger::TracingLogger;
pub use memory::{LogLevel, MemoryLogger};
