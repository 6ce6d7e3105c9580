//! Provider connection pool
//!
//! Keeps one live connection per tool provider, reconnects with jittered
//! exponential backoff, and retires providers that stay unreachable.

mod backoff;
mod connection;
mod error;
pub mod mock;
#[allow(clippy::module_inception)]
mod pool;
mod traits;

pub use backoff::BackoffPolicy;
pub use connection::{ConnectionState, ProviderConnection};
pub use error::{ConnectError, ConnectResult, InvokeError, InvokeResult};
pub use pool::ProviderPool;
pub(crate) use pool::PoolEntry;
pub use traits::{Connector, ToolProvider};
