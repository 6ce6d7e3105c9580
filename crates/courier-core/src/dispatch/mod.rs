//! Tool invocation dispatcher

mod dispatcher;

pub use dispatcher::ToolDispatcher;
