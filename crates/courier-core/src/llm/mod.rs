//! Language model boundary
//!
//! `GenaiModel` talks to hosted models through the `genai` crate, which
//! handles provider protocols, streaming and tool-call capture.
//! `ScriptedModel` replays canned replies for tests.

mod error;
mod genai_adapter;
mod genai_model;
mod mock;
mod traits;

pub use error::{ModelError, ModelResult};
pub use genai_adapter::WireNames;
pub use genai_model::GenaiModel;
pub use mock::ScriptedModel;
pub use traits::{LanguageModel, ModelReply, ModelRequest};
