// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod enrich;
pub mod filter;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod window;

// ---- Re-exports for stable public API ----
pub use crate::filter::{CompiledGrammar, GrammarError, Matched};
pub use crate::notify::{ChannelOutcome, Notifier, NotifierMux, NotifyPayload};
pub use crate::pipeline::{Pipeline, PipelineError, RunOutcome, RunSummary, Runner};
pub use crate::source::types::{FetchError, SourceProvider, TrendItem};
pub use crate::state::{PushMode, PushState, StateStore};
pub use crate::window::PushWindow;
