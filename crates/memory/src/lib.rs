//! Durable observation memory: SQLite rows plus per-row embedding vectors.
//!
//! Memory is a feature, not a contract: every operation here is best-effort.
//! A failed save is logged and swallowed by callers; recall degrades through
//! three tiers (vector similarity → token substring match → plain recency)
//! instead of raising; a corrupt database surfaces as empty recall results.

use std::sync::Arc;

mod context;
mod store;
mod types;

pub use context::{
    format_curiosities_for_context, format_feelings_for_context, format_for_context,
    format_self_model_for_context,
};
pub use store::ObservationStore;
pub use types::{Emotion, MemoryKind, MemoryRecord};

/// Synchronous text-embedding backend.
///
/// The closure accepts an already-prefixed text (`passage: …` for documents,
/// `query: …` for queries) and returns a unit-length vector, or `None` when
/// the encoder is unavailable. Implementations are expected to lazy-load the
/// actual model on first call; the store never invokes this during startup.
pub type EmbedFn = Arc<dyn Fn(&str) -> Option<Vec<f32>> + Send + Sync>;

/// Errors from the memory store. Callers treat these as non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("memory store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
