// model.rs — Seams between the engine and whatever produces embeddings.

use std::sync::Arc;

use candle_core::Tensor;

use crate::embeddings::buffers::ScopeFrame;

/// A loaded sentence-embedding model.
pub trait SentenceEncoder: Send + Sync {
    /// Embed each text as its own row, returning a `[texts.len(), dim]` matrix.
    ///
    /// Intermediate tensors must be registered with `frame`.
    fn embed_rows(&self, texts: &[String], frame: &mut ScopeFrame<'_>) -> anyhow::Result<Tensor>;

    fn name(&self) -> &str;
}

/// Produces a `SentenceEncoder`. Called at most once per engine lifetime
/// (again only after `dispose`).
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<Arc<dyn SentenceEncoder>>;
}
