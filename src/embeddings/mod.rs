// embeddings/ — Local sentence embedding engine using candle (pure Rust).
//
// Provides:
// - Model download + SHA256 verification
// - BERT inference with mean pooling, one row per sentence
// - Bounded FIFO embedding cache and scoped buffer release
// - The engine that ties them together with single-flight model loading

pub mod buffers;
pub mod cache;
pub mod download;
pub mod encoder;
pub mod model;
pub mod service;
pub mod vector;

pub use encoder::CandleLoader;
pub use service::EmbeddingEngine;
