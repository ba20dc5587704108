// text/ — Stateless text processing for extractive notes.
//
// Provides:
// - Cleaning and sentence splitting of raw input
// - Centroid scoring of sentence embeddings
// - Top-K selection for summaries and bullet points

pub mod clean;
pub mod rank;

pub use clean::{clean, split_into_sentences};
pub use rank::{bulletize, summarize};
