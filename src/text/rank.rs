// rank.rs — Centroid scoring and top-K sentence selection.
//
// Every sentence row is scored by its dot product with the centroid (row-wise
// mean) of all rows, so sentences closest to the document's overall meaning rank
// first. Selection is a stable sort on score: equal scores keep their original
// order, and the output stays in rank order rather than reading order.

use std::cmp::Ordering;

use anyhow::{ensure, Context};
use candle_core::{DType, Tensor};

use crate::config;

/// Row-wise mean of a `[rows, dim]` embedding matrix, shaped `[1, dim]`.
pub fn centroid(embeddings: &Tensor) -> anyhow::Result<Tensor> {
    let (rows, _) = embeddings.dims2().context("embedding matrix must be 2-D")?;
    ensure!(rows > 0, "cannot take the centroid of an empty embedding matrix");
    Ok(embeddings.to_dtype(DType::F32)?.mean_keepdim(0)?)
}

/// Dot product of every row with `document` (a `[1, dim]` or `[dim]` tensor).
pub fn score(embeddings: &Tensor, document: &Tensor) -> anyhow::Result<Vec<f32>> {
    let (_, dim) = embeddings.dims2().context("embedding matrix must be 2-D")?;
    let document = document.to_dtype(DType::F32)?.reshape((dim, 1))?;
    let scores = embeddings.to_dtype(DType::F32)?.matmul(&document)?;
    Ok(scores.squeeze(1)?.to_vec1::<f32>()?)
}

/// Centroid-similarity score of every row.
pub fn sentence_scores(embeddings: &Tensor) -> anyhow::Result<Vec<f32>> {
    let document = centroid(embeddings)?;
    score(embeddings, &document)
}

/// Take the `k` highest-scoring sentences, highest first.
///
/// Ties keep original index order. NaN scores rank below everything else.
/// Extra sentences without a score (or extra scores) are ignored.
pub fn select_top(sentences: &[String], scores: &[f32], k: usize) -> Vec<String> {
    let mut ranked: Vec<(usize, f32)> = scores
        .iter()
        .take(sentences.len())
        .map(|&s| if s.is_nan() { f32::NEG_INFINITY } else { s })
        .enumerate()
        .collect();

    // sort_by is stable, which is what fixes the tie-break.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    ranked
        .into_iter()
        .take(k)
        .map(|(i, _)| sentences[i].trim().to_string())
        .collect()
}

fn ranked_sentences(sentences: &[String], embeddings: &Tensor, k: usize) -> anyhow::Result<Vec<String>> {
    if sentences.is_empty() {
        return Ok(Vec::new());
    }
    let (rows, _) = embeddings.dims2().context("embedding matrix must be 2-D")?;
    ensure!(
        rows == sentences.len(),
        "embedding rows ({rows}) do not match sentence count ({})",
        sentences.len()
    );
    let scores = sentence_scores(embeddings)?;
    Ok(select_top(sentences, &scores, k))
}

/// Top three sentences joined with `". "` and a trailing period.
/// No sentences gives an empty summary.
pub fn summarize(sentences: &[String], embeddings: &Tensor) -> anyhow::Result<String> {
    let top = ranked_sentences(sentences, embeddings, config::processing::SUMMARY_SENTENCES)?;
    if top.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("{}.", top.join(". ")))
}

/// Top five sentences as bullet points.
pub fn bulletize(sentences: &[String], embeddings: &Tensor) -> anyhow::Result<Vec<String>> {
    ranked_sentences(sentences, embeddings, config::processing::BULLET_POINTS)
}
