// vector.rs — Owned embedding matrix (one row per sentence).

use anyhow::Context;
use candle_core::{DType, Tensor};

/// A `[rows, dim]` f32 embedding matrix.
///
/// Not `Clone`. Use `deep_copy` so each holder owns its own storage.
#[derive(Debug)]
pub struct EmbeddingVector {
    tensor: Tensor,
}

impl EmbeddingVector {
    /// Wrap a 2-D tensor, converting to f32 if needed.
    pub fn new(tensor: Tensor) -> anyhow::Result<Self> {
        tensor.dims2().context("embedding must be a [rows, dim] matrix")?;
        let tensor = tensor.to_dtype(DType::F32)?;
        Ok(Self { tensor })
    }

    #[cfg(test)]
    pub fn from_rows(rows: &[Vec<f32>]) -> anyhow::Result<Self> {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        anyhow::ensure!(rows.iter().all(|r| r.len() == dim), "embedding rows have different lengths");
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Self::new(Tensor::from_vec(flat, (rows.len(), dim), &candle_core::Device::Cpu)?)
    }

    pub fn rows(&self) -> usize {
        self.tensor.dims()[0]
    }

    pub fn dim(&self) -> usize {
        self.tensor.dims()[1]
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Copy into freshly allocated storage.
    pub fn deep_copy(&self) -> anyhow::Result<Self> {
        Ok(Self {
            tensor: self.tensor.copy()?,
        })
    }

    /// True when both values are backed by the same buffer.
    #[cfg(test)]
    pub fn shares_storage_with(&self, other: &EmbeddingVector) -> bool {
        self.tensor.id() == other.tensor.id()
    }

    #[cfg(test)]
    pub fn to_rows(&self) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(self.tensor.to_vec2::<f32>()?)
    }

    /// Give the backing storage back. Consumes the value.
    pub fn release(self) {
        drop(self.tensor);
    }
}
