// encoder.rs — Candle BERT sentence encoder with attention-mask-aware mean pooling.
//
// Loads all-MiniLM-L6-v2 from safetensors and produces one L2-normalized
// 384-dim row per input sentence. Every tensor created during a forward pass is
// registered with the caller's ScopeFrame so it is freed when the call ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use crate::config;
use crate::embeddings::buffers::ScopeFrame;
use crate::embeddings::download;
use crate::embeddings::model::{ModelLoader, SentenceEncoder};

/// The loaded model and tokenizer.
pub struct CandleEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl CandleEncoder {
    /// Load the model from a local directory containing model.safetensors,
    /// tokenizer.json, and config.json.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let device = Device::Cpu;

        let config_path = model_dir.join("config.json");
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("parse {}", config_path.display()))?;

        log::info!(
            "Loading embedding model: hidden_size={}, layers={}, heads={}",
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads,
        );

        let weights_path = model_dir.join("model.safetensors");
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
                .with_context(|| format!("load weights from {}", weights_path.display()))?
        };

        let model = BertModel::load(vb, &config).context("load BERT model")?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        log::info!("Embedding model loaded successfully (dims={})", config.hidden_size);

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// One `[1, dim]` row for one sentence.
    fn embed_one(&self, text: &str, frame: &mut ScopeFrame<'_>) -> anyhow::Result<Tensor> {
        if text.trim().is_empty() {
            let zeros = Tensor::zeros((1, config::embedding::EMBEDDING_DIMS), DType::F32, &self.device)?;
            return Ok(frame.track(zeros));
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let max_len = config::embedding::MAX_TOKENS;
        let len = encoding.get_ids().len().min(max_len);
        let token_ids = &encoding.get_ids()[..len];
        let attention_mask = &encoding.get_attention_mask()[..len];

        // [1, seq_len]
        let token_ids_t = frame.track(
            Tensor::new(
                token_ids.iter().map(|&id| id as i64).collect::<Vec<_>>().as_slice(),
                &self.device,
            )?
            .unsqueeze(0)?,
        );
        let attention_mask_t = frame.track(
            Tensor::new(
                attention_mask.iter().map(|&m| m as i64).collect::<Vec<_>>().as_slice(),
                &self.device,
            )?
            .unsqueeze(0)?,
        );
        let token_type_ids = frame.track(token_ids_t.zeros_like()?);

        // [1, seq_len, hidden_size]
        let output = frame.track(
            self.model
                .forward(&token_ids_t, &token_type_ids, Some(&attention_mask_t))?,
        );

        let pooled = mean_pooling(&output, &attention_mask_t, frame)?;
        let pooled = frame.track(pooled);
        let row = frame.track(l2_normalize(&pooled)?);

        if row.dims2()?.1 != config::embedding::EMBEDDING_DIMS {
            bail!(
                "unexpected embedding dims: got {:?}, expected {}",
                row.dims(),
                config::embedding::EMBEDDING_DIMS
            );
        }
        Ok(row)
    }
}

impl SentenceEncoder for CandleEncoder {
    fn embed_rows(&self, texts: &[String], frame: &mut ScopeFrame<'_>) -> anyhow::Result<Tensor> {
        if texts.is_empty() {
            bail!("nothing to embed");
        }
        log::debug!("Embedding {} sentence(s)", texts.len());

        // One sentence at a time avoids padding; notes are short.
        let rows = texts
            .iter()
            .map(|t| self.embed_one(t, frame))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Tensor::cat(&rows, 0)?)
    }

    fn name(&self) -> &str {
        config::embedding::EMBEDDING_MODEL_NAME
    }
}

/// Attention-mask-aware mean pooling.
///
/// input_embeds: [batch, seq_len, hidden_size]
/// attention_mask: [batch, seq_len] (1 for real tokens, 0 for padding)
/// output: [batch, hidden_size]
fn mean_pooling(input_embeds: &Tensor, attention_mask: &Tensor, frame: &mut ScopeFrame<'_>) -> anyhow::Result<Tensor> {
    let mask_expanded = frame.track(
        attention_mask
            .to_dtype(DType::F32)?
            .unsqueeze(2)?
            .broadcast_as(input_embeds.shape())?,
    );

    let sum_embeddings = frame.track((input_embeds * &mask_expanded)?.sum(1)?);

    // Clamp to avoid div by zero
    let sum_mask = frame.track(mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?);

    Ok((sum_embeddings / sum_mask)?)
}

/// L2 normalize a tensor along the last dimension.
fn l2_normalize(tensor: &Tensor) -> anyhow::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.clamp(1e-12, f64::MAX)?;
    Ok(tensor.broadcast_div(&norm)?)
}

/// Resolves, downloads if needed, and loads the candle model.
#[derive(Debug, Clone, Default)]
pub struct CandleLoader {
    model_dir: Option<PathBuf>,
}

impl CandleLoader {
    pub fn new(model_dir: Option<PathBuf>) -> Self {
        Self { model_dir }
    }
}

impl ModelLoader for CandleLoader {
    fn load(&self) -> anyhow::Result<Arc<dyn SentenceEncoder>> {
        let dir = download::model_dir(self.model_dir.as_deref())?;
        download::ensure_model_files(&dir)?;
        let encoder = CandleEncoder::load(&dir)?;
        Ok(Arc::new(encoder))
    }
}
