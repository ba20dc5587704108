// service.rs — The embedding engine behind summarize/bulletize.
//
// One engine is built at startup and shared through Arc. It owns:
// - the model handle (set once, released only by dispose)
// - the load token slot (single-flight: concurrent loads join one attempt)
// - the embedding cache
// - the buffer scope every pipeline runs inside
//
// Locks are never held across a model load or a forward pass.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;

use crate::embeddings::buffers::{BufferScope, BufferStats, ScopeFrame};
use crate::embeddings::cache::EmbeddingCache;
use crate::embeddings::model::{ModelLoader, SentenceEncoder};
use crate::embeddings::vector::EmbeddingVector;
use crate::error::ModelError;
use crate::text;

/// Marks the one load attempt in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadToken {
    attempt: u64,
}

#[derive(Default)]
struct LoadState {
    in_flight: Option<LoadToken>,
    attempts: u64,
    /// Outcome of the most recent finished attempt, for callers that joined it.
    last_outcome: Option<(LoadToken, Result<(), ModelError>)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub model_loaded: bool,
    pub load_attempts: u64,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub buffers: BufferStats,
}

pub struct EmbeddingEngine {
    loader: Box<dyn ModelLoader>,
    model: RwLock<Option<Arc<dyn SentenceEncoder>>>,
    load_state: Mutex<LoadState>,
    load_finished: Condvar,
    cache: Mutex<EmbeddingCache>,
    buffers: BufferScope,
}

/// Clears the load token however the attempt ends, including a panicking loader.
struct InFlightLoad<'e> {
    engine: &'e EmbeddingEngine,
    token: LoadToken,
    outcome: Option<Result<(), ModelError>>,
}

impl Drop for InFlightLoad<'_> {
    fn drop(&mut self) {
        let mut state = self.engine.lock_load_state();
        if let Some(outcome) = self.outcome.take() {
            state.last_outcome = Some((self.token, outcome));
        }
        if state.in_flight == Some(self.token) {
            state.in_flight = None;
        }
        drop(state);
        self.engine.load_finished.notify_all();
    }
}

impl EmbeddingEngine {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: RwLock::new(None),
            load_state: Mutex::new(LoadState::default()),
            load_finished: Condvar::new(),
            cache: Mutex::new(EmbeddingCache::new()),
            buffers: BufferScope::new(),
        }
    }

    fn lock_load_state(&self) -> MutexGuard<'_, LoadState> {
        self.load_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, EmbeddingCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn loaded_model(&self) -> Option<Arc<dyn SentenceEncoder>> {
        self.model.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded_model().is_some()
    }

    /// Make sure the model is loaded, loading it at most once across callers.
    ///
    /// A caller that finds a load in flight waits for it and gets its outcome.
    pub fn load_model(&self) -> Result<Arc<dyn SentenceEncoder>, ModelError> {
        if let Some(model) = self.loaded_model() {
            return Ok(model);
        }

        let mut state = self.lock_load_state();
        loop {
            // Re-check after every wait: the handle may have been set meanwhile.
            if let Some(model) = self.loaded_model() {
                return Ok(model);
            }
            let Some(token) = state.in_flight else {
                break;
            };

            log::debug!("Joining in-flight model load #{}", token.attempt);
            while state.in_flight == Some(token) {
                state = self
                    .load_finished
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if let Some((finished, Err(e))) = &state.last_outcome {
                if *finished == token {
                    return Err(e.clone());
                }
            }
            // Success (handle re-checked above) or the loader panicked: go round again.
        }

        state.attempts += 1;
        let token = LoadToken {
            attempt: state.attempts,
        };
        state.in_flight = Some(token);
        drop(state);

        let mut in_flight = InFlightLoad {
            engine: self,
            token,
            outcome: None,
        };

        log::info!("Loading sentence encoder (attempt #{})", token.attempt);
        let result = match self.loader.load() {
            Ok(model) => {
                *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model.clone());
                log::info!("Sentence encoder ready: {}", model.name());
                Ok(model)
            }
            Err(e) => {
                log::error!("Model load failed: {:?}", e);
                Err(ModelError::with_cause("Failed to initialize model", e))
            }
        };
        in_flight.outcome = Some(result.as_ref().map(|_| ()).map_err(|e| e.clone()));
        drop(in_flight);
        result
    }

    /// Embed the sentences of already-cleaned text, one row per sentence.
    ///
    /// Text without sentence terminators or words still embeds as a single row.
    pub fn embed(&self, cleaned: &str, frame: &mut ScopeFrame<'_>) -> Result<EmbeddingVector, ModelError> {
        if let Some(hit) = self.lock_cache().get(cleaned) {
            log::debug!("Embedding cache hit ({} x {})", hit.rows(), hit.dim());
            return Ok(hit);
        }

        let model = self.load_model()?;

        let mut units = text::split_into_sentences(cleaned);
        if units.is_empty() {
            units.push(cleaned.to_string());
        }

        let embedding = model
            .embed_rows(&units, frame)
            .and_then(EmbeddingVector::new)
            .map_err(|e| ModelError::with_cause("Failed to generate embeddings", e))?;

        // Two callers racing on one text may both land here; the later copy wins.
        if let Err(e) = self.lock_cache().set(cleaned, &embedding) {
            log::warn!("Embedding not cached: {:?}", e);
        }
        Ok(embedding)
    }

    /// Text with nothing to rank yields `T::default()` without touching the model.
    fn run_pipeline<T: Default>(
        &self,
        input: &str,
        select: impl FnOnce(&[String], &EmbeddingVector) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let cleaned = text::clean(input);
        let sentences = text::split_into_sentences(&cleaned);
        if sentences.is_empty() {
            log::debug!("No sentences to rank, skipping model");
            return Ok(T::default());
        }
        self.buffers.run_scoped(|frame| {
            let embedding = self.embed(&cleaned, frame)?;
            select(&sentences, &embedding)
        })
    }

    /// Up to three top-ranked sentences, joined with ". " and a trailing period.
    pub fn summarize(&self, input: &str) -> Result<String, ModelError> {
        self.run_pipeline(input, |sentences, embedding| text::summarize(sentences, embedding.tensor()))
            .map_err(|e| ModelError::with_cause("Failed to generate summary", e))
    }

    /// Up to five top-ranked sentences.
    pub fn bulletize(&self, input: &str) -> Result<Vec<String>, ModelError> {
        self.run_pipeline(input, |sentences, embedding| text::bulletize(sentences, embedding.tensor()))
            .map_err(|e| ModelError::with_cause("Failed to generate bullet points", e))
    }

    /// Drop cached embeddings and the loaded model. The next call reloads lazily.
    pub fn dispose(&self) {
        let cached = {
            let mut cache = self.lock_cache();
            let n = cache.len();
            if !cache.is_empty() {
                cache.dispose();
            }
            n
        };

        {
            let mut state = self.lock_load_state();
            if state.in_flight.is_some() {
                log::warn!("Disposing engine while a model load is in flight");
            }
            state.last_outcome = None;
        }

        let retained = self.model.write().unwrap_or_else(PoisonError::into_inner).take();
        let released = self.buffers.release_all(retained);
        log::info!(
            "Embedding engine disposed ({} cached embeddings dropped, model released: {})",
            cached,
            released
        );
    }

    pub fn stats(&self) -> EngineStats {
        let (cache_entries, cache_capacity) = {
            let cache = self.lock_cache();
            (cache.len(), cache.capacity())
        };
        EngineStats {
            model_loaded: self.is_loaded(),
            load_attempts: self.lock_load_state().attempts,
            cache_entries,
            cache_capacity,
            buffers: self.buffers.stats(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use candle_core::{Device, Tensor};

    /// Deterministic encoder: a sentence's row counts a few marker words.
    pub struct WordCountEncoder {
        pub calls: Arc<AtomicUsize>,
        pub fail: bool,
    }

    const MARKERS: &[&str] = &["cat", "rain", "dog", "sun"];

    impl SentenceEncoder for WordCountEncoder {
        fn embed_rows(&self, texts: &[String], frame: &mut ScopeFrame<'_>) -> anyhow::Result<Tensor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("forward pass exploded");
            }
            let mut flat = Vec::with_capacity(texts.len() * (MARKERS.len() + 1));
            for t in texts {
                let lower = t.to_lowercase();
                for m in MARKERS {
                    flat.push(lower.matches(m).count() as f32);
                }
                flat.push(1.0);
            }
            // Something intermediate to release.
            frame.track(Tensor::zeros((4, 4), candle_core::DType::F32, &Device::Cpu)?);
            Ok(Tensor::from_vec(flat, (texts.len(), MARKERS.len() + 1), &Device::Cpu)?)
        }

        fn name(&self) -> &str {
            "word-count"
        }
    }

    /// Loader that counts loads, can be slowed down, and can fail.
    pub struct FakeLoader {
        pub loads: Arc<AtomicUsize>,
        pub embed_calls: Arc<AtomicUsize>,
        pub delay: Duration,
        pub fail_load: Arc<AtomicBool>,
        pub fail_embed: bool,
    }

    impl FakeLoader {
        pub fn new() -> Self {
            Self {
                loads: Arc::new(AtomicUsize::new(0)),
                embed_calls: Arc::new(AtomicUsize::new(0)),
                delay: Duration::ZERO,
                fail_load: Arc::new(AtomicBool::new(false)),
                fail_embed: false,
            }
        }
    }

    impl ModelLoader for FakeLoader {
        fn load(&self) -> anyhow::Result<Arc<dyn SentenceEncoder>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail_load.load(Ordering::SeqCst) {
                anyhow::bail!("weights missing");
            }
            Ok(Arc::new(WordCountEncoder {
                calls: self.embed_calls.clone(),
                fail: self.fail_embed,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeLoader;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Barrier;
    use std::time::Duration;

    const TEXT: &str = "A cat sat. A cat slept. It rained heavily outside today.";

    #[test]
    fn test_concurrent_loads_share_one_attempt() {
        let mut loader = FakeLoader::new();
        loader.delay = Duration::from_millis(200);
        let loads = loader.loads.clone();
        let engine = EmbeddingEngine::new(Box::new(loader));
        let barrier = Barrier::new(5);

        let outcomes: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..5)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        engine.load_model().is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(outcomes.iter().all(|ok| *ok));
        assert!(engine.is_loaded());
    }

    #[test]
    fn test_concurrent_loads_share_one_failure() {
        let mut loader = FakeLoader::new();
        loader.delay = Duration::from_millis(200);
        loader.fail_load.store(true, Ordering::SeqCst);
        let loads = loader.loads.clone();
        let engine = EmbeddingEngine::new(Box::new(loader));
        let barrier = Barrier::new(5);

        let messages: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..5)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        match engine.load_model() {
                            Ok(_) => "ok".to_string(),
                            Err(e) => e.to_string(),
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(messages.iter().all(|m| m == "Failed to initialize model"));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_failed_load_clears_token_and_retries() {
        let loader = FakeLoader::new();
        loader.fail_load.store(true, Ordering::SeqCst);
        let fail_switch = loader.fail_load.clone();
        let loads = loader.loads.clone();
        let engine = EmbeddingEngine::new(Box::new(loader));

        let err = engine.load_model().err().expect("first load fails");
        assert_eq!(err.message(), "Failed to initialize model");
        assert!(err.cause().unwrap().to_string().contains("weights missing"));

        fail_switch.store(false, Ordering::SeqCst);
        assert!(engine.load_model().is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(engine.stats().load_attempts, 2);
    }

    #[test]
    fn test_load_is_noop_once_loaded() {
        let loader = FakeLoader::new();
        let loads = loader.loads.clone();
        let engine = EmbeddingEngine::new(Box::new(loader));
        engine.load_model().unwrap();
        engine.load_model().unwrap();
        engine.load_model().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_embed_uses_cache_on_second_call() {
        let loader = FakeLoader::new();
        let calls = loader.embed_calls.clone();
        let engine = EmbeddingEngine::new(Box::new(loader));
        let cleaned = text::clean(TEXT);

        let first = engine.buffers.run_scoped(|frame| engine.embed(&cleaned, frame)).unwrap();
        let second = engine.buffers.run_scoped(|frame| engine.embed(&cleaned, frame)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.rows(), 3);
        assert_eq!(first.to_rows().unwrap(), second.to_rows().unwrap());
        assert!(!first.shares_storage_with(&second));
    }

    #[test]
    fn test_embed_without_terminators_is_single_row() {
        let engine = EmbeddingEngine::new(Box::new(FakeLoader::new()));
        let row = engine.buffers.run_scoped(|frame| engine.embed("!!!", frame)).unwrap();
        assert_eq!(row.rows(), 1);
    }

    #[test]
    fn test_summarize_end_to_end_contract() {
        let engine = EmbeddingEngine::new(Box::new(FakeLoader::new()));
        let summary = engine.summarize(TEXT).unwrap();

        assert!(summary.ends_with('.'));
        let allowed = ["A cat sat", "A cat slept", "It rained heavily outside today"];
        let parts: Vec<&str> = summary.trim_end_matches('.').split(". ").collect();
        assert!(!parts.is_empty() && parts.len() <= 3);
        assert!(parts.iter().all(|p| allowed.contains(p)), "unexpected parts: {parts:?}");
    }

    #[test]
    fn test_bulletize_end_to_end() {
        let engine = EmbeddingEngine::new(Box::new(FakeLoader::new()));
        let bullets = engine.bulletize(TEXT).unwrap();
        assert_eq!(bullets.len(), 3);
        // The two cat sentences sit closest to the centroid.
        assert_eq!(&bullets[..2], &["A cat sat".to_string(), "A cat slept".to_string()]);
        assert_eq!(bullets[2], "It rained heavily outside today");
    }

    #[test]
    fn test_pipeline_releases_buffers() {
        let engine = EmbeddingEngine::new(Box::new(FakeLoader::new()));
        for _ in 0..3 {
            engine.summarize(TEXT).unwrap();
            engine.bulletize("Sun and dog. Rain again.").unwrap();
        }
        let stats = engine.stats().buffers;
        assert_eq!(stats.live_buffers, 0);
        assert_eq!(stats.active_scopes, 0);
        assert!(stats.released_total > 0);
    }

    #[test]
    fn test_embedding_failure_is_wrapped_and_released() {
        let mut loader = FakeLoader::new();
        loader.fail_embed = true;
        let engine = EmbeddingEngine::new(Box::new(loader));

        let err = engine.summarize(TEXT).unwrap_err();
        assert_eq!(err.message(), "Failed to generate summary");
        let cause = err.cause().unwrap().to_string();
        assert!(cause.contains("Failed to generate embeddings"), "cause was {cause}");

        let err = engine.bulletize(TEXT).unwrap_err();
        assert_eq!(err.message(), "Failed to generate bullet points");

        assert_eq!(engine.stats().buffers.live_buffers, 0);
        assert_eq!(engine.stats().cache_entries, 0);
    }

    #[test]
    fn test_load_failure_surfaces_through_summary() {
        let loader = FakeLoader::new();
        loader.fail_load.store(true, Ordering::SeqCst);
        let engine = EmbeddingEngine::new(Box::new(loader));
        let err = engine.summarize(TEXT).unwrap_err();
        assert_eq!(err.message(), "Failed to generate summary");
        assert!(err.cause().unwrap().to_string().contains("Failed to initialize model"));
    }

    #[test]
    fn test_dispose_then_reuse_reloads() {
        let loader = FakeLoader::new();
        let loads = loader.loads.clone();
        let engine = EmbeddingEngine::new(Box::new(loader));

        engine.summarize(TEXT).unwrap();
        assert_eq!(engine.stats().cache_entries, 1);

        engine.dispose();
        assert!(!engine.is_loaded());
        assert_eq!(engine.stats().cache_entries, 0);
        engine.dispose();

        let summary = engine.summarize(TEXT).unwrap();
        assert!(summary.ends_with('.'));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(engine.is_loaded());
    }

    #[test]
    fn test_text_without_sentences_gives_empty_results() {
        let engine = EmbeddingEngine::new(Box::new(FakeLoader::new()));
        assert_eq!(engine.summarize("?!").unwrap(), "");
        assert!(engine.bulletize("?!").unwrap().is_empty());
    }

    #[test]
    fn test_nothing_to_rank_never_loads_model() {
        let loader = FakeLoader::new();
        let loads = loader.loads.clone();
        let embed_calls = loader.embed_calls.clone();
        let engine = EmbeddingEngine::new(Box::new(loader));

        for input in ["", "   ", "@@@", "?!", "..."] {
            assert_eq!(engine.summarize(input).unwrap(), "");
            assert!(engine.bulletize(input).unwrap().is_empty());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(embed_calls.load(Ordering::SeqCst), 0);
        let stats = engine.stats();
        assert!(!stats.model_loaded);
        assert_eq!(stats.load_attempts, 0);
        assert_eq!(stats.cache_entries, 0);
    }
}
