// session.rs — processText for the extension: debouncing, error state, Note assembly.
//
// The session is what the host hands requests to. It owns the user-visible
// error string and the count of calls in flight, and it is the only place that turns
// engine results into Notes. Results from superseded or torn-down requests are
// never reported.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::config;
use crate::debounce::Debouncer;
use crate::embeddings::EmbeddingEngine;
use crate::error::ModelError;
use crate::note::Note;

/// What happened to one `process` call.
#[derive(Debug)]
pub enum ProcessOutcome {
    Created(Note),
    /// Input was empty or whitespace.
    Blank,
    /// The pipeline failed; the message is also the session's error state.
    Failed(String),
    /// A newer call arrived during the quiet period; nothing ran.
    Superseded,
    /// Work finished after a newer call or shutdown; its result was dropped.
    Stale,
}

impl ProcessOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ProcessOutcome::Created(_) => "created",
            ProcessOutcome::Blank => "blank",
            ProcessOutcome::Failed(_) => "failed",
            ProcessOutcome::Superseded => "superseded",
            ProcessOutcome::Stale => "stale",
        }
    }

    pub fn into_note(self) -> Option<Note> {
        match self {
            ProcessOutcome::Created(note) => Some(note),
            _ => None,
        }
    }
}

/// Counts one call in flight for as long as it lives, however processing ends.
///
/// Stale calls keep running after a newer one starts, so this is a count, not a flag.
struct Processing<'a>(&'a AtomicUsize);

impl<'a> Processing<'a> {
    fn start(in_flight: &'a AtomicUsize) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct NoteSession {
    engine: Arc<EmbeddingEngine>,
    debouncer: Debouncer,
    error: Mutex<Option<String>>,
    in_flight: AtomicUsize,
    sequence: AtomicU64,
}

impl NoteSession {
    pub fn new(engine: Arc<EmbeddingEngine>, quiet_period: Duration) -> Self {
        Self {
            engine,
            debouncer: Debouncer::new(quiet_period),
            error: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<EmbeddingEngine> {
        &self.engine
    }

    /// Current user-visible error, if the last attempt failed.
    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_error(&self, message: Option<String>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = message;
    }

    /// True while any call is still computing, including ones that will turn out stale.
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Summarize and bulletize `text` into a Note, or `None`.
    pub fn process_text(&self, text: &str) -> Option<Note> {
        self.process(text).into_note()
    }

    pub fn process(&self, text: &str) -> ProcessOutcome {
        let ticket = self.debouncer.issue();
        if !self.debouncer.settle(&ticket) {
            log::debug!("processText superseded during quiet period");
            return ProcessOutcome::Superseded;
        }

        if text.trim().is_empty() {
            return ProcessOutcome::Blank;
        }

        let _processing = Processing::start(&self.in_flight);
        self.set_error(None);

        let result = self.build_note(text);

        if !ticket.is_current() {
            log::info!("Dropping stale processText result (newer request or shutdown)");
            return ProcessOutcome::Stale;
        }

        match result {
            Ok(note) => {
                log::info!(
                    "Created note {} ({} chars, summary: {}, {} bullets)",
                    note.id(),
                    note.text().len(),
                    note.summary().map_or(0, str::len),
                    note.bullets().len()
                );
                ProcessOutcome::Created(note)
            }
            Err(e) => {
                log::error!("Error processing text: {:?}", e);
                let message = display_message(&e);
                self.set_error(Some(message.clone()));
                ProcessOutcome::Failed(message)
            }
        }
    }

    fn build_note(&self, text: &str) -> anyhow::Result<Note> {
        let summary = self.engine.summarize(text)?;
        let bullets = self.engine.bulletize(text)?;

        let timestamp = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}-{}", timestamp.timestamp_millis(), seq);

        Ok(Note::new(id, text.to_string(), summary, bullets, timestamp))
    }

    /// Teardown: stale every outstanding request and release the engine.
    pub fn shutdown(&self) {
        self.debouncer.invalidate();
        self.engine.dispose();
    }
}

/// The message shown to the user: ours verbatim, anything else generic.
pub fn display_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ModelError>() {
        Some(model_err) => model_err.message().to_string(),
        None => config::processing::GENERIC_ERROR_MESSAGE.to_string(),
    }
}
