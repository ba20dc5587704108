//! The one error kind the summarization core raises.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// A failure inside the embedding/scoring pipeline.
///
/// `Clone` so every caller joined on one model load observes the same failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ModelError {
    message: String,
    #[source]
    cause: Option<Cause>,
}

impl ModelError {
    #[cfg(test)]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        let cause: anyhow::Error = cause.into();
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
        Self {
            message: message.into(),
            cause: Some(Arc::from(boxed)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    #[cfg(test)]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message_only() {
        let err = ModelError::with_cause("Failed to initialize model", anyhow::anyhow!("no weights"));
        assert_eq!(err.to_string(), "Failed to initialize model");
        assert_eq!(err.message(), "Failed to initialize model");
    }

    #[test]
    fn test_source_chain_keeps_cause() {
        let err = ModelError::with_cause("Failed to generate summary", anyhow::anyhow!("tokenize: bad input"));
        let source = err.source().expect("cause should be exposed as source");
        assert_eq!(source.to_string(), "tokenize: bad input");

        let bare = ModelError::new("Model not loaded");
        assert!(bare.source().is_none());
        assert!(bare.cause().is_none());
    }

    #[test]
    fn test_clone_shares_cause() {
        let err = ModelError::with_cause("Failed to initialize model", anyhow::anyhow!("disk full"));
        let copy = err.clone();
        assert_eq!(copy.cause().map(|c| c.to_string()), Some("disk full".to_string()));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = ModelError::new("Failed to generate bullet points").into();
        let model_err = err.downcast_ref::<ModelError>().expect("should downcast");
        assert_eq!(model_err.message(), "Failed to generate bullet points");
    }
}
