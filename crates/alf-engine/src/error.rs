use thiserror::Error;

/// The image API rejected the request or answered with something unusable.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("The ALF spirits encountered an error: {0}")]
    Api(String),

    #[error("malformed image response: {0}")]
    MalformedResponse(String),

    #[error("No ALF manifested in the digital realm...")]
    NoImages,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("The swamp spirits are restless: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl EngineError {
    pub fn is_generation(&self) -> bool {
        matches!(self, EngineError::Generation(_))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::{EngineError, GenerationError};

    #[test]
    fn generation_errors_read_as_user_messages() {
        let err = EngineError::from(GenerationError::Api("quota exceeded".to_string()));
        assert!(err.is_generation());
        assert_eq!(
            err.to_string(),
            "The ALF spirits encountered an error: quota exceeded"
        );
    }

    #[test]
    fn unexpected_errors_keep_their_context_chain() {
        let source: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err = EngineError::from(source.context("failed encoding reference").unwrap_err());
        assert!(!err.is_generation());
        assert_eq!(
            err.to_string(),
            "The swamp spirits are restless: failed encoding reference: disk full"
        );
    }
}
