//! Provider error types.

/// Errors from a text-generation backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// The backend rejected the request or failed mid-stream.
    #[error("generation backend error: {0}")]
    Backend(String),
    /// The stream ended before the backend signalled completion.
    #[error("generation stream closed unexpectedly")]
    StreamClosed,
}

/// Errors from a speech-synthesis backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GenerationError::Backend("rate limited".to_string());
        assert_eq!(err.to_string(), "generation backend error: rate limited");

        let err = SynthesisError::Backend("voice not found".to_string());
        assert!(err.to_string().contains("voice not found"));
    }
}
