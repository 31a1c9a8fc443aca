//! Provider traits — the seams between the orchestration core and the
//! model backends.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use valet_core::types::ChatMessage;

use crate::error::{GenerationError, SynthesisError};

/// Stream of text tokens from a language model.
pub type TokenStream = BoxStream<'static, Result<String, GenerationError>>;

/// Stream of raw audio chunks from a speech synthesizer.
pub type AudioStream = BoxStream<'static, Result<Vec<u8>, SynthesisError>>;

/// Per-request generation settings.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Per-request synthesis settings. Speed and emotion are multipliers /
/// offsets on the voice's baseline.
#[derive(Clone, Debug)]
pub struct SynthesisOptions {
    pub voice_id: Option<String>,
    pub speed: f32,
    pub emotion: f32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            voice_id: None,
            speed: 1.0,
            emotion: 0.0,
        }
    }
}

/// A streaming language-model backend.
///
/// `stream` returns as soon as the backend accepts the request; tokens
/// arrive on the returned stream. Implementations should stop producing
/// promptly when `cancel` fires.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GenerationError>;

    /// Human-readable backend name, for logs.
    fn display_name(&self) -> &str;
}

/// A streaming text-to-speech backend.
///
/// `context_id` groups requests that belong to one spoken response so
/// backends with prosody context can keep the voice consistent across
/// sentences.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        context_id: &str,
        options: &SynthesisOptions,
    ) -> Result<AudioStream, SynthesisError>;

    fn display_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct FixedGenerator {
        tokens: Vec<String>,
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
            _cancel: CancellationToken,
        ) -> Result<TokenStream, GenerationError> {
            let tokens = self.tokens.clone();
            Ok(futures::stream::iter(tokens.into_iter().map(Ok)).boxed())
        }

        fn display_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_generator_trait_object() {
        let gen: Box<dyn TextGenerator> = Box::new(FixedGenerator {
            tokens: vec!["Hello".to_string(), " world.".to_string()],
        });

        let mut stream = gen
            .stream(
                &[ChatMessage::user("hi")],
                &GenerationOptions::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut out = String::new();
        while let Some(token) = stream.next().await {
            out.push_str(&token.unwrap());
        }
        assert_eq!(out, "Hello world.");
    }

    #[test]
    fn test_default_options() {
        let opts = SynthesisOptions::default();
        assert_eq!(opts.speed, 1.0);
        assert_eq!(opts.emotion, 0.0);
        assert!(opts.voice_id.is_none());
    }
}
