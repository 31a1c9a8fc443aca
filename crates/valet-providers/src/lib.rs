//! Provider abstractions for the Valet voice pipeline.
//!
//! Two seams: [`TextGenerator`] (streaming language-model backend) and
//! [`SpeechSynthesizer`] (streaming text-to-speech backend). The
//! orchestration core only ever talks to these traits; concrete backends
//! live behind them.

pub mod error;
pub mod traits;

pub use error::{GenerationError, SynthesisError};
pub use traits::{
    AudioStream, GenerationOptions, SpeechSynthesizer, SynthesisOptions, TextGenerator,
    TokenStream,
};
