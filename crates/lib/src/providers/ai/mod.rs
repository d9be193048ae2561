pub mod local;

use crate::errors::ProviderError;
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;

/// Decoding bounds sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Hard cap on generated tokens, so a runaway completion cannot stall a request.
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.0,
            repetition_penalty: 1.2,
        }
    }
}

/// A handle to a served text-to-SQL model.
///
/// Implementations receive the fully rendered prompt and return the model's raw
/// completion; extracting the SQL from it is the generator's job. Loading the
/// weights and adapter happens outside this crate.
#[async_trait]
pub trait AiProvider: Send + Sync + Debug + DynClone {
    /// Completes the prompt, honouring the given decoding bounds.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;
}

dyn_clone::clone_trait_object!(AiProvider);
