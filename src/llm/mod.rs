//! Generation backend built on rig-core's OpenAI client.
//!
//! One completion per forwarded email: the task role goes in as the preamble
//! and the assembled prompt as the user message. Failed requests are not
//! retried; the ingestion loop sees a `GenerationError` and replies with a
//! placeholder.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{AssistantContent, CompletionError, CompletionModel};
use secrecy::ExposeSecret;

use crate::config::{DEFAULT_OPENAI_BASE_URL, LlmConfig};
use crate::error::GenerationError;
use crate::pipeline::TextGenerator;

const PROVIDER: &str = "openai";

/// Create the OpenAI-backed generator from configuration.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    use rig::providers::openai;

    let key = config.api_key.expose_secret();
    let client_error = |e: String| GenerationError::RequestFailed {
        provider: PROVIDER.to_string(),
        reason: format!("Failed to create OpenAI client: {e}"),
    };

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        if config.base_url.trim_end_matches('/') == DEFAULT_OPENAI_BASE_URL {
            openai::Client::new(key).map_err(|e| client_error(e.to_string()))?
        } else {
            openai::Client::builder()
                .api_key(key)
                .base_url(&config.base_url)
                .build()
                .map_err(|e| client_error(e.to_string()))?
        };

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(ChatCompletionsGenerator::new(model, &config.model)))
}

/// Bridges a rig `CompletionModel` to `TextGenerator`.
pub struct ChatCompletionsGenerator<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> ChatCompletionsGenerator<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> TextGenerator for ChatCompletionsGenerator<M>
where
    M: CompletionModel + 'static,
{
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        system_role: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        tracing::debug!(
            model = %self.model_name,
            prompt_len = user_prompt.len(),
            "Requesting completion"
        );

        let response = self
            .model
            .completion_request(user_prompt.to_string())
            .preamble(system_role.to_string())
            .max_tokens(u64::from(max_tokens))
            .temperature(f64::from(temperature))
            .send()
            .await
            .map_err(map_completion_error)?;

        join_text(response.choice.iter().filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        }))
    }
}

/// Classify a rig error. Auth failures drop the message, which may echo the key.
fn map_completion_error(err: CompletionError) -> GenerationError {
    let message = err.to_string();
    let lowered = message.to_lowercase();

    if lowered.contains("401")
        || lowered.contains("403")
        || lowered.contains("invalid_api_key")
        || lowered.contains("incorrect api key")
    {
        return GenerationError::AuthFailed {
            provider: PROVIDER.into(),
        };
    }
    if lowered.contains("429") || lowered.contains("rate limit") {
        return GenerationError::RateLimited {
            provider: PROVIDER.into(),
            retry_after: None,
        };
    }

    match err {
        CompletionError::ResponseError(_) | CompletionError::JsonError(_) => {
            GenerationError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: truncate(&message, 300),
            }
        }
        _ => GenerationError::RequestFailed {
            provider: PROVIDER.into(),
            reason: truncate(&message, 300),
        },
    }
}

/// Concatenate the text parts of a completion. Empty output is an error.
fn join_text<'a>(parts: impl Iterator<Item = &'a str>) -> Result<String, GenerationError> {
    let joined = parts.collect::<Vec<_>>().join("\n");
    let content = joined.trim();
    if content.is_empty() {
        return Err(GenerationError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "empty completion".into(),
        });
    }
    Ok(content.to_string())
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    // ── Response text ───────────────────────────────────────────────

    #[test]
    fn joins_and_trims_text_parts() {
        let text = join_text(["  Hello Jane,", "yes.  "].into_iter()).unwrap();
        assert_eq!(text, "Hello Jane,\nyes.");
    }

    #[test]
    fn no_text_parts_is_invalid() {
        assert!(matches!(
            join_text(std::iter::empty()),
            Err(GenerationError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn whitespace_only_completion_is_invalid() {
        assert!(matches!(
            join_text([" \n "].into_iter()),
            Err(GenerationError::InvalidResponse { .. })
        ));
    }

    // ── Error mapping ───────────────────────────────────────────────

    #[test]
    fn invalid_key_maps_to_auth_failed() {
        let err = map_completion_error(CompletionError::ProviderError(
            "401 Incorrect API key provided: sk-abc".into(),
        ));
        assert!(matches!(err, GenerationError::AuthFailed { .. }));
        assert!(!err.to_string().contains("sk-abc"));
    }

    #[test]
    fn rate_limit_maps_to_rate_limited() {
        let err = map_completion_error(CompletionError::ProviderError(
            "Rate limit reached for gpt-4".into(),
        ));
        assert!(matches!(err, GenerationError::RateLimited { retry_after: None, .. }));
    }

    #[test]
    fn response_error_maps_to_invalid_response() {
        let err = map_completion_error(CompletionError::ResponseError("no message".into()));
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));
    }

    #[test]
    fn other_provider_error_is_truncated() {
        let err = map_completion_error(CompletionError::ProviderError("x".repeat(1000)));
        assert!(matches!(err, GenerationError::RequestFailed { .. }));
        assert!(err.to_string().len() < 500);
    }

    // ── Construction ────────────────────────────────────────────────

    fn config(base_url: &str) -> LlmConfig {
        LlmConfig {
            api_key: SecretString::from("sk-test"),
            model: "gpt-4".into(),
            base_url: base_url.into(),
        }
    }

    #[test]
    fn creates_generator_for_default_endpoint() {
        // Keys are only checked when a request is made.
        let generator = create_generator(&config(DEFAULT_OPENAI_BASE_URL)).unwrap();
        assert_eq!(generator.name(), "openai");
    }

    #[test]
    fn creates_generator_for_custom_endpoint() {
        let generator = create_generator(&config("https://llm.internal/v1")).unwrap();
        assert_eq!(generator.name(), "openai");
    }
}
