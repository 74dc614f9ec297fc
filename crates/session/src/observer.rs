//! The observation step.
//!
//! Summarizes a raw action result into a context-appropriate note. Small
//! results pass through verbatim; large ones are condensed by the model
//! against a short window of recent context, so the log never carries a
//! large raw result wholesale.

use std::sync::Arc;
use std::time::Duration;

use palaver_core::{ContextEntry, Error, Provider, ProviderRequest, SessionPrefs};
use tracing::warn;

/// Condenses raw tool output before it enters the context log.
pub struct ObservationStep {
    provider: Arc<dyn Provider>,
    /// Results at or under this many characters are used verbatim
    passthrough_limit: usize,
    retries: u32,
    backoff: Duration,
}

impl ObservationStep {
    pub fn new(
        provider: Arc<dyn Provider>,
        passthrough_limit: usize,
        retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            provider,
            passthrough_limit,
            retries,
            backoff,
        }
    }

    /// Produce a condensed observation from `raw`, given the most recent
    /// slice of context (a small fixed window, not the full log).
    pub async fn condense(
        &self,
        window: &[ContextEntry],
        raw: &str,
        prefs: &SessionPrefs,
    ) -> Result<String, Error> {
        if raw.len() <= self.passthrough_limit {
            return Ok(raw.to_string());
        }

        let mut entries = vec![ContextEntry::system_text(
            "Condense the tool output below into a short note. Keep only the facts \
             needed to continue the conversation; discard boilerplate and repetition.",
        )];
        let mut prompt = String::from("Recent context:\n");
        for entry in window {
            prompt.push_str(&format!("- {}\n", entry.content));
        }
        prompt.push_str("\nTool output:\n");
        prompt.push_str(raw);
        entries.push(ContextEntry::user_text(prompt));

        let request = ProviderRequest {
            model: prefs.model.clone(),
            entries,
            // Summarization wants determinism, not creativity
            temperature: 0.2,
            max_tokens: None,
            tools: vec![],
        };

        let response = self.call_provider(request).await?;
        let note = response.content.trim().to_string();
        if note.is_empty() {
            // Degenerate model output: fall back to a marked truncation
            // rather than failing the step or re-emitting everything.
            return Ok(truncated(raw, self.passthrough_limit));
        }
        Ok(note)
    }

    async fn call_provider(
        &self,
        request: ProviderRequest,
    ) -> Result<palaver_core::ProviderResponse, Error> {
        let mut attempt = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Observation call failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Truncate on a char boundary with an explicit marker.
fn truncated(raw: &str, limit: usize) -> String {
    let cut = raw
        .char_indices()
        .take_while(|(i, _)| *i < limit)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    format!(
        "{} [truncated {} of {} bytes]",
        &raw[..cut],
        raw.len() - cut,
        raw.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, text_response};
    use palaver_core::ProviderError;

    fn prefs() -> SessionPrefs {
        SessionPrefs::new("mock-model", 0.7)
    }

    #[tokio::test]
    async fn small_results_pass_through_verbatim() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let step = ObservationStep::new(provider.clone(), 100, 0, Duration::ZERO);

        let note = step.condense(&[], "42", &prefs()).await.unwrap();
        assert_eq!(note, "42");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn large_results_are_condensed_by_the_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response(
            "Weather: 18°C, rain likely",
        ))]));
        let step = ObservationStep::new(provider.clone(), 16, 0, Duration::ZERO);

        let raw = "a very long weather report ".repeat(10);
        let note = step.condense(&[], &raw, &prefs()).await.unwrap();
        assert_eq!(note, "Weather: 18°C, rain likely");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn condense_request_includes_window_and_raw() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("ok"))]));
        let step = ObservationStep::new(provider.clone(), 4, 0, Duration::ZERO);

        let window = vec![ContextEntry::user_text("alice: check the weather")];
        step.condense(&window, "raw tool output", &prefs())
            .await
            .unwrap();

        let requests = provider.requests().await;
        assert_eq!(requests.len(), 1);
        let rendered: String = requests[0]
            .entries
            .iter()
            .map(|e| e.content.clone())
            .collect();
        assert!(rendered.contains("alice: check the weather"));
        assert!(rendered.contains("raw tool output"));
    }

    #[tokio::test]
    async fn blank_model_output_falls_back_to_truncation() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("  "))]));
        let step = ObservationStep::new(provider, 10, 0, Duration::ZERO);

        let raw = "0123456789ABCDEF";
        let note = step.condense(&[], raw, &prefs()).await.unwrap();
        assert!(note.starts_with("0123456789"));
        assert!(note.contains("truncated"));
        assert!(note.len() < raw.len() + 40);
    }

    #[tokio::test]
    async fn provider_failure_propagates_after_retries() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Network("down".into())),
            Err(ProviderError::Network("down".into())),
        ]));
        let step = ObservationStep::new(provider, 10, 1, Duration::ZERO);

        let err = step
            .condense(&[], &"x".repeat(50), &prefs())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let raw = "héllo wörld, this runs long";
        let note = truncated(raw, 8);
        assert!(note.contains("truncated"));
        // Must not panic on multi-byte boundaries and must keep a prefix
        assert!(note.starts_with("héllo"));
    }
}
