//! The compactor.
//!
//! Collapses a full context log into a short replacement context — one
//! summary entry — that seeds the next generation. The result is never
//! empty for a non-empty log, and compacting an already-compacted context
//! is fine (summarizing a summary is acceptable, not an error).
//!
//! If compaction itself fails, the error propagates and the caller defers
//! the checkpoint; the current generation simply continues.

use std::sync::Arc;
use std::time::Duration;

use palaver_core::{ContextEntry, ContextLog, Error, Provider, ProviderRequest, SessionPrefs};
use tracing::warn;

/// How much of the tail to keep in the deterministic fallback digest.
const DIGEST_TAIL_ENTRIES: usize = 4;
const DIGEST_LINE_CHARS: usize = 120;

/// Provider-backed context compaction.
pub struct Compactor {
    provider: Arc<dyn Provider>,
    retries: u32,
    backoff: Duration,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, retries: u32, backoff: Duration) -> Self {
        Self {
            provider,
            retries,
            backoff,
        }
    }

    /// Compact the full log into a minimal replacement context.
    ///
    /// An empty log compacts to an empty replacement (there is nothing to
    /// preserve); any non-empty log yields at least one summary entry.
    pub async fn compact(
        &self,
        log: &ContextLog,
        prefs: &SessionPrefs,
    ) -> Result<Vec<ContextEntry>, Error> {
        if log.is_empty() {
            return Ok(Vec::new());
        }

        let mut prompt = String::from(
            "Summarize the conversation below so it can continue coherently in a fresh \
             context. Preserve names, open questions, decisions, and anything the user \
             asked to be remembered. Answer with the summary only.\n\n",
        );
        for entry in log.entries() {
            prompt.push_str(&format!("[{:?}/{:?}] {}\n", entry.role, entry.kind, entry.content));
        }

        let request = ProviderRequest {
            model: prefs.model.clone(),
            entries: vec![ContextEntry::user_text(prompt)],
            temperature: 0.2,
            max_tokens: None,
            tools: vec![],
        };

        let response = self.call_provider(request).await?;
        let summary = response.content.trim();

        let entry = if summary.is_empty() {
            // The model gave us nothing; fall back to a deterministic
            // digest so the replacement context is never empty.
            fallback_digest(log)
        } else {
            ContextEntry::system_text(format!("Conversation summary: {summary}"))
        };

        Ok(vec![entry])
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
                    warn!(attempt, error = %e, "Compaction call failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// A summary built without the model: the truncated tail of the log.
fn fallback_digest(log: &ContextLog) -> ContextEntry {
    let mut lines = Vec::new();
    for entry in log.last_n(DIGEST_TAIL_ENTRIES) {
        let line: String = entry.content.chars().take(DIGEST_LINE_CHARS).collect();
        lines.push(line);
    }
    ContextEntry::system_text(format!(
        "Conversation summary (automatic digest of the last {} entries): {}",
        lines.len(),
        lines.join(" | ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, text_response};
    use palaver_core::{EntryKind, ProviderError, Role};

    fn prefs() -> SessionPrefs {
        SessionPrefs::new("mock-model", 0.7)
    }

    fn sample_log() -> ContextLog {
        let mut log = ContextLog::new();
        log.append(ContextEntry::user_text("alice: plan my trip to Kyoto"));
        log.append(ContextEntry::assistant_text("Booked for April."));
        log
    }

    #[tokio::test]
    async fn compacts_to_single_summary_entry() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response(
            "Alice is planning an April trip to Kyoto.",
        ))]));
        let compactor = Compactor::new(provider, 0, Duration::ZERO);

        let compacted = compactor.compact(&sample_log(), &prefs()).await.unwrap();
        assert_eq!(compacted.len(), 1);
        assert_eq!(compacted[0].role, Role::System);
        assert_eq!(compacted[0].kind, EntryKind::Text);
        assert!(compacted[0].content.contains("Kyoto"));
    }

    #[tokio::test]
    async fn empty_log_compacts_to_empty_replacement() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let compactor = Compactor::new(provider.clone(), 0, Duration::ZERO);

        let compacted = compactor.compact(&ContextLog::new(), &prefs()).await.unwrap();
        assert!(compacted.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn never_empty_for_non_empty_log() {
        // Model returns blank — the fallback digest kicks in.
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response(""))]));
        let compactor = Compactor::new(provider, 0, Duration::ZERO);

        let compacted = compactor.compact(&sample_log(), &prefs()).await.unwrap();
        assert_eq!(compacted.len(), 1);
        assert!(compacted[0].content.contains("Kyoto"));
    }

    #[tokio::test]
    async fn compacting_a_summary_is_not_an_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(text_response("Trip to Kyoto planned.")),
            Ok(text_response("Kyoto trip.")),
        ]));
        let compactor = Compactor::new(provider, 0, Duration::ZERO);

        let first = compactor.compact(&sample_log(), &prefs()).await.unwrap();
        let again = compactor
            .compact(&ContextLog::seeded_from(first), &prefs())
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        assert!(again[0].content.contains("Kyoto"));
    }

    #[tokio::test]
    async fn provider_failure_propagates_for_deferral() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Network(
            "down".into(),
        ))]));
        let compactor = Compactor::new(provider, 0, Duration::ZERO);

        let err = compactor.compact(&sample_log(), &prefs()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn fallback_digest_keeps_the_tail() {
        let mut log = ContextLog::new();
        for i in 0..10 {
            log.append(ContextEntry::user_text(format!("u: message {i}")));
        }
        let digest = fallback_digest(&log);
        assert!(digest.content.contains("message 9"));
        assert!(!digest.content.contains("message 0"));
    }
}
