//! The reasoning step.
//!
//! Invokes the model with the current context log and the session's tool
//! manifest, and classifies the response into exactly one of two shapes:
//! a text answer or a requested tool invocation. The step is stateless
//! between calls — it has no memory beyond what is passed in.

use std::sync::Arc;
use std::time::Duration;

use palaver_core::error::SessionError;
use palaver_core::{
    ContextLog, Error, Provider, ProviderRequest, ProviderResponse, SessionPrefs, ToolDefinition,
};
use tracing::{debug, warn};

/// The closed outcome sum of a reasoning step.
///
/// Every model response must classify into one of these; a response
/// lacking both a textual answer and a structured tool call is the fatal,
/// non-retryable [`SessionError::MalformedResponse`].
#[derive(Debug, Clone)]
pub enum ThoughtOutcome {
    /// A final text answer for this turn
    Text(String),

    /// A requested tool invocation
    Action {
        name: String,
        arguments: serde_json::Value,
    },
}

/// Stateless reasoning step over a provider.
///
/// Transport-level retries are a local property of this call site: the
/// retry count and backoff are constructor parameters, not a framework
/// default.
pub struct ThoughtStep {
    provider: Arc<dyn Provider>,
    retries: u32,
    backoff: Duration,
    max_tokens: Option<u32>,
}

impl ThoughtStep {
    pub fn new(
        provider: Arc<dyn Provider>,
        retries: u32,
        backoff: Duration,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            provider,
            retries,
            backoff,
            max_tokens,
        }
    }

    /// Run one reasoning pass over the full context log.
    pub async fn infer(
        &self,
        log: &ContextLog,
        prefs: &SessionPrefs,
        tools: &[ToolDefinition],
    ) -> Result<ThoughtOutcome, Error> {
        let request = ProviderRequest {
            model: prefs.model.clone(),
            entries: log.entries().to_vec(),
            temperature: prefs.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
        };

        let response = self.call_provider(request).await?;
        Self::classify(response)
    }

    async fn call_provider(&self, request: ProviderRequest) -> Result<ProviderResponse, Error> {
        let mut attempt = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "Thought call failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Classify a provider response into the closed outcome sum.
    fn classify(response: ProviderResponse) -> Result<ThoughtOutcome, Error> {
        let mut calls = response.tool_calls.into_iter();
        if let Some(call) = calls.next() {
            if calls.next().is_some() {
                // One action per reasoning step; extras are dropped and the
                // model re-requests them on the next pass if still needed.
                warn!(tool = %call.name, "Model requested multiple tools, taking the first");
            }
            if !response.content.trim().is_empty() {
                debug!(tool = %call.name, "Dropping accompanying text on action outcome");
            }
            let arguments = match serde_json::from_str(&call.arguments) {
                Ok(value) => value,
                // Unparseable arguments are passed along raw; the tool
                // rejects them and the loop recovers with an error entry.
                Err(_) => serde_json::Value::String(call.arguments),
            };
            return Ok(ThoughtOutcome::Action {
                name: call.name,
                arguments,
            });
        }

        let text = response.content.trim();
        if text.is_empty() {
            return Err(SessionError::MalformedResponse(
                "response carried neither text nor a tool call".into(),
            )
            .into());
        }
        Ok(ThoughtOutcome::Text(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use palaver_core::{ContextEntry, ProviderError, ToolCallRequest};

    fn prefs() -> SessionPrefs {
        SessionPrefs::new("mock-model", 0.7)
    }

    fn log_with_user(text: &str) -> ContextLog {
        let mut log = ContextLog::new();
        log.append(ContextEntry::user_text(text));
        log
    }

    fn text_response(content: &str) -> ProviderResponse {
        ProviderResponse {
            content: content.into(),
            tool_calls: vec![],
            model: "mock-model".into(),
            usage: None,
        }
    }

    fn action_response(name: &str, args: &str) -> ProviderResponse {
        ProviderResponse {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".into(),
                name: name.into(),
                arguments: args.into(),
            }],
            model: "mock-model".into(),
            usage: None,
        }
    }

    #[tokio::test]
    async fn text_response_classifies_as_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("4"))]));
        let step = ThoughtStep::new(provider, 0, Duration::ZERO, None);

        let outcome = step
            .infer(&log_with_user("alice: What's 2+2?"), &prefs(), &[])
            .await
            .unwrap();
        assert!(matches!(outcome, ThoughtOutcome::Text(t) if t == "4"));
    }

    #[tokio::test]
    async fn tool_call_classifies_as_action() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(action_response(
            "calculator",
            r#"{"expression":"2+2"}"#,
        ))]));
        let step = ThoughtStep::new(provider, 0, Duration::ZERO, None);

        let outcome = step
            .infer(&log_with_user("alice: What's 2+2?"), &prefs(), &[])
            .await
            .unwrap();
        match outcome {
            ThoughtOutcome::Action { name, arguments } => {
                assert_eq!(name, "calculator");
                assert_eq!(arguments["expression"], "2+2");
            }
            other => panic!("Expected action, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn action_wins_over_accompanying_text() {
        let mut response = action_response("calculator", r#"{"expression":"1+1"}"#);
        response.content = "Let me work that out".into();

        let provider = Arc::new(ScriptedProvider::new(vec![Ok(response)]));
        let step = ThoughtStep::new(provider, 0, Duration::ZERO, None);

        let outcome = step
            .infer(&log_with_user("alice: hi"), &prefs(), &[])
            .await
            .unwrap();
        assert!(matches!(outcome, ThoughtOutcome::Action { .. }));
    }

    #[tokio::test]
    async fn empty_response_is_malformed_and_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("   "))]));
        let step = ThoughtStep::new(provider, 0, Duration::ZERO, None);

        let err = step
            .infer(&log_with_user("alice: hi"), &prefs(), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn transport_failure_retries_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Network("connection reset".into())),
            Ok(text_response("recovered")),
        ]));
        let step = ThoughtStep::new(provider.clone(), 1, Duration::ZERO, None);

        let outcome = step
            .infer(&log_with_user("alice: hi"), &prefs(), &[])
            .await
            .unwrap();
        assert!(matches!(outcome, ThoughtOutcome::Text(t) if t == "recovered"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn transport_failure_exhausts_retries() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Network("down".into())),
            Err(ProviderError::Network("still down".into())),
        ]));
        let step = ThoughtStep::new(provider, 1, Duration::ZERO, None);

        let err = step
            .infer(&log_with_user("alice: hi"), &prefs(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn unparseable_arguments_stay_as_raw_string() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(action_response(
            "calculator",
            "not json {",
        ))]));
        let step = ThoughtStep::new(provider, 0, Duration::ZERO, None);

        let outcome = step
            .infer(&log_with_user("alice: hi"), &prefs(), &[])
            .await
            .unwrap();
        match outcome {
            ThoughtOutcome::Action { arguments, .. } => {
                assert_eq!(arguments, serde_json::Value::String("not json {".into()));
            }
            other => panic!("Expected action, got {other:?}"),
        }
    }
}
