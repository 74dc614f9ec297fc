//! Scripted test doubles shared by unit and integration tests.
//!
//! These are deliberately deterministic: the provider replays a fixed
//! script of responses, the sink records everything it is asked to
//! publish, and the tools either echo or fail on command.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use palaver_core::error::{ProviderError, ToolError};
use palaver_core::{
    DeliverySink, Provider, ProviderRequest, ProviderResponse, Role, SinkError, Tool,
    ToolCallRequest,
};
use tokio::sync::Mutex;

/// Build a plain text provider response.
pub fn text_response(content: &str) -> ProviderResponse {
    ProviderResponse {
        content: content.into(),
        tool_calls: vec![],
        model: "mock-model".into(),
        usage: None,
    }
}

/// Build a tool-call provider response.
pub fn action_response(name: &str, arguments: &str) -> ProviderResponse {
    ProviderResponse {
        content: String::new(),
        tool_calls: vec![ToolCallRequest {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }],
        model: "mock-model".into(),
        usage: None,
    }
}

/// A provider that replays a fixed script of responses in order.
///
/// When the script runs dry it answers with a sentinel text response so a
/// miscounted test fails on assertions instead of hanging the turn loop.
pub struct ScriptedProvider {
    script: Mutex<std::collections::VecDeque<Result<ProviderResponse, ProviderError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that always answers with the same text.
    pub fn always_text(content: &str) -> Arc<Self> {
        let mut provider = Self::new(vec![]);
        provider.fallback = Some(content.to_string());
        Arc::new(provider)
    }

    /// How many completion calls were made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far, in call order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);

        match self.script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(text_response(
                self.fallback.as_deref().unwrap_or("[script exhausted]"),
            )),
        }
    }
}

/// A sink that records every publication.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, Role, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(String, Role, String)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn publish(&self, session_id: &str, role: Role, text: &str) -> Result<(), SinkError> {
        self.published
            .lock()
            .await
            .push((session_id.to_string(), role, text.to_string()));
        Ok(())
    }
}

/// A tool that echoes back its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes back the input text"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        Ok(arguments["text"].as_str().unwrap_or("").to_string())
    }
}

/// A tool that always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "broken"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "wires crossed".into(),
        })
    }
}
