//! The action executor.
//!
//! Dispatches a requested tool invocation to the matching capability and
//! returns its raw result. Unknown names fail the call — non-fatally; the
//! controller turns that into an error entry. Timeouts are the caller's
//! job, not this component's.

use std::sync::Arc;

use palaver_core::error::ToolError;
use palaver_core::{ToolDefinition, ToolRegistry};
use tracing::debug;

/// Thin dispatch layer over the tool registry.
pub struct ActionExecutor {
    registry: Arc<ToolRegistry>,
}

impl ActionExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The capability manifest advertised to the reasoning step.
    pub fn manifest(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Execute a named action and return its raw text result.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError> {
        debug!(tool = %name, "Dispatching action");
        self.registry.execute(name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoTool, FailingTool};

    fn executor() -> ActionExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(FailingTool));
        ActionExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn dispatches_to_named_tool() {
        let out = executor()
            .execute("echo", serde_json::json!({"text": "raw result"}))
            .await
            .unwrap();
        assert_eq!(out, "raw result");
    }

    #[tokio::test]
    async fn unknown_name_fails_the_call() {
        let err = executor()
            .execute("teleport", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unknown(_)));
    }

    #[tokio::test]
    async fn tool_failure_propagates() {
        let err = executor()
            .execute("broken", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn manifest_lists_registered_tools() {
        let manifest = executor().manifest();
        let mut names: Vec<&str> = manifest.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["broken", "echo"]);
    }
}
