//! File read tool — read file contents with a size cap.

use async_trait::async_trait;
use palaver_core::error::ToolError;
use palaver_core::tool::Tool;

/// Default cap on returned file content.
const DEFAULT_MAX_BYTES: u64 = 256 * 1024;

pub struct FileReadTool {
    /// Maximum file size this tool will read.
    max_bytes: u64,
}

impl FileReadTool {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let metadata =
            tokio::fs::metadata(path)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "file_read".into(),
                    reason: format!("{path}: {e}"),
                })?;

        if metadata.len() > self.max_bytes {
            return Err(ToolError::ExecutionFailed {
                tool_name: "file_read".into(),
                reason: format!(
                    "{path} is {} bytes, over the {} byte limit",
                    metadata.len(),
                    self.max_bytes
                ),
            });
        }

        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_read".into(),
                reason: format!("{path}: {e}"),
            })
    }
}
