//! HTTP request tool — GET/POST against arbitrary URLs.
//!
//! Responses are capped so a large page cannot flood the observation
//! step; the condensed note is what ultimately reaches the context log.

use async_trait::async_trait;
use palaver_core::error::ToolError;
use palaver_core::tool::Tool;
use tracing::debug;

/// Cap on the returned response body.
const MAX_RESPONSE_BYTES: usize = 128 * 1024;

pub struct HttpRequestTool {
    client: reqwest::Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("palaver/0.1")
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make an HTTP request to a URL. Supports GET and POST. \
         Returns the response status code and body."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to send the request to"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method. Defaults to GET.",
                    "enum": ["GET", "POST"],
                    "default": "GET"
                },
                "body": {
                    "type": "string",
                    "description": "Optional request body (for POST)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let method = arguments["method"].as_str().unwrap_or("GET").to_uppercase();
        let request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => {
                let body = arguments["body"].as_str().unwrap_or("").to_string();
                self.client.post(url).body(body)
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Invalid HTTP method: {other}. Must be GET or POST."
                )));
            }
        };

        debug!(method = %method, url = %url, "Sending HTTP request");

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "http_request".into(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "http_request".into(),
                reason: format!("Failed to read response body: {e}"),
            })?;

        let truncated = if body.len() > MAX_RESPONSE_BYTES {
            let cut = body
                .char_indices()
                .take_while(|(i, _)| *i < MAX_RESPONSE_BYTES)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            format!("{} [truncated]", &body[..cut])
        } else {
            body
        };

        Ok(format!("HTTP {status}\n{truncated}"))
    }
}
