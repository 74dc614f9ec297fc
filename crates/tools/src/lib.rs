//! Built-in tool implementations for Palaver.
//!
//! Every tool implements `palaver_core::Tool` and returns a raw text
//! result; the session engine's observation step condenses large results
//! before they enter the context log.

pub mod calculator;
pub mod file_read;
pub mod http_request;

pub use calculator::CalculatorTool;
pub use file_read::FileReadTool;
pub use http_request::HttpRequestTool;

use palaver_core::ToolRegistry;

/// The default registry: calculator, file_read, http_request.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(FileReadTool::new()));
    registry.register(Box::new(HttpRequestTool::new()));
    registry
}
