//! Retrieval error taxonomy.
//!
//! Every failure the engine reports is an [`Error`] tagged with a stable
//! [`ErrorCode`]. Codes map to process exit codes (see [`exit`]) and to MCP
//! error responses, and always carry enough [`ErrorDetails`] for a caller to
//! decide what to try next.

use std::fmt;

use rmcp::model::{ErrorCode as McpErrorCode, ErrorData as McpError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Process exit codes for retrieval outcomes.
pub mod exit {
    pub const OK: i32 = 0;
    pub const RUNTIME_ERROR: i32 = 1;
    pub const INVALID_USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
    pub const BLOCKED: i32 = 4;
    pub const NEEDS_RENDER: i32 = 5;
}

/// Stable machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Target returned 404.
    NotFound,
    /// Access refused by status code or a detected bot wall.
    Blocked,
    /// Page content needs script execution to appear.
    NeedsRender,
    /// Response body exceeded the byte budget.
    TooLarge,
    /// Policy mode forbids the requested operation.
    PolicyViolation,
    /// Host rejected by the allow/block domain rules.
    DomainBlocked,
    /// robots.txt disallows the path under the `respect` stance.
    RobotsDisallowed,
    /// Browser rendering requested but no engine is available.
    MissingDependency,
    /// A request or navigation timed out.
    Timeout,
    /// Browser rendering failed.
    RenderFailed,
    /// The system browser profile could not be located.
    ProfileNotFound,
    /// Malformed invocation (bad URL, restricted header, invalid option).
    InvalidUsage,
    /// Transport failure other than a timeout.
    NetworkError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Blocked => "blocked",
            ErrorCode::NeedsRender => "needs_render",
            ErrorCode::TooLarge => "too_large",
            ErrorCode::PolicyViolation => "policy_violation",
            ErrorCode::DomainBlocked => "domain_blocked",
            ErrorCode::RobotsDisallowed => "robots_disallowed",
            ErrorCode::MissingDependency => "missing_dependency",
            ErrorCode::Timeout => "timeout",
            ErrorCode::RenderFailed => "render_failed",
            ErrorCode::ProfileNotFound => "profile_not_found",
            ErrorCode::InvalidUsage => "invalid_usage",
            ErrorCode::NetworkError => "network_error",
        }
    }

    /// Exit code a command-line caller should terminate with.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::NotFound => exit::NOT_FOUND,
            ErrorCode::Blocked | ErrorCode::RobotsDisallowed => exit::BLOCKED,
            ErrorCode::NeedsRender => exit::NEEDS_RENDER,
            ErrorCode::InvalidUsage => exit::INVALID_USAGE,
            _ => exit::RUNTIME_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to an error.
///
/// Every field is optional; only the ones relevant to a given failure are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Why the request was classified this way (`http_status`, `bot_wall`, `needs_render`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Heuristic pattern that matched the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub next_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
    /// Underlying error text from a lower layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorDetails {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A classified retrieval failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Box<ErrorDetails>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: Box::default() }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Box::new(details);
        self
    }

    pub fn invalid_usage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidUsage, message)
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    /// `{code, message, details}` object as returned to callers.
    pub fn to_json(&self) -> serde_json::Value {
        let details = if self.details.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::to_value(&*self.details).unwrap_or(serde_json::Value::Null)
        };
        serde_json::json!({
            "code": self.code,
            "message": self.message,
            "details": details,
        })
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match err.code {
            ErrorCode::InvalidUsage => -32602,
            ErrorCode::NotFound => -32001,
            ErrorCode::Blocked => -32002,
            ErrorCode::NeedsRender => -32003,
            ErrorCode::TooLarge => -32004,
            ErrorCode::PolicyViolation => -32005,
            ErrorCode::DomainBlocked => -32006,
            ErrorCode::RobotsDisallowed => -32007,
            ErrorCode::MissingDependency => -32008,
            ErrorCode::Timeout => -32009,
            ErrorCode::RenderFailed => -32010,
            ErrorCode::ProfileNotFound => -32011,
            ErrorCode::NetworkError => -32012,
        };

        let mut data = err.to_json();
        data["exit_code"] = serde_json::json!(err.exit_code());

        McpError { code: McpErrorCode(code), message: err.to_string().into(), data: Some(data) }
    }
}
