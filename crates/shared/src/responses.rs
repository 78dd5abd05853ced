//! Command responses and error classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Command Response
// =============================================================================

/// Terminal result for a command: `{ id, success, result | error }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Classification of a failure; absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl CommandResponse {
    /// Create a success response with a serializable result
    ///
    /// A result that cannot be serialized is sent as its debug string rather
    /// than dropping the response.
    pub fn success<T: Serialize + std::fmt::Debug>(id: impl Into<String>, result: &T) -> Self {
        let result = serde_json::to_value(result)
            .unwrap_or_else(|_| serde_json::Value::String(format!("{result:?}")));
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
            code: None,
        }
    }

    /// Create an error response
    pub fn failure(id: impl Into<String>, code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }

    /// Decode the result payload into a typed result.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.result.clone().unwrap_or(serde_json::Value::Null))
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Error classification codes carried on failed responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // === Command-level (rejected before the action runs) ===
    /// Method is not part of the supported action set
    UnknownMethod,
    /// A required argument was absent
    MissingArgument,
    /// An argument was present but unusable
    InvalidArgument,
    /// Another movement is already in progress
    Busy,

    // === Movement ===
    /// Hard timeout elapsed
    Timeout,
    /// No progress across consecutive samples
    Stuck,
    /// Target unreachable
    NoPath,
    /// Aborted by `cancel` or `pathfinder.stop`
    Cancelled,
    /// Pathfinding capability not loaded on the executor
    PluginUnavailable,

    // === Action ===
    /// The game rejected the operation
    ActionFailed,
    /// Unexpected executor failure
    Internal,

    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// True when the command was rejected without attempting the action.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ErrorCode::UnknownMethod
                | ErrorCode::MissingArgument
                | ErrorCode::InvalidArgument
                | ErrorCode::Busy
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::UnknownMethod => "unknown_method",
            ErrorCode::MissingArgument => "missing_argument",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Busy => "busy",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Stuck => "stuck",
            ErrorCode::NoPath => "no_path",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::PluginUnavailable => "plugin_unavailable",
            ErrorCode::ActionFailed => "action_failed",
            ErrorCode::Internal => "internal",
            ErrorCode::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Command Error
// =============================================================================

/// A classified failure that becomes a `{success: false}` response.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(ErrorCode::UnknownMethod, format!("unknown method '{method}'"))
    }

    pub fn missing_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingArgument, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn into_response(self, id: impl Into<String>) -> CommandResponse {
        CommandResponse::failure(id, self.code, self.message)
    }
}
