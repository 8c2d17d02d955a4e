use crate::domain::model::ValidationIssue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Unknown action: {action}")]
    UnknownAction { action: String },

    #[error("Failed to invoke function {function}: {message}")]
    InvokeError { function: String, message: String },

    #[error("Function {function} failed ({kind}): {message}")]
    FunctionError {
        function: String,
        kind: String,
        message: String,
    },

    #[error("Remote action failed with status {status} ({kind}): {message}")]
    RemoteError {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatusError {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Request signing failed: {message}")]
    SigningError { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        details: Vec<ValidationIssue>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("{kind}: {message}")]
    HandlerError {
        status: u16,
        kind: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Client,
    Network,
    Remote,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DispatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// 給 handler 使用的自訂錯誤
    pub fn handler(status: u16, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerError {
            status,
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::UnknownAction { .. } | Self::ValidationError { .. } | Self::Unauthorized { .. } => {
                ErrorCategory::Client
            }
            Self::ApiError(_) | Self::InvokeError { .. } => ErrorCategory::Network,
            Self::FunctionError { .. } | Self::RemoteError { .. } | Self::HttpStatusError { .. } => {
                ErrorCategory::Remote
            }
            Self::HandlerError { status, .. } if *status < 500 => ErrorCategory::Client,
            Self::IoError(_)
            | Self::SerializationError(_)
            | Self::SigningError { .. }
            | Self::CacheError { .. }
            | Self::HandlerError { .. } => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Client => ErrorSeverity::Low,
            ErrorCategory::Network | ErrorCategory::Remote => ErrorSeverity::Medium,
            ErrorCategory::Internal => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// 對應的 HTTP 狀態碼
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::UnknownAction { .. } => 404,
            Self::RemoteError { status, .. } | Self::HandlerError { status, .. } => *status,
            Self::HttpStatusError { status, .. } if *status >= 400 => *status,
            Self::ApiError(e) if e.is_timeout() => 504,
            Self::ApiError(_)
            | Self::InvokeError { .. }
            | Self::FunctionError { .. }
            | Self::HttpStatusError { .. } => 502,
            _ => 500,
        }
    }

    /// 結構化錯誤回應中的 `type` 欄位
    pub fn kind(&self) -> &str {
        match self {
            Self::ApiError(_) => "HttpError",
            Self::IoError(_) => "IoError",
            Self::SerializationError(_) => "SerializationError",
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "ConfigurationError",
            Self::UnknownAction { .. } => "UnknownAction",
            Self::InvokeError { .. } => "InvokeError",
            Self::FunctionError { kind, .. }
            | Self::RemoteError { kind, .. }
            | Self::HandlerError { kind, .. } => kind.as_str(),
            Self::HttpStatusError { .. } => "HttpStatusError",
            Self::SigningError { .. } => "SigningError",
            Self::CacheError { .. } => "CacheError",
            Self::ValidationError { .. } => "ValidationError",
            Self::Unauthorized { .. } => "Unauthorized",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError(e) => e.is_timeout() || e.is_connect(),
            Self::HttpStatusError { status, .. } => *status == 429 || *status >= 500,
            Self::InvokeError { .. } => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the action registry and DISPATCH_* environment variables"
            }
            ErrorCategory::Client => "Check the action name, parameters and caller identity",
            ErrorCategory::Network => "Check network connectivity and AWS credentials, then retry",
            ErrorCategory::Remote => "Inspect the remote function or endpoint logs",
            ErrorCategory::Internal => "Re-run with --verbose and report the failure",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::UnknownAction { action } => format!("Action '{}' is not registered", action),
            Self::ValidationError { message, details } if !details.is_empty() => {
                let issues: Vec<String> = details
                    .iter()
                    .map(|d| format!("{}: {}", d.path, d.message))
                    .collect();
                format!("{} ({})", message, issues.join("; "))
            }
            // 上游 URL 只留在日誌中
            Self::HttpStatusError { status, .. } => {
                format!("Upstream endpoint responded with HTTP {}", status)
            }
            Self::HandlerError { message, .. } | Self::RemoteError { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
