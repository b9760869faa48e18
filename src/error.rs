use serde::Serialize;
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessErrorDetails {
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_stderr: Option<String>,
}

#[derive(Debug, Error)]
pub enum RicolError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{message}\nHint: {hint}")]
    PreconditionMissing { message: String, hint: String },
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{message}")]
    External {
        message: String,
        details: ProcessErrorDetails,
    },
    #[error("{what} did not become ready after {attempts} attempts\nHint: {hint}")]
    ReadinessTimeout {
        what: String,
        attempts: u32,
        hint: String,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RicolError {
    pub fn precondition(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::PreconditionMissing {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn external(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::External {
            message: message.into(),
            details: ProcessErrorDetails {
                error_code: "external_operation_failed".to_string(),
                hint,
                command: None,
                raw_stderr: None,
            },
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PreconditionMissing { .. } => "precondition_missing",
            Self::AlreadyExists(_) => "already_exists",
            Self::External { details, .. } => details.error_code.as_str(),
            Self::ReadinessTimeout { .. } => "readiness_timeout",
            Self::Config(_) | Self::Yaml(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Prompt(_) => "prompt_error",
            Self::Json(_) => "json_error",
            Self::Http(_) => "http_error",
        }
    }

    pub fn details(&self) -> Option<&ProcessErrorDetails> {
        match self {
            Self::External { details, .. } => Some(details),
            _ => None,
        }
    }
}
