use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Comprehensive error enum for the plugin using thiserror
#[derive(Error, Debug)]
pub enum PluginError {
    // Local configuration errors
    #[error("Encountered error while trying to read the file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No {0} was found. You may be logged out. Please log in to continue.")]
    MissingSessionField(&'static str),

    #[error("Home directory could not be determined")]
    HomeDirNotFound,

    // Resolution errors
    #[error("Service Instance \"{0}\" doesn't exist.")]
    InstanceNotFound(String),

    #[error("Service Instance Guid \"{0}\" doesn't exist.")]
    GuidNotFound(String),

    #[error("Instance name requested doesn't belong to the org: {org} and the space: {space}. Please target the correct org and space.")]
    SpaceMismatch { org: String, space: String },

    #[error("{name} maps to {count} instance GUIDs. Use 'instance-events --delete' to list delete events and pick the instance GUID")]
    AmbiguousGuid { name: String, count: usize },

    // Remote errors
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Broker(BrokerFailure),

    #[error("PLUGIN ERROR: API call {path} failed: {failure}")]
    ApiCall { path: String, failure: BrokerFailure },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Could not obtain a fresh access token: {0}")]
    TokenRefresh(String),

    // Validation errors
    #[error("Invalid timestamp \"{input}\": {source}. Please enter time in ISO8601 format, example - 2018-11-12T11:45:26.371Z, 2018-11-12T11:45:26Z")]
    InvalidTimestamp {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid argument: {0}")]
    InvalidArguments(String),

    #[error("Operation cancelled by user")]
    Declined,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // Automatic conversions from library errors
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    #[error(transparent)]
    DialogueError(#[from] dialoguer::Error),

    #[error(transparent)]
    TemplateError(#[from] indicatif::style::TemplateError),
}

impl PluginError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PluginError::InvalidTimestamp { .. }
            | PluginError::InvalidArguments(_)
            | PluginError::AmbiguousGuid { .. }
            | PluginError::DialogueError(_) => 1,
            PluginError::SpaceMismatch { .. } => 2,
            PluginError::InstanceNotFound(_) | PluginError::GuidNotFound(_) => 3,
            PluginError::Transport(_)
            | PluginError::Broker(_)
            | PluginError::ApiCall { .. }
            | PluginError::UnexpectedResponse(_)
            | PluginError::TokenRefresh(_)
            | PluginError::ConfigurationError(_)
            | PluginError::JsonError(_)
            | PluginError::UrlError(_)
            | PluginError::TemplateError(_) => 4,
            PluginError::FileRead { .. } | PluginError::HomeDirNotFound | PluginError::IoError(_) => 5,
            PluginError::MissingSessionField(_) => 6,
            PluginError::Declined => 7,
        }
    }

    pub fn broker(status: u16, body: &str) -> Self {
        PluginError::Broker(BrokerFailure::from_body(status, body))
    }
}

/// Error payload returned by the broker on a non-success outcome
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerFailure {
    pub status: u16,
    pub error: Option<String>,
    pub description: Option<String>,
    pub raw: String,
}

impl BrokerFailure {
    /// Parse a broker response body; non-JSON bodies are kept verbatim
    pub fn from_body(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let text_field = |key: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        BrokerFailure {
            status,
            error: text_field("error"),
            description: text_field("description").or_else(|| text_field("message")),
            raw: body.trim().to_string(),
        }
    }
}

impl fmt::Display for BrokerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.description) {
            (None, None) if self.raw.is_empty() => {
                write!(f, "Broker responded with status {}", self.status)
            }
            (None, None) => write!(f, "{}", self.raw),
            (Some(error), None) => write!(f, "Error: {}", error),
            (None, Some(description)) => write!(f, "Message: {}", description),
            (Some(error), Some(description)) => {
                write!(f, "Error: {}\nMessage: {}", error, description)
            }
        }
    }
}
