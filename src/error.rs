use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the chat-completion proxy.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat proxy request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("chat proxy error {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("chat stream interrupted: {0}")]
    Stream(String),

    #[error("conversation history is out of order: {0}")]
    Protocol(#[from] crate::assistant::messages::OrderError),

    #[error("chat proxy returned an empty title")]
    EmptyTitle,
}

/// Failures of the generic backend REST collaborator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend returned status {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("backend response for {path} is missing `{field}`")]
    MissingField { path: String, field: &'static str },

    #[error("unexpected response body for {path}: {source}")]
    InvalidBody {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("authenticated call to {0} but LEGIS_API_TOKEN is not set")]
    MissingToken(String),
}

/// Per-call tool failures. Never escape the executor; they are reported as
/// the `error` of a [`crate::assistant::tools::ToolOutput`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool name must not be empty")]
    EmptyName,

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{name}': {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to read attachment '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported attachment type '{0}' (expected image, audio, video or pdf)")]
    Unsupported(String),
}
