use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::assistant::attachment::FileAttachment;
use crate::assistant::chat_runtime::{self, RequestFailure};
use crate::assistant::messages::Message;
use crate::error::ChatError;

/// Raw response body of a streaming chat call.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ChatError>>;

/// Attachment as transmitted to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

impl From<&FileAttachment> for FilePayload {
    fn from(file: &FileAttachment) -> Self {
        Self {
            name: file.name().to_string(),
            mime_type: file.mime_type().to_string(),
            data: file.to_base64(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FilePayload>>,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

/// The chat-completion proxy in front of the model provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Starts a completion and returns its body as a byte stream.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, ChatError>;

    /// Asks for a short title summarizing the first user message.
    async fn generate_title(&self, first_message: &str) -> Result<String, ChatError>;
}

#[derive(Debug, Deserialize)]
struct TitleResponse {
    #[serde(default)]
    title: String,
}

/// reqwest-backed [`ChatModel`] talking to the web app's `/api/chat` routes.
#[derive(Debug, Clone)]
pub struct HttpChatProxy {
    client: Client,
    base_url: String,
    timeout_secs: Option<u64>,
}

impl HttpChatProxy {
    /// `timeout_secs` bounds connecting, and the whole title call.
    pub fn new(base_url: impl Into<String>, timeout_secs: Option<u64>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into(),
            timeout_secs,
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url.trim_end_matches('/'))
    }
}

fn into_chat_error(failure: RequestFailure) -> ChatError {
    match failure {
        RequestFailure::Request(source) => ChatError::Request(source),
        RequestFailure::Api { status, body } => ChatError::Api { status, body },
    }
}

#[async_trait]
impl ChatModel for HttpChatProxy {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        let url = self.url("/api/chat");
        let builder = self
            .client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(request);
        // The body may stream for as long as the model talks; no total timeout.
        let response = chat_runtime::send(builder, None)
            .await
            .map_err(into_chat_error)?;

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| ChatError::Stream(err.to_string()))
        });
        Ok(body.boxed())
    }

    async fn generate_title(&self, first_message: &str) -> Result<String, ChatError> {
        let url = self.url("/api/chat/title");
        let payload = json!({ "messages": [{ "role": "user", "content": first_message }] });
        let response = chat_runtime::send(self.client.post(&url).json(&payload), self.timeout_secs)
            .await
            .map_err(into_chat_error)?;
        let body: TitleResponse = response.json().await.map_err(ChatError::Request)?;
        let title = body.title.trim();
        if title.is_empty() {
            return Err(ChatError::EmptyTitle);
        }
        Ok(title.to_string())
    }
}
