//! Chat and message records kept by the backend.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::assistant::attachment::FileAttachment;
use crate::assistant::backend::Backend;
use crate::assistant::messages::{FileReference, PersistedMessage};
use crate::error::BackendError;

const FALLBACK_TITLE_WORDS: usize = 5;
const UNTITLED: &str = "Nova conversa";

/// Title used when the summarization endpoint is unavailable.
pub fn fallback_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(FALLBACK_TITLE_WORDS).collect();
    if words.is_empty() {
        UNTITLED.to_string()
    } else {
        words.join(" ")
    }
}

fn string_field(body: &Value, path: &str, field: &'static str) -> Result<String, BackendError> {
    match body.get(field) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        Some(Value::Number(value)) => Ok(value.to_string()),
        _ => Err(BackendError::MissingField {
            path: path.to_string(),
            field,
        }),
    }
}

/// `/message/:chatId`, with the id escaped as one path segment.
fn message_path(chat_id: &str) -> String {
    format!("/message/{}", urlencoding::encode(chat_id))
}

/// Creates the chat record and returns its server-assigned id.
pub async fn create_chat(backend: &dyn Backend, title: &str) -> Result<String, BackendError> {
    let path = "/chat";
    let body = json!({ "name": title });
    let response = backend.post(path, Some(&body), true).await?.into_success(path)?;
    string_field(&response, path, "id")
}

/// Uploads an attachment and returns the stored reference.
pub async fn upload_file(
    backend: &dyn Backend,
    chat_id: &str,
    file: &FileAttachment,
) -> Result<FileReference, BackendError> {
    let path = format!("{}/file", message_path(chat_id));
    let response = backend.upload(&path, file, true).await?.into_success(&path)?;
    Ok(FileReference {
        url: string_field(&response, &path, "url")?,
        mime_type: file.mime_type().to_string(),
        name: file.name().to_string(),
    })
}

pub async fn save_message(
    backend: &dyn Backend,
    chat_id: &str,
    message: &PersistedMessage,
) -> Result<(), BackendError> {
    let path = message_path(chat_id);
    let body = serde_json::to_value(message).map_err(|source| BackendError::InvalidBody {
        path: path.clone(),
        source,
    })?;
    backend.post(&path, Some(&body), true).await?.into_success(&path)?;
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageList {
    Bare(Vec<PersistedMessage>),
    Wrapped { messages: Vec<PersistedMessage> },
}

/// Fetches the stored messages of a chat, oldest first.
pub async fn load_messages(
    backend: &dyn Backend,
    chat_id: &str,
) -> Result<Vec<PersistedMessage>, BackendError> {
    let path = message_path(chat_id);
    let body = backend.get(&path, true).await?.into_success(&path)?;
    let list: MessageList =
        serde_json::from_value(body).map_err(|source| BackendError::InvalidBody { path, source })?;
    Ok(match list {
        MessageList::Bare(messages) | MessageList::Wrapped { messages } => messages,
    })
}
