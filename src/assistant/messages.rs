use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assistant::tools::ToolCall;

/// Role values understood by the chat proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human/user role.
    User,
    /// Model answer, possibly proposing tool calls.
    Assistant,
    /// Tool result role.
    Tool,
}

/// Reference to an uploaded (or locally previewed) file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub url: String,
    pub mime_type: String,
    pub name: String,
}

/// One entry of the model history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// `None` while an assistant message only carries tool calls.
    pub content: Option<String>,
    #[serde(skip)]
    pub file: Option<FileReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn bare(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            file: None,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Builds a plain-text user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, Some(content.into()))
    }

    /// Builds a user message with an attached file reference.
    pub fn user_with_file(content: impl Into<String>, file: Option<FileReference>) -> Self {
        Self {
            file,
            ..Self::user(content)
        }
    }

    /// Builds a final assistant answer.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, Some(content.into()))
    }

    /// Builds an assistant message proposing tool calls. Empty text becomes `null`.
    pub fn assistant_tool_calls(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let content = (!content.is_empty()).then(|| content.to_string());
        Self {
            tool_calls: Some(tool_calls),
            ..Self::bare(Role::Assistant, content)
        }
    }

    /// Builds a tool-result message associated with a tool call id.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::bare(Role::Tool, Some(content.into()))
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    fn proposes_tools(&self) -> bool {
        self.role == Role::Assistant
            && self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// Violations of the user → assistant [→ tool → assistant]* ordering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("tool result at position {index} (call '{id}') has no matching assistant tool call")]
    OrphanToolResult { index: usize, id: String },

    #[error("assistant tool calls at position {index} are not followed by their results")]
    UnansweredToolCalls { index: usize },
}

/// Ordered, append-only model history of one chat.
///
/// The chat id is assigned by the backend once the conversation is persisted.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    chat_id: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn set_chat_id(&mut self, chat_id: impl Into<String>) {
        self.chat_id = Some(chat_id.into());
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drops every entry appended after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Points the entry at `index` to an uploaded copy of its attachment.
    pub fn set_file(&mut self, index: usize, file: FileReference) {
        if let Some(message) = self.messages.get_mut(index) {
            message.file = Some(file);
        }
    }

    /// Replaces the whole conversation, as when a past chat is reopened.
    pub fn replace(&mut self, chat_id: Option<String>, messages: Vec<Message>) {
        self.chat_id = chat_id;
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.replace(None, Vec::new());
    }

    /// Checks that every tool result answers a call of the assistant message
    /// right before its run of tool results, and that proposed calls are
    /// answered before the next user or assistant entry.
    pub fn check_order(&self) -> Result<(), OrderError> {
        let mut open_calls: Option<(usize, Vec<&str>)> = None;

        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Tool => {
                    let id = message.tool_call_id.as_deref().unwrap_or("");
                    let answered = open_calls
                        .as_ref()
                        .is_some_and(|(_, ids)| ids.contains(&id));
                    if !answered {
                        return Err(OrderError::OrphanToolResult {
                            index,
                            id: id.to_string(),
                        });
                    }
                    if let Some((_, ids)) = open_calls.as_mut() {
                        ids.retain(|open| *open != id);
                    }
                }
                Role::User | Role::Assistant => {
                    if let Some((call_index, ids)) = &open_calls {
                        if !ids.is_empty() {
                            return Err(OrderError::UnansweredToolCalls { index: *call_index });
                        }
                    }
                    open_calls = message.proposes_tools().then(|| {
                        let ids = message
                            .tool_calls
                            .iter()
                            .flatten()
                            .map(|call| call.id.as_str())
                            .collect();
                        (index, ids)
                    });
                }
            }
        }

        Ok(())
    }
}

/// Role values stored by the backend message records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistedRole {
    User,
    Model,
}

/// Message record exchanged with `POST/GET /message/:chatId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMessage {
    pub role: PersistedRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl PersistedMessage {
    pub fn new(role: PersistedRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            file_url: None,
            file_type: None,
            file_name: None,
        }
    }

    pub fn with_file(mut self, file: &FileReference) -> Self {
        self.file_url = Some(file.url.clone());
        self.file_type = Some(file.mime_type.clone());
        self.file_name = Some(file.name.clone());
        self
    }

    pub fn file(&self) -> Option<FileReference> {
        self.file_url.as_ref().map(|url| FileReference {
            url: url.clone(),
            mime_type: self.file_type.clone().unwrap_or_default(),
            name: self.file_name.clone().unwrap_or_default(),
        })
    }

    /// Converts the stored record back into a history entry.
    pub fn into_message(self) -> Message {
        let file = self.file();
        match self.role {
            PersistedRole::User => Message::user_with_file(self.content, file),
            PersistedRole::Model => Message::assistant(self.content),
        }
    }
}
