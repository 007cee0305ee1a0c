//! Drives one chat surface: history, live transcript, tool round-trips and
//! best-effort persistence.
//!
//! `send_message` takes `&mut self`, so at most one turn is in flight per
//! conversation and the placeholder index captured at the start of a turn
//! stays valid until it ends.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::assistant::attachment::FileAttachment;
use crate::assistant::backend::Backend;
use crate::assistant::history::{self, fallback_title};
use crate::assistant::messages::{
    Conversation, FileReference, Message, PersistedMessage, PersistedRole, Role,
};
use crate::assistant::proxy::{ChatModel, ChatRequest, FilePayload};
use crate::assistant::stream::{DecodedResponse, StreamChunk, StreamDecoder};
use crate::assistant::tools::ToolRegistry;
use crate::error::{BackendError, ChatError};

/// Content of the assistant bubble until the first token arrives.
pub const PLACEHOLDER: &str = "...";
pub const EXECUTING_TOOLS: &str = "Executando funções...";
pub const APOLOGY: &str = "Desculpe, ocorreu um erro ao processar sua mensagem.";

/// Entry of the visible transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub role: Role,
    pub content: String,
    pub file: Option<FileReference>,
}

/// Transcript changes, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Appended { index: usize, message: DisplayMessage },
    Updated { index: usize, content: String },
    ExecutingTools { names: Vec<String> },
    ChatCreated { chat_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered(String),
    /// Stopped by the cancellation token; the partial text stays on screen.
    Cancelled { partial: String },
    /// The turn failed; the placeholder now holds an apology.
    Failed { error: String },
    /// Nothing to send.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub system_prompt: String,
    /// Sends the tool schemas and resolves tool calls.
    pub function_calling: bool,
    /// Saves chats and messages to the backend after each answer.
    pub persist: bool,
}

/// What the user is about to send.
#[derive(Debug, Clone, Default)]
pub struct Compose {
    pub text: String,
    pub file: Option<FileAttachment>,
}

impl Compose {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.file = Some(file);
        self
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.file.is_none()
    }
}

/// Where a turn's user message sits in the transcript and in the history.
#[derive(Debug, Clone, Copy)]
struct UserEntry {
    transcript: usize,
    history: usize,
}

pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    backend: Arc<dyn Backend>,
    tools: Arc<ToolRegistry>,
    settings: OrchestratorSettings,
    conversation: Conversation,
    transcript: Vec<DisplayMessage>,
    events: Option<UnboundedSender<TurnEvent>>,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        backend: Arc<dyn Backend>,
        tools: Arc<ToolRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            model,
            backend,
            tools,
            settings,
            conversation: Conversation::new(),
            transcript: Vec::new(),
            events: None,
        }
    }

    /// Streams transcript changes to `events`.
    pub fn with_events(mut self, events: UnboundedSender<TurnEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn transcript(&self) -> &[DisplayMessage] {
        &self.transcript
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.conversation.chat_id()
    }

    pub fn new_chat(&mut self) {
        self.conversation.clear();
        self.transcript.clear();
    }

    /// Replaces the in-memory state with a stored chat.
    pub async fn load_conversation(&mut self, chat_id: &str) -> Result<(), BackendError> {
        let records = history::load_messages(self.backend.as_ref(), chat_id).await?;
        self.transcript = records
            .iter()
            .map(|record| DisplayMessage {
                role: match record.role {
                    PersistedRole::User => Role::User,
                    PersistedRole::Model => Role::Assistant,
                },
                content: record.content.clone(),
                file: record.file(),
            })
            .collect();
        let messages = records
            .into_iter()
            .map(PersistedMessage::into_message)
            .collect();
        self.conversation
            .replace(Some(chat_id.to_string()), messages);
        log::info!("loaded chat {chat_id} ({} messages)", self.conversation.len());
        Ok(())
    }

    /// The first request `send_message` would issue for `compose`.
    pub fn preview_request(&self, compose: &Compose) -> ChatRequest {
        let mut messages = self.conversation.messages().to_vec();
        messages.push(Message::user(compose.text.trim()));
        ChatRequest {
            messages,
            ..self.request(files_payload(compose.file.as_ref()), true)
        }
    }

    /// Runs one full turn: stream the answer, resolve tool calls once, then
    /// persist. Errors end the turn and are shown in place of the answer.
    pub async fn send_message(&mut self, compose: Compose, cancel: &CancellationToken) -> TurnOutcome {
        if compose.is_empty() {
            return TurnOutcome::Skipped;
        }

        let history_len = self.conversation.len();
        let user_text = compose.text.trim().to_string();
        let preview = compose.file.as_ref().map(FileAttachment::preview);

        let user_entry = UserEntry {
            transcript: self.append(DisplayMessage {
                role: Role::User,
                content: user_text.clone(),
                file: preview.clone(),
            }),
            history: history_len,
        };
        let placeholder = self.append(DisplayMessage {
            role: Role::Assistant,
            content: PLACEHOLDER.to_string(),
            file: None,
        });
        self.conversation
            .push(Message::user_with_file(user_text.clone(), preview));

        let files = files_payload(compose.file.as_ref());
        match self.run_turn(placeholder, files, cancel).await {
            Ok(Some(answer)) => {
                self.update(placeholder, &answer);
                self.conversation.push(Message::assistant(answer.clone()));
                if self.settings.persist {
                    self.persist(user_entry, &user_text, compose.file.as_ref(), &answer)
                        .await;
                }
                TurnOutcome::Answered(answer)
            }
            Ok(None) => {
                log::info!("turn cancelled, nothing will be saved");
                self.conversation.truncate(history_len);
                TurnOutcome::Cancelled {
                    partial: self.transcript[placeholder].content.clone(),
                }
            }
            Err(err) => {
                log::error!("chat turn failed: {err}");
                self.conversation.truncate(history_len);
                self.update(placeholder, &format!("{APOLOGY} {err}"));
                TurnOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Returns `None` when cancelled.
    async fn run_turn(
        &mut self,
        placeholder: usize,
        files: Option<Vec<FilePayload>>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ChatError> {
        let use_tools = self.settings.function_calling && !self.tools.is_empty();
        let Some(first) = self.call_model(placeholder, files, use_tools, cancel).await? else {
            return Ok(None);
        };
        if first.tool_calls.is_empty() {
            return Ok(Some(first.text));
        }

        let names = first
            .tool_calls
            .iter()
            .map(|call| call.name().to_string())
            .collect();
        self.emit(TurnEvent::ExecutingTools { names });
        self.update(placeholder, EXECUTING_TOOLS);

        let outputs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            outputs = self.tools.execute(&first.tool_calls, self.backend.as_ref()) => outputs,
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }

        self.conversation
            .push(Message::assistant_tool_calls(&first.text, first.tool_calls));
        for output in &outputs {
            self.conversation.push(Message::tool_result(
                output.id.clone(),
                output.name.clone(),
                output.to_message_content(),
            ));
        }

        // Single follow-up round: the answer must come back as text.
        let Some(follow_up) = self.call_model(placeholder, None, false, cancel).await? else {
            return Ok(None);
        };
        if !follow_up.tool_calls.is_empty() {
            log::warn!(
                "ignoring {} tool call(s) requested in the follow-up answer",
                follow_up.tool_calls.len()
            );
        }
        Ok(Some(follow_up.text))
    }

    /// Streams one model response into the placeholder. `None` when cancelled.
    async fn call_model(
        &mut self,
        placeholder: usize,
        files: Option<Vec<FilePayload>>,
        with_tools: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<DecodedResponse>, ChatError> {
        self.conversation.check_order()?;
        let request = self.request(files, with_tools);
        log::debug!(
            "chat request with {} messages (tools: {with_tools})",
            request.messages.len()
        );

        let mut body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            body = self.model.stream_chat(&request) => body?,
        };
        let mut decoder = StreamDecoder::new();

        'read: loop {
            // A stalled read must not outlive the cancellation.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            decoder.push_bytes(&chunk?);
            loop {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let Some(chunks) = decoder.next_line() else {
                    break;
                };
                if has_text(&chunks) {
                    self.update(placeholder, decoder.text());
                }
                if decoder.is_done() {
                    break 'read;
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(chunks) = decoder.finish_input() {
            if has_text(&chunks) {
                self.update(placeholder, decoder.text());
            }
        }
        Ok(Some(decoder.into_response()))
    }

    fn request(&self, files: Option<Vec<FilePayload>>, with_tools: bool) -> ChatRequest {
        ChatRequest {
            messages: self.conversation.messages().to_vec(),
            model: self.settings.model.clone(),
            files,
            system_prompt: self.settings.system_prompt.clone(),
            tools: (with_tools && self.settings.function_calling && !self.tools.is_empty())
                .then(|| self.tools.schemas()),
        }
    }

    /// Each step is attempted on its own; failures are logged and skipped.
    async fn persist(
        &mut self,
        user_entry: UserEntry,
        user_text: &str,
        file: Option<&FileAttachment>,
        answer: &str,
    ) {
        let backend = Arc::clone(&self.backend);

        if self.conversation.chat_id().is_none() {
            let title = match self.model.generate_title(user_text).await {
                Ok(title) => title,
                Err(err) => {
                    log::warn!("title generation failed, using fallback: {err}");
                    fallback_title(user_text)
                }
            };
            match history::create_chat(backend.as_ref(), &title).await {
                Ok(chat_id) => {
                    log::info!("created chat {chat_id} ({title})");
                    self.conversation.set_chat_id(chat_id.clone());
                    self.emit(TurnEvent::ChatCreated { chat_id });
                }
                Err(err) => {
                    log::error!("failed to create chat: {err}");
                    return;
                }
            }
        }
        let Some(chat_id) = self.conversation.chat_id().map(str::to_string) else {
            return;
        };

        let mut user_record = PersistedMessage::new(PersistedRole::User, user_text);
        if let Some(file) = file {
            match history::upload_file(backend.as_ref(), &chat_id, file).await {
                Ok(reference) => {
                    user_record = user_record.with_file(&reference);
                    self.attach_uploaded(user_entry, reference);
                }
                Err(err) => log::error!("failed to upload {}: {err}", file.name()),
            }
        }
        if let Err(err) = history::save_message(backend.as_ref(), &chat_id, &user_record).await {
            log::error!("failed to save user message: {err}");
        }
        let reply = PersistedMessage::new(PersistedRole::Model, answer);
        if let Err(err) = history::save_message(backend.as_ref(), &chat_id, &reply).await {
            log::error!("failed to save assistant message: {err}");
        }
    }

    /// Swaps the local preview of an attachment for its uploaded URL.
    fn attach_uploaded(&mut self, user_entry: UserEntry, reference: FileReference) {
        if let Some(entry) = self.transcript.get_mut(user_entry.transcript) {
            entry.file = Some(reference.clone());
        }
        self.conversation.set_file(user_entry.history, reference);
    }

    fn append(&mut self, message: DisplayMessage) -> usize {
        let index = self.transcript.len();
        self.transcript.push(message.clone());
        self.emit(TurnEvent::Appended { index, message });
        index
    }

    fn update(&mut self, index: usize, content: &str) {
        if let Some(entry) = self.transcript.get_mut(index) {
            entry.content = content.to_string();
            self.emit(TurnEvent::Updated {
                index,
                content: content.to_string(),
            });
        }
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = events.send(event);
        }
    }
}

fn files_payload(file: Option<&FileAttachment>) -> Option<Vec<FilePayload>> {
    file.map(|file| vec![FilePayload::from(file)])
}

fn has_text(chunks: &[StreamChunk]) -> bool {
    chunks
        .iter()
        .any(|chunk| matches!(chunk, StreamChunk::Text(_)))
}
