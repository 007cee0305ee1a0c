//! Streaming chat client for the Legis AI assistant.
//!
//! The module contains the message model, the stream decoder, the tool
//! registry and the orchestrator that ties them to the chat proxy and the
//! legislative backend.

/// File attachments picked for a message.
pub mod attachment;
/// Generic backend REST collaborator.
pub mod backend;
pub(crate) mod chat_runtime;
/// Chat and message persistence calls.
pub mod history;
/// Tools registered for the legislative assistant.
pub mod legislative;
/// History and persisted message types.
pub mod messages;
pub mod orchestrator;
/// System prompt personas.
pub mod persona;
/// Chat-completion proxy client.
pub mod proxy;
/// Incremental decoder for the proxy's line stream.
pub mod stream;
/// Tool schema, registry and executor.
pub mod tools;
