//! Incremental decoder for the chat proxy's `data: {json}` line stream.
//!
//! Bytes are buffered until a full line is available, so chunk boundaries
//! (including ones inside a multi-byte character) never change the result.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::assistant::tools::ToolCall;

const DONE_SENTINEL: &str = "[DONE]";

/// Why the model stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    ToolCalls,
    Stop,
    Length,
    Other(String),
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "tool_calls" => Self::ToolCalls,
            "stop" => Self::Stop,
            "length" => Self::Length,
            _ => Self::Other(value),
        }
    }
}

/// Fragment of one tool call, keyed by its stream index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One validated piece of a stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    ToolCalls(Vec<ToolCallDelta>),
    Finish(FinishReason),
    Done,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Parses one line into its chunks. Blank lines and SSE comments yield nothing.
pub fn parse_line(line: &str) -> Result<Vec<StreamChunk>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(Vec::new());
    }
    let payload = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if payload == DONE_SENTINEL {
        return Ok(vec![StreamChunk::Done]);
    }

    let wire: WireChunk = serde_json::from_str(payload)?;
    let mut chunks = Vec::new();
    let Some(choice) = wire.choices.into_iter().next() else {
        return Ok(chunks);
    };

    if let Some(delta) = choice.delta {
        if let Some(content) = delta.content.filter(|content| !content.is_empty()) {
            chunks.push(StreamChunk::Text(content));
        }
        let deltas: Vec<_> = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let (name, arguments) = call
                    .function
                    .map(|function| (function.name, function.arguments))
                    .unwrap_or_default();
                ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }
            })
            .collect();
        if !deltas.is_empty() {
            chunks.push(StreamChunk::ToolCalls(deltas));
        }
    }
    if let Some(reason) = choice.finish_reason {
        chunks.push(StreamChunk::Finish(reason.into()));
    }
    Ok(chunks)
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn merge(&mut self, delta: &ToolCallDelta) {
        if self.id.is_empty() {
            if let Some(id) = delta.id.as_deref() {
                self.id = id.to_string();
            }
        }
        if self.name.is_empty() {
            if let Some(name) = delta.name.as_deref() {
                self.name = name.to_string();
            }
        }
        if let Some(arguments) = &delta.arguments {
            self.arguments.push_str(arguments);
        }
    }
}

/// Final text and completed tool calls of one model response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    text: String,
    partials: BTreeMap<u32, PartialCall>,
    completed: Vec<ToolCall>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers raw bytes read from the response body.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if !self.done {
            self.pending.extend_from_slice(bytes);
        }
    }

    /// Decodes the next complete buffered line, or `None` when no full line is
    /// buffered or the done sentinel was seen.
    pub fn next_line(&mut self) -> Option<Vec<StreamChunk>> {
        if self.done {
            return None;
        }
        let newline = self.pending.iter().position(|byte| *byte == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=newline).collect();
        Some(self.decode_line(&line))
    }

    /// Decodes a trailing line that was never newline-terminated.
    pub fn finish_input(&mut self) -> Option<Vec<StreamChunk>> {
        if self.done || self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(self.decode_line(&line))
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.completed
    }

    pub fn into_response(self) -> DecodedResponse {
        DecodedResponse {
            text: self.text,
            tool_calls: self.completed,
        }
    }

    fn decode_line(&mut self, raw: &[u8]) -> Vec<StreamChunk> {
        let line = String::from_utf8_lossy(raw);
        match parse_line(&line) {
            Ok(chunks) => {
                for chunk in &chunks {
                    self.apply(chunk);
                }
                chunks
            }
            Err(err) => {
                log::debug!("skipping malformed stream line: {err}");
                Vec::new()
            }
        }
    }

    fn apply(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Text(delta) => self.text.push_str(delta),
            StreamChunk::ToolCalls(deltas) => {
                for delta in deltas {
                    self.partials.entry(delta.index).or_default().merge(delta);
                }
            }
            StreamChunk::Finish(FinishReason::ToolCalls) => self.promote_calls(),
            StreamChunk::Finish(_) => {}
            StreamChunk::Done => self.done = true,
        }
    }

    fn promote_calls(&mut self) {
        for (index, partial) in std::mem::take(&mut self.partials) {
            if partial.id.is_empty() || partial.name.is_empty() {
                log::debug!("dropping incomplete tool call at index {index}");
                continue;
            }
            let mut call = ToolCall::new(partial.id, partial.name, partial.arguments);
            call.index = index;
            self.completed.push(call);
        }
    }
}

/// Decodes a whole stream given as a sequence of byte chunks.
pub fn decode_chunks<I, B>(chunks: I) -> DecodedResponse
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut decoder = StreamDecoder::new();
    for chunk in chunks {
        decoder.push_bytes(chunk.as_ref());
        while decoder.next_line().is_some() {}
    }
    decoder.finish_input();
    decoder.into_response()
}
