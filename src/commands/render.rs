use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::assistant::messages::Role;
use crate::assistant::orchestrator::{DisplayMessage, EXECUTING_TOOLS, PLACEHOLDER, TurnEvent};

/// Writes the assistant bubble of each turn to stdout as it grows.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    current: Option<usize>,
    printed: String,
    quiet: bool,
    silent: bool,
}

impl TranscriptPrinter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            ..Self::default()
        }
    }

    /// Prints nothing; used for `--json` output.
    pub fn silent() -> Self {
        Self {
            silent: true,
            quiet: true,
            ..Self::default()
        }
    }

    pub fn handle(&mut self, event: TurnEvent) {
        if self.silent {
            return;
        }
        match event {
            TurnEvent::Appended { index, message } if message.role == Role::Assistant => {
                self.current = Some(index);
                self.printed.clear();
            }
            TurnEvent::Appended { .. } => {}
            TurnEvent::Updated { index, content } if self.current == Some(index) => {
                self.show(&content);
            }
            TurnEvent::Updated { .. } => {}
            TurnEvent::ExecutingTools { names } => {
                if !self.quiet {
                    eprintln!("{}", format!("[{EXECUTING_TOOLS} {}]", names.join(", ")).dimmed());
                }
            }
            TurnEvent::ChatCreated { chat_id } => {
                if !self.quiet {
                    eprintln!("{}", format!("[chat {chat_id}]").dimmed());
                }
            }
        }
    }

    fn show(&mut self, content: &str) {
        if content == PLACEHOLDER || content == EXECUTING_TOOLS {
            return;
        }
        let mut stdout = io::stdout().lock();
        match content.strip_prefix(self.printed.as_str()) {
            Some(delta) => {
                let _ = write!(stdout, "{delta}");
            }
            None => {
                // Replaced rather than extended (apology after an error).
                if !self.printed.is_empty() {
                    let _ = writeln!(stdout);
                }
                let _ = write!(stdout, "{content}");
            }
        }
        let _ = stdout.flush();
        self.printed = content.to_string();
    }

    /// Ends the current bubble with a newline.
    pub fn finish_turn(&mut self) {
        if !self.silent && !self.printed.is_empty() {
            println!();
        }
        self.current = None;
        self.printed.clear();
    }

    /// Prints a whole stored transcript, e.g. after loading a chat.
    pub fn replay(&self, transcript: &[DisplayMessage]) {
        if self.silent {
            return;
        }
        for message in transcript {
            let label = match message.role {
                Role::User => "você",
                Role::Assistant => "legis",
                Role::Tool => continue,
            };
            println!("{}> {}", label.bold(), message.content);
            if let Some(file) = &message.file {
                // Unsaved attachments only have an inline data: URL.
                let location = if file.url.starts_with("data:") {
                    file.mime_type.as_str()
                } else {
                    file.url.as_str()
                };
                println!("   {}", format!("[{}: {location}]", file.name).dimmed());
            }
        }
    }
}
