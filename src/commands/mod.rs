//! Subcommands of the `legis` binaries.

use std::sync::Arc;

use clap::Args;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::assistant::backend::HttpBackend;
use crate::assistant::legislative;
use crate::assistant::orchestrator::{Compose, Orchestrator, OrchestratorSettings, TurnEvent, TurnOutcome};
use crate::assistant::proxy::HttpChatProxy;
use crate::config::{Overrides, Settings};

pub mod ask;
pub mod chat;
pub mod config;
mod render;
pub mod tools;

pub use render::TranscriptPrinter;

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit: ",
    env!("LEGIS_GIT_SHA"),
    ", built: ",
    env!("LEGIS_BUILD_TS"),
    ")"
);

/// Connection, model and logging flags shared by `ask` and `chat`.
#[derive(Debug, Args, Clone, Default)]
pub struct ConnectionArgs {
    #[arg(long, help = "Profile name from the config file")]
    pub profile: Option<String>,
    #[arg(long, help = "Base URL of the chat proxy (serves /api/chat)")]
    pub proxy_url: Option<String>,
    #[arg(long, help = "Base URL of the legislative REST backend")]
    pub api_url: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long, help = "System prompt persona (legislativo, politico, contabil, ...)")]
    pub persona: Option<String>,
    #[arg(long, help = "Connect timeout in seconds")]
    pub timeout: Option<u64>,
    #[arg(long, help = "Do not offer tools to the model")]
    pub no_tools: bool,
    #[arg(long, help = "Do not save the chat to the backend")]
    pub no_save: bool,
    #[arg(short, long)]
    pub verbose: bool,
    #[arg(short, long, help = "Only print answers and fatal errors")]
    pub quiet: bool,
}

impl ConnectionArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            profile: self.profile.clone(),
            proxy_url: self.proxy_url.clone(),
            api_url: self.api_url.clone(),
            model: self.model.clone(),
            persona: self.persona.clone(),
            timeout: self.timeout,
            no_tools: self.no_tools,
        }
    }

    pub fn settings(&self) -> Result<Settings, String> {
        crate::logging::init(self.verbose, self.quiet);
        let settings = Settings::resolve(&self.overrides())?;
        log::debug!(
            "proxy_url={} api_url={} model={} persona={} function_calling={} token_present={}",
            settings.proxy_url,
            settings.api_url,
            settings.model,
            settings.persona.name,
            settings.function_calling,
            settings.token.is_some()
        );
        Ok(settings)
    }
}

/// Wires the HTTP proxy, backend and tool registry into an orchestrator.
pub fn build_orchestrator(settings: &Settings, persist: bool) -> Result<Orchestrator, String> {
    let proxy = HttpChatProxy::new(settings.proxy_url.clone(), settings.timeout_secs)
        .map_err(|err| format!("Failed to build chat proxy client: {err}"))?;
    let backend = HttpBackend::new(
        settings.api_url.clone(),
        settings.token.clone(),
        settings.timeout_secs,
    )
    .map_err(|err| format!("Failed to build backend client: {err}"))?;
    let tools = legislative::default_registry().map_err(|err| err.to_string())?;

    Ok(Orchestrator::new(
        Arc::new(proxy),
        Arc::new(backend),
        Arc::new(tools),
        OrchestratorSettings {
            model: settings.model.clone(),
            system_prompt: settings.persona.prompt.clone(),
            function_calling: settings.function_calling,
            persist,
        },
    ))
}

/// Orchestrator plus the receiving end of its transcript events.
pub struct Session {
    pub chat: Orchestrator,
    events: UnboundedReceiver<TurnEvent>,
}

impl Session {
    pub fn new(chat: Orchestrator) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        Self {
            chat: chat.with_events(tx),
            events,
        }
    }

    /// Runs one turn, printing transcript events as they arrive. Ctrl-C
    /// cancels the turn instead of killing the process.
    pub async fn turn(&mut self, compose: Compose, printer: &mut TranscriptPrinter) -> TurnOutcome {
        let cancel = CancellationToken::new();
        let turn = self.chat.send_message(compose, &cancel);
        tokio::pin!(turn);

        let outcome = loop {
            tokio::select! {
                outcome = &mut turn => break outcome,
                Some(event) = self.events.recv() => printer.handle(event),
                signal = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    if signal.is_ok() {
                        log::info!("cancelling current answer");
                        cancel.cancel();
                    }
                }
            }
        };

        while let Ok(event) = self.events.try_recv() {
            printer.handle(event);
        }
        printer.finish_turn();
        outcome
    }

    /// Drops events queued while loading or resetting.
    pub fn discard_events(&mut self) {
        while self.events.try_recv().is_ok() {}
    }
}
