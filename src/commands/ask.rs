use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use crate::assistant::attachment::FileAttachment;
use crate::assistant::orchestrator::{Compose, TurnOutcome};
use crate::commands::{ConnectionArgs, Session, TranscriptPrinter, VERSION, build_orchestrator};

#[derive(Debug, Args, Clone)]
#[command(version = VERSION)]
pub struct AskArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[arg(long, help = "Attach an image, audio, video or PDF file")]
    pub file: Option<PathBuf>,
    #[arg(long, help = "Continue a stored chat")]
    pub chat_id: Option<String>,
    #[arg(long, help = "Print the /api/chat request instead of sending it")]
    pub dry_run: bool,
    #[arg(long, help = "Print the outcome as JSON")]
    pub json: bool,
    #[arg(help = "Question; read from stdin when omitted")]
    pub prompt: Option<String>,
}

fn read_prompt(prompt: Option<String>) -> Result<String, String> {
    if let Some(prompt) = prompt {
        return Ok(prompt);
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }
    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .map_err(|err| format!("Failed to read prompt from stdin: {err}"))?;
    Ok(buffer)
}

pub async fn run(args: AskArgs) -> Result<(), String> {
    let settings = args.connection.settings()?;
    let text = read_prompt(args.prompt)?;

    let file = match &args.file {
        Some(path) => Some(
            FileAttachment::from_path(path)
                .await
                .map_err(|err| err.to_string())?,
        ),
        None => None,
    };
    let compose = Compose { text, file };
    if compose.text.trim().is_empty() && compose.file.is_none() {
        return Err("No prompt provided. Pass it as an argument or via stdin.".to_string());
    }

    let persist = !args.connection.no_save && !args.dry_run;
    let mut chat = build_orchestrator(&settings, persist)?;

    if args.dry_run {
        let request = chat.preview_request(&compose);
        let body = json!({
            "dry_run": true,
            "url": format!("{}/api/chat", settings.proxy_url.trim_end_matches('/')),
            "persona": settings.persona.name,
            "request": request,
        });
        println!("{body}");
        return Ok(());
    }

    if let Some(chat_id) = &args.chat_id {
        chat.load_conversation(chat_id)
            .await
            .map_err(|err| format!("Failed to load chat '{chat_id}': {err}"))?;
    }

    let mut printer = if args.json {
        TranscriptPrinter::silent()
    } else {
        TranscriptPrinter::new(args.connection.quiet)
    };
    let mut session = Session::new(chat);
    let outcome = session.turn(compose, &mut printer).await;

    if args.json {
        let (status, text) = match &outcome {
            TurnOutcome::Answered(text) => ("answered", text.as_str()),
            TurnOutcome::Cancelled { partial } => ("cancelled", partial.as_str()),
            TurnOutcome::Failed { error } => ("failed", error.as_str()),
            TurnOutcome::Skipped => ("skipped", ""),
        };
        println!(
            "{}",
            json!({ "status": status, "text": text, "chat_id": session.chat.chat_id() })
        );
    }

    match outcome {
        TurnOutcome::Failed { error } => Err(error),
        TurnOutcome::Cancelled { .. } => {
            if !args.connection.quiet {
                eprintln!("(cancelado)");
            }
            Ok(())
        }
        TurnOutcome::Answered(_) | TurnOutcome::Skipped => Ok(()),
    }
}
