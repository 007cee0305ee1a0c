use clap::Args;
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::assistant::attachment::FileAttachment;
use crate::assistant::orchestrator::{Compose, TurnOutcome};
use crate::commands::{ConnectionArgs, Session, TranscriptPrinter, build_orchestrator};

const HELP: &str = "Comandos: /new (nova conversa), /load <id>, /file <caminho> (anexa ao próximo envio), /history, /quit";

#[derive(Debug, Args, Clone)]
pub struct ChatArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[arg(long, help = "Reopen a stored chat")]
    pub chat_id: Option<String>,
}

enum Input {
    Quit,
    NewChat,
    Load(String),
    Attach(String),
    History,
    Help,
    Message(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "/quit" | "/exit" => Input::Quit,
        "/new" => Input::NewChat,
        "/load" if !rest.trim().is_empty() => Input::Load(rest.trim().to_string()),
        "/file" if !rest.trim().is_empty() => Input::Attach(rest.trim().to_string()),
        "/history" => Input::History,
        "/help" | "/load" | "/file" => Input::Help,
        _ => Input::Message(line.to_string()),
    }
}

pub async fn run(args: ChatArgs) -> Result<(), String> {
    let settings = args.connection.settings()?;
    let chat = build_orchestrator(&settings, !args.connection.no_save)?;
    let mut session = Session::new(chat);
    let mut printer = TranscriptPrinter::new(args.connection.quiet);

    if let Some(chat_id) = &args.chat_id {
        session
            .chat
            .load_conversation(chat_id)
            .await
            .map_err(|err| format!("Failed to load chat '{chat_id}': {err}"))?;
        printer.replay(session.chat.transcript());
    }
    if !args.connection.quiet {
        eprintln!("{}", HELP.dimmed());
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut pending_file: Option<FileAttachment> = None;

    loop {
        let _ = stdout.write_all(format!("{}> ", "você".bold()).as_bytes()).await;
        let _ = stdout.flush().await;

        let line = tokio::select! {
            line = lines.next_line() => line.map_err(|err| format!("Failed to read input: {err}"))?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            Input::Quit => break,
            Input::Help => eprintln!("{HELP}"),
            Input::NewChat => {
                session.chat.new_chat();
                pending_file = None;
                eprintln!("{}", "[nova conversa]".dimmed());
            }
            Input::Load(chat_id) => match session.chat.load_conversation(&chat_id).await {
                Ok(()) => {
                    session.discard_events();
                    printer.replay(session.chat.transcript());
                }
                Err(err) => eprintln!("{}", format!("Falha ao carregar {chat_id}: {err}").red()),
            },
            Input::Attach(path) => match FileAttachment::from_path(&path).await {
                Ok(file) => {
                    eprintln!("{}", format!("[anexo: {} ({})]", file.name(), file.mime_type()).dimmed());
                    pending_file = Some(file);
                }
                Err(err) => eprintln!("{}", err.to_string().red()),
            },
            Input::History => printer.replay(session.chat.transcript()),
            Input::Message(text) => {
                let compose = Compose {
                    text,
                    file: pending_file.take(),
                };
                let _ = stdout.write_all(format!("{}> ", "legis".bold()).as_bytes()).await;
                let _ = stdout.flush().await;
                match session.turn(compose, &mut printer).await {
                    TurnOutcome::Cancelled { .. } => eprintln!("{}", "(cancelado)".dimmed()),
                    TurnOutcome::Failed { error } => log::debug!("turn failed: {error}"),
                    TurnOutcome::Answered(_) | TurnOutcome::Skipped => {}
                }
            }
        }
    }

    Ok(())
}
