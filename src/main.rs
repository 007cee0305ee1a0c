use std::io;
use std::process;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};
use legis::commands::VERSION;
use legis::commands::ask::{self, AskArgs};
use legis::commands::chat::{self, ChatArgs};
use legis::commands::config::{self, ConfigArgs};
use legis::commands::tools::{self, ToolsArgs};

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  legis ask \"Quais projetos tratam de energia solar?\"\n  echo \"Resuma o PL 2630/2020\" | legis ask --persona politico\n  legis chat --profile prod\n  legis tools --names\n  legis completion bash > ~/.local/share/bash-completion/completions/legis";

const ASK_HELP_EXAMPLES: &str = "Examples:\n  legis ask \"Quais projetos tratam de energia solar?\"\n  legis ask --file pauta.pdf \"Resuma este documento\"\n  legis ask --no-tools --dry-run \"Explique o rito de urgência\"";

const CHAT_HELP_EXAMPLES: &str = "Examples:\n  legis chat\n  legis chat --chat-id 42 --persona contabil";

#[derive(Debug, Parser)]
#[command(
    name = "legis",
    about = "Legislative research assistant chat client",
    version = VERSION,
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Ask one question and stream the answer", after_help = ASK_HELP_EXAMPLES)]
    Ask(AskArgs),
    #[command(about = "Interactive chat session", after_help = CHAT_HELP_EXAMPLES)]
    Chat(ChatArgs),
    #[command(about = "Print the tools offered to the model")]
    Tools(ToolsArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "legis", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "legis", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "legis", &mut io::stdout()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask(args) => ask::run(args).await,
        Commands::Chat(args) => chat::run(args).await,
        Commands::Tools(args) => tools::run(args),
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
