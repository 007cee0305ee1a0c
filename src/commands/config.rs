use clap::{Args, Subcommand};

use crate::assistant::persona::{self, DEFAULT_PERSONA};
use crate::config;

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum ConfigSubcommand {
    #[command(about = "Parse the config file and validate its profiles")]
    Check {
        #[arg(long)]
        profile: Option<String>,
    },
    #[command(about = "List built-in and configured personas")]
    Personas,
}

pub fn run(args: ConfigArgs) -> Result<(), String> {
    match args.command {
        ConfigSubcommand::Check { profile } => {
            let path = config::validate_config(profile.as_deref())?;
            println!("config OK: {}", path.display());
            Ok(())
        }
        ConfigSubcommand::Personas => {
            let configured = config::load_personas()?;
            for name in persona::personas(&configured).into_keys() {
                let mut tags = Vec::new();
                if name == DEFAULT_PERSONA {
                    tags.push("default");
                }
                if configured.contains_key(&name) {
                    tags.push("config");
                }
                if tags.is_empty() {
                    println!("{name}");
                } else {
                    println!("{name} ({})", tags.join(", "));
                }
            }
            Ok(())
        }
    }
}
