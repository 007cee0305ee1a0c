use clap::Args;
use serde_json::Value;

use crate::assistant::legislative;

#[derive(Debug, Args, Clone)]
pub struct ToolsArgs {
    #[arg(long, help = "Print one tool name and description per line")]
    pub names: bool,
}

pub fn run(args: ToolsArgs) -> Result<(), String> {
    let registry = legislative::default_registry().map_err(|err| err.to_string())?;

    if args.names {
        for name in registry.names() {
            let description = registry
                .definition(name)
                .map(|definition| definition.function.description.as_str())
                .unwrap_or_default();
            println!("{name}\t{description}");
        }
        return Ok(());
    }

    let schemas = Value::Array(registry.schemas());
    let rendered = serde_json::to_string_pretty(&schemas)
        .map_err(|err| format!("Failed to render tool schemas: {err}"))?;
    println!("{rendered}");
    Ok(())
}
