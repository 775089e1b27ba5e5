//! Config command - inspect the effective configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use latchkey_config::LayerStatus;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration with secrets redacted
    Show,

    /// Show which config files were read and in what order
    Which,
}

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded: Vec<_> = ctx
        .layers
        .iter()
        .filter(|l| l.status == LayerStatus::Loaded)
        .collect();
    if loaded.is_empty() {
        println!("# No config files loaded (using defaults)");
    } else {
        for layer in loaded {
            println!("# {} config: {}", layer.kind, layer.path.display());
        }
    }

    let storage = ctx.config.storage();
    println!(
        "# session file: {}",
        storage.effective_path(&ctx.config_dir).display()
    );
    println!();
    print!("{}", ctx.config.redacted().to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config layers (later overrides earlier):");
    for layer in &ctx.layers {
        let status = match &layer.status {
            LayerStatus::Loaded => "loaded".to_string(),
            LayerStatus::Missing => "not found".to_string(),
            LayerStatus::Invalid(reason) => format!("ignored: {}", reason),
        };
        println!("  {:<8} {}  ({})", layer.kind, layer.path.display(), status);
    }
    Ok(())
}
