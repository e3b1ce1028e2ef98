use super::config::cmd_config;
use super::env::CliArgs;
use super::inspect::cmd_inspect;
use super::replay::cmd_replay;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Replay(args) => cmd_replay(args, ctx, cli.output.clone()).await,
        Commands::Inspect(args) => cmd_inspect(args, ctx, cli.output.clone()),
        Commands::Config(args) => cmd_config(args, ctx, cli.output.clone()),
    }
}
