//! Releaseflow command-line interface.
//!
//! Every stage command runs that stage alone against the persisted context of
//! the configuration directory; `run` walks the whole sequence and resumes
//! from the last checkpoint.

mod cli;
mod services;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, StageArgs};
use releaseflow::core::{DocumentKind, StageId};
use releaseflow::facade::CommandFacade;
use releaseflow::observability::init_tracing;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn, Level};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to render output")?
    );
    Ok(())
}

async fn dispatch(facade: &CommandFacade, command: &Command) -> Result<()> {
    let stage = |args: &StageArgs, id: StageId| (args.config.clone(), id, args.options.to_options());
    let (config, id, options) = match command {
        Command::Run(args) => {
            let output = facade.run(&args.config, &args.options.to_options()).await?;
            return print_json(&output);
        }
        Command::Build(args) => {
            let output = facade.build(&args.config, &args.options.to_options()).await?;
            return print_json(&output);
        }
        Command::Status { config } => {
            return match facade.status(config).await? {
                Some(progress) => print_json(&progress),
                None => {
                    println!("No release in progress for {}", config.display());
                    Ok(())
                }
            };
        }
        Command::Configure(args) => stage(args, StageId::Configure),
        Command::Repo(args) => stage(args, StageId::RepositoryGeneration),
        Command::Licenses(args) => stage(args, DocumentKind::Licenses.stage()),
        Command::Javadocs(args) => stage(args, DocumentKind::Javadoc.stage()),
        Command::Sources(args) => stage(args, DocumentKind::Sources.stage()),
        Command::SharedContent(args) => stage(args, DocumentKind::SharedContent.stage()),
        Command::Docs(args) => stage(args, DocumentKind::Documents.stage()),
        Command::Addons(args) => stage(args, StageId::AddOns),
        Command::Release(args) => stage(args, StageId::Release),
    };
    let result = facade.run_stage(&config, id, &options).await?;
    print_json(&result)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json_logs, level);

    let ports = services::ports(&cli.service_url, Duration::from_secs(cli.timeout_secs))?;
    let facade = CommandFacade::new(ports);

    let token = facade.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            token.cancel("interrupted");
        }
    });

    info!(service = %cli.service_url, "Starting releaseflow");
    dispatch(&facade, &cli.command).await
}
