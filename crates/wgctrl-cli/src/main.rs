//! `wgctrl` binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wgctrl_cli::cli::{Cli, Commands};
use wgctrl_cli::commands::{KeyCommand, KeyKind, ShowCommand};
use wgctrl_cli::output::OutputFormat;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Show(args) => {
            let cmd = ShowCommand::new(cli.client_options());
            cmd.execute(&mut stdout, &format, args)
                .context("unable to show devices")?;
        }
        Commands::Genkey => KeyCommand::new(KeyKind::Private).execute(io::empty(), &mut stdout)?,
        Commands::Genpsk => KeyCommand::new(KeyKind::Preshared).execute(io::empty(), &mut stdout)?,
        Commands::Pubkey => KeyCommand::new(KeyKind::Public)
            .execute(io::stdin().lock(), &mut stdout)
            .context("unable to derive public key")?,
    }

    Ok(())
}
