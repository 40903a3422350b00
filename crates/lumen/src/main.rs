mod cli;
mod commands;
mod error;
mod output;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use lumen_config::Config;
use lumen_core::Hub;

use crate::cli::{Cli, ColorMode, Command, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::Presentation;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands must work even when the file is broken
        Command::Config(ref args) => {
            let out = presentation(&cli.global, &lumen_config::load_config_or_default());
            commands::config_cmd::handle(args, &out)
        }

        Command::Completions(ref args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "lumen", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = lumen_config::load_config()?;
            let out = presentation(&cli.global, &cfg);
            let hub = open_hub(&cli.global, &cfg)?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &hub, &out).await;
            hub.shutdown().await;
            result
        }
    }
}

/// Flags win over the config file's `[defaults]`.
fn presentation(global: &GlobalOpts, cfg: &Config) -> Presentation {
    let format = global
        .output
        .or_else(|| OutputFormat::from_str(&cfg.defaults.output, true).ok())
        .unwrap_or(OutputFormat::Table);
    let color = global
        .color
        .or_else(|| ColorMode::from_str(&cfg.defaults.color, true).ok())
        .unwrap_or(ColorMode::Auto);
    Presentation {
        format,
        color: output::should_color(color),
        quiet: global.quiet,
    }
}

fn open_hub(global: &GlobalOpts, cfg: &Config) -> Result<Hub, CliError> {
    let mut link = cfg.to_link_config()?;
    if let Some(path) = &global.registry {
        link.registry_path = Some(path.clone());
    }
    tracing::debug!(registry = ?link.registry_path, "opening hub");
    Ok(Hub::open(link)?)
}
