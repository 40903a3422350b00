//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, OutputFormat};
use crate::error::CliError;
use crate::output::{self, Presentation};

pub fn handle(args: &ConfigArgs, out: &Presentation) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&lumen_config::config_path().display().to_string(), out.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = lumen_config::load_config()?;
            let rendered = match out.format {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)?,
                OutputFormat::Json => serde_json::to_string_pretty(&cfg)?,
                OutputFormat::JsonCompact => serde_json::to_string(&cfg)?,
                OutputFormat::Yaml => serde_yaml::to_string(&cfg)?,
            };
            output::print_output(&rendered, out.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = lumen_config::config_path();
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!("{} already exists (use --force to overwrite)", path.display()),
                });
            }
            let written = lumen_config::save_config(&lumen_config::Config::default())?;
            if !out.quiet {
                eprintln!("Wrote {}", written.display());
            }
            Ok(())
        }
    }
}
