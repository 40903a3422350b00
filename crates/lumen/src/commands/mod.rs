//! Command dispatch: bridges CLI args -> hub operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod discover;
pub mod send;
pub mod util;
pub mod watch;

use lumen_core::Hub;

use crate::cli::Command;
use crate::error::CliError;
use crate::output::Presentation;

/// Dispatch a registry-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, hub: &Hub, out: &Presentation) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(hub, &args, out).await,
        Command::Add(args) => devices::add(hub, &args, out).await,
        Command::List(args) => devices::list(hub, &args, out),
        Command::Rename(args) => devices::rename(hub, args, out),
        Command::Hide(args) => devices::set_hidden(hub, &args, true, out),
        Command::Unhide(args) => devices::set_hidden(hub, &args, false, out),
        Command::Remove(args) => devices::remove(hub, &args, out),
        Command::Watch(args) => watch::handle(hub, &args, out).await,
        Command::Send(args) => send::handle(hub, &args, out).await,
        // Config and Completions are handled before a hub is opened
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
