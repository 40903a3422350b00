//! `discover`: browse mDNS for a while and register what answers.

use std::collections::BTreeMap;

use lumen_core::{Device, DiscoveryState, HardwareId, Hub};

use crate::cli::DiscoverArgs;
use crate::error::CliError;
use crate::output::{self, Presentation};

use super::devices::render_devices;

pub async fn handle(hub: &Hub, args: &DiscoverArgs, out: &Presentation) -> Result<(), CliError> {
    let mut found = hub.start_discovery()?;
    let mut state = hub.discovery().state();
    let deadline = tokio::time::sleep(args.duration);
    tokio::pin!(deadline);

    if !out.quiet {
        eprintln!(
            "Browsing for {}...",
            humantime::format_duration(args.duration)
        );
    }

    let mut devices: BTreeMap<HardwareId, Device> = BTreeMap::new();
    loop {
        tokio::select! {
            () = &mut deadline => break,
            device = found.recv() => match device {
                Some(device) => {
                    tracing::info!(identity = %device.identity, address = %device.address, "Registered");
                    devices.insert(device.identity.clone(), device);
                }
                None => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let failure = match &*state.borrow_and_update() {
                    DiscoveryState::Failed(message) => Some(message.clone()),
                    _ => None,
                };
                if let Some(message) = failure {
                    hub.discovery().stop();
                    return Err(CliError::Discovery { message });
                }
            }
        }
    }
    hub.discovery().stop();

    let devices: Vec<Device> = devices.into_values().collect();
    if devices.is_empty() && !out.quiet {
        eprintln!("No devices found.");
        return Ok(());
    }
    let rendered = render_devices(&devices, out)?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}
