//! Registry command handlers: add, list, rename, hide, remove.

use chrono::{DateTime, Utc};
use tabled::Tabled;

use lumen_core::{Device, Hub};

use crate::cli::{AddArgs, DeviceArg, ListArgs, RenameArgs};
use crate::error::CliError;
use crate::output::{self, Presentation};

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Hidden")]
    hidden: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

fn row(d: &Device) -> DeviceRow {
    DeviceRow {
        identity: d.identity.to_string(),
        name: d.display_name().to_owned(),
        address: d.address.clone(),
        channel: d.update_channel.to_string(),
        hidden: if d.hidden { "yes".into() } else { String::new() },
        last_seen: last_seen(d.last_seen_at),
    }
}

fn last_seen(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

fn detail(d: &Device) -> String {
    [
        format!("Identity:  {}", d.identity),
        format!("Name:      {}", d.display_name()),
        format!("Custom:    {}", d.custom_name.as_deref().unwrap_or("-")),
        format!("Reported:  {}", d.reported_name.as_deref().unwrap_or("-")),
        format!("Address:   {}", d.address),
        format!("Channel:   {}", d.update_channel),
        format!("Hidden:    {}", d.hidden),
        format!("Last seen: {}", last_seen(d.last_seen_at)),
    ]
    .join("\n")
}

pub(crate) fn render_devices(devices: &[Device], out: &Presentation) -> Result<String, CliError> {
    output::render_list(out.format, devices, row, |d| d.identity.to_string())
}

fn print_device(device: &Device, out: &Presentation) -> Result<(), CliError> {
    let rendered = output::render_single(out.format, device, detail, |d| d.identity.to_string())?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn add(hub: &Hub, args: &AddArgs, out: &Presentation) -> Result<(), CliError> {
    let device = hub.add(&args.address).await?;
    print_device(&device, out)
}

pub fn list(hub: &Hub, args: &ListArgs, out: &Presentation) -> Result<(), CliError> {
    let devices: Vec<Device> = hub
        .registry()
        .snapshot()
        .iter()
        .filter(|d| args.all || !d.hidden)
        .map(|d| d.as_ref().clone())
        .collect();
    let rendered = render_devices(&devices, out)?;
    output::print_output(&rendered, out.quiet);
    Ok(())
}

pub fn rename(hub: &Hub, args: RenameArgs, out: &Presentation) -> Result<(), CliError> {
    let device = util::resolve_device(hub, &args.device)?;
    let updated = hub
        .registry()
        .rename(&device.identity, args.name)
        .ok_or_else(|| gone(&args.device))?;
    print_device(&updated, out)
}

pub fn set_hidden(
    hub: &Hub,
    args: &DeviceArg,
    hidden: bool,
    out: &Presentation,
) -> Result<(), CliError> {
    let device = util::resolve_device(hub, &args.device)?;
    let updated = hub
        .registry()
        .set_hidden(&device.identity, hidden)
        .ok_or_else(|| gone(&args.device))?;
    print_device(&updated, out)
}

pub fn remove(hub: &Hub, args: &DeviceArg, out: &Presentation) -> Result<(), CliError> {
    let device = util::resolve_device(hub, &args.device)?;
    let removed = hub
        .registry()
        .delete(&device.identity)
        .ok_or_else(|| gone(&args.device))?;
    if !out.quiet {
        eprintln!("Removed {} ({})", removed.display_name(), removed.identity);
    }
    Ok(())
}

/// The record vanished between lookup and write.
fn gone(identifier: &str) -> CliError {
    CliError::NotFound {
        resource_type: "device".into(),
        identifier: identifier.into(),
        list_command: "list --all".into(),
    }
}
