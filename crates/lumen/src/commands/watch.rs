//! `watch`: hold sessions open and print live state as it changes.

use std::time::Duration;

use tabled::Tabled;

use lumen_core::{HardwareId, Hub, LiveState};

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output::{self, Presentation};

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct LiveRow {
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Bri")]
    brightness: String,
    #[tabled(rename = "Color")]
    color: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "Signal")]
    signal: String,
}

fn row(state: &LiveState, color: bool) -> LiveRow {
    let runtime = state.runtime.as_ref();
    let info = state.info.as_ref();
    LiveRow {
        identity: state.identity.to_string(),
        name: state.display_name().to_owned(),
        status: output::status_label(state.status, color),
        power: runtime.map_or_else(String::new, |r| if r.on { "on".into() } else { "off".into() }),
        brightness: runtime.map_or_else(String::new, |r| r.brightness.to_string()),
        color: runtime
            .and_then(lumen_core::RuntimeState::color)
            .map_or_else(String::new, util::hex_color),
        firmware: info.map_or_else(String::new, |i| i.version.clone()),
        signal: info
            .and_then(|i| i.signal)
            .map_or_else(String::new, |s| format!("{s}%")),
    }
}

pub(crate) fn render_states(states: &[LiveState], out: &Presentation) -> Result<String, CliError> {
    output::render_list(
        out.format,
        states,
        |s| row(s, out.color),
        |s| format!("{} {}", s.identity, s.status),
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(hub: &Hub, args: &WatchArgs, out: &Presentation) -> Result<(), CliError> {
    let only: Option<HardwareId> = args
        .device
        .as_deref()
        .map(|d| util::resolve_device(hub, d))
        .transpose()?
        .map(|d| d.identity);

    let mut live = hub.roster().live_states();
    hub.start_sessions().await;

    let deadline = tokio::time::sleep(args.duration.unwrap_or(Duration::MAX));
    tokio::pin!(deadline);

    let mut printed: Option<Vec<LiveState>> = None;
    loop {
        let states: Vec<LiveState> = live
            .borrow_and_update()
            .iter()
            .filter(|s| only.as_ref().is_none_or(|id| &s.identity == id))
            .cloned()
            .collect();
        if printed.as_ref() != Some(&states) {
            let rendered = render_states(&states, out)?;
            output::print_output(&rendered, out.quiet);
            printed = Some(states);
        }

        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = live.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
