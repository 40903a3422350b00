//! `send`: open a session to one device, deliver a command, report the
//! resulting state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use lumen_core::{Command, ConnectionStatus, Hub, LiveState};

use crate::cli::SendArgs;
use crate::error::CliError;
use crate::output::{self, Presentation};

use super::{util, watch as live_output};

/// How long to wait for the device to echo its new state.
const SETTLE: Duration = Duration::from_secs(1);

/// Build the device command from flags. No flags means "just report state".
pub fn build_command(args: &SendArgs) -> Result<Command, CliError> {
    let mut command = Command::default();
    if args.on {
        command.on = Some(true);
    } else if args.off {
        command.on = Some(false);
    }
    command.bri = args.brightness;
    command.ps = args.preset;
    if let Some(raw) = &args.rgb {
        command.seg = Command::color(util::parse_hex_color(raw)?).seg;
    }
    if let Some(transition) = args.transition {
        let deciseconds = transition.as_millis() / 100;
        command.transition = Some(u16::try_from(deciseconds).map_err(|_| CliError::Validation {
            field: "transition".into(),
            reason: format!("{} is too long", humantime::format_duration(transition)),
        })?);
    }

    if command == Command::default() {
        Ok(Command::refresh())
    } else {
        Ok(command)
    }
}

pub async fn handle(hub: &Hub, args: &SendArgs, out: &Presentation) -> Result<(), CliError> {
    let command = build_command(args)?;
    let device = util::resolve_device(hub, &args.device)?;
    let identity = device.identity.clone();

    let mut live = hub.roster().live_states();
    hub.roster().reconcile(&[Arc::new(device)]).await;

    tracing::debug!(%identity, ?command, "Queueing command");
    if !hub.roster().send(&identity, command).await {
        return Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: args.device.clone(),
            list_command: "list --all".into(),
        });
    }

    let connected = wait_for(&mut live, args.timeout, |states| {
        find(states, &identity).is_some_and(|s| s.status == ConnectionStatus::Connected)
    })
    .await;
    if !connected {
        return Err(CliError::Timeout {
            what: format!("{identity} to connect"),
            waited: humantime::format_duration(args.timeout).to_string(),
        });
    }

    let before = find(&live.borrow(), &identity).and_then(|s| s.runtime.clone());
    wait_for(&mut live, SETTLE, |states| {
        find(states, &identity).is_some_and(|s| s.runtime.is_some() && s.runtime != before)
    })
    .await;

    let state = find(&live.borrow(), &identity).cloned();
    if let Some(state) = state {
        let rendered = live_output::render_states(std::slice::from_ref(&state), out)?;
        output::print_output(&rendered, out.quiet);
    }
    Ok(())
}

fn find<'a>(states: &'a [LiveState], identity: &lumen_core::HardwareId) -> Option<&'a LiveState> {
    states.iter().find(|s| &s.identity == identity)
}

/// Wait until `pred` holds for the published states. `false` on timeout.
async fn wait_for(
    live: &mut watch::Receiver<Arc<Vec<LiveState>>>,
    timeout: Duration,
    pred: impl Fn(&[LiveState]) -> bool,
) -> bool {
    matches!(
        tokio::time::timeout(timeout, live.wait_for(|states| pred(states))).await,
        Ok(Ok(_))
    )
}
