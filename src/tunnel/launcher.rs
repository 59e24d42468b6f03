use std::process::ExitStatus;
use std::time::Duration;

use tracing::{debug, info};

use super::readiness::{self, POLL_INTERVAL};
use super::{lookup, Attach, TunnelPlan, TunnelProcess, DEFAULT_BINARY, LOCAL_BIND};
use crate::error::{CliError, Result};
use crate::output;
use crate::signals::Shutdown;

/// Delay between SIGTERM and SIGKILL when stopping the tunnel.
pub const GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How long to wait for the local listener before printing a hint.
pub const ANNOUNCE_AFTER: Duration = Duration::from_secs(2);

/// How long `db connect` waits for the local listener before starting psql anyway.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// Name or path of the wstunnel executable
    pub binary: String,
    pub grace: Duration,
    pub announce_after: Duration,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            grace: GRACE_PERIOD,
            announce_after: ANNOUNCE_AFTER,
            ready_timeout: READY_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// How a tunnel run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOutcome {
    /// The tunnel exited on its own with status 0
    Closed,
    /// A shutdown was requested; `forced` when the child had to be killed
    Stopped { forced: bool },
}

enum Event {
    Exited(ExitStatus),
    ShutdownRequested,
}

/// Run a tunnel in the foreground until it exits or a shutdown is requested.
///
/// The child shares the terminal's process group, so Ctrl+C may kill it
/// directly; such an exit still counts as a requested shutdown.
pub async fn launch(
    plan: &TunnelPlan,
    settings: &LaunchSettings,
    shutdown: Shutdown,
) -> Result<TunnelOutcome> {
    output::ok("Setting up tunnel...");
    output::detail(format!("WebSocket Server: {}", plan.server_url));
    output::detail(format!("Local Port: {}", plan.local_port));
    output::detail(format!("Remote Target: {}", plan.remote_target()));
    output::blank();

    let binary = lookup::locate(&settings.binary).ok_or_else(|| CliError::MissingBinary {
        binary: settings.binary.clone(),
    })?;

    if readiness::listener_up(plan.local_port) {
        return Err(CliError::PortInUse {
            port: plan.local_port,
        });
    }

    output::notice(format!("Starting {}...", settings.binary));
    output::detail(format!("Command: {}", plan.command_line(&settings.binary)));
    output::blank();

    let mut process = TunnelProcess::spawn(&binary, plan, Attach::Terminal)?;
    info!(
        rule = %plan.forward_rule(),
        url = %plan.ws_url,
        "Tunnel process started"
    );

    let ready = readiness::wait_for_listener(plan.local_port, settings.poll_interval);
    tokio::pin!(ready);
    let hint = tokio::time::sleep(settings.announce_after);
    tokio::pin!(hint);
    let mut announced = false;
    let mut hinted = false;

    let event = loop {
        tokio::select! {
            biased;
            _ = shutdown.requested() => break Event::ShutdownRequested,
            status = process.wait() => break Event::Exited(status?),
            _ = &mut ready, if !announced => {
                announced = true;
                announce(plan);
            }
            _ = &mut hint, if !announced && !hinted => {
                hinted = true;
                output::notice(format!(
                    "Waiting for local listener on {}:{}...",
                    LOCAL_BIND, plan.local_port
                ));
            }
        }
    };

    match event {
        Event::Exited(status) if status.success() => {
            output::ok("Tunnel closed");
            Ok(TunnelOutcome::Closed)
        }
        Event::Exited(status) if shutdown.explains(&status).await => {
            output::blank();
            output::notice("Shutting down tunnel...");
            debug!(%status, "Tunnel exited on the shutdown signal");
            Ok(TunnelOutcome::Stopped { forced: false })
        }
        Event::Exited(status) => Err(CliError::from_status(process.program(), status)),
        Event::ShutdownRequested => {
            output::blank();
            output::notice("Shutting down tunnel...");
            let status = process.shutdown(settings.grace).await?;
            debug!(?status, "Tunnel stopped");
            Ok(TunnelOutcome::Stopped {
                forced: status.is_none(),
            })
        }
    }
}

fn announce(plan: &TunnelPlan) {
    output::ok("Tunnel established!");
    output::detail(format!("Local endpoint: localhost:{}", plan.local_port));
    output::detail("Press Ctrl+C to close tunnel");
    output::blank();
}
