//! `af-cli db connect`: an interactive psql session through a background tunnel.
//!
//! The tunnel runs in its own process group, so Ctrl+C typed into psql
//! cancels the query without reaching wstunnel. It is stopped with the usual
//! grace sequence on every exit path.

use std::io::ErrorKind;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{CliError, Result};
use crate::output;
use crate::signals::{Shutdown, Signals};
use crate::tunnel::readiness::{listener_up, wait_for_listener};
use crate::tunnel::{
    lookup, spawn_command, Attach, LaunchSettings, TunnelPlan, TunnelProcess, LOCAL_BIND,
};

pub const DEFAULT_PSQL: &str = "psql";

/// Credentials and client for the psql session.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub password: String,
    pub database: String,
    /// Name or path of the psql executable
    pub psql: String,
}

impl Session {
    pub fn psql_args(&self, local_port: u16) -> Vec<String> {
        vec![
            "-h".to_string(),
            "localhost".to_string(),
            "-p".to_string(),
            local_port.to_string(),
            "-U".to_string(),
            self.username.clone(),
            "-d".to_string(),
            self.database.clone(),
        ]
    }

    /// Command for connecting by hand; the password is left as a placeholder.
    pub fn manual_command(&self, local_port: u16) -> String {
        format!(
            "PGPASSWORD=<password> {} {}",
            self.psql,
            self.psql_args(local_port).join(" ")
        )
    }

    fn spawn(&self, local_port: u16) -> std::io::Result<Child> {
        let mut command = Command::new(&self.psql);
        command
            .args(self.psql_args(local_port))
            .env("PGPASSWORD", &self.password)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        spawn_command(&mut command)
    }
}

pub async fn connect(
    plan: &TunnelPlan,
    session: &Session,
    settings: &LaunchSettings,
    shutdown: Shutdown,
) -> Result<()> {
    let binary = lookup::locate(&settings.binary).ok_or_else(|| CliError::MissingBinary {
        binary: settings.binary.clone(),
    })?;

    if listener_up(plan.local_port) {
        return Err(CliError::PortInUse {
            port: plan.local_port,
        });
    }

    output::ok("Setting up database tunnel...");
    output::detail(format!("WebSocket Server: {}", plan.server_url));
    output::detail(format!("Local Port: {}", plan.local_port));
    output::detail(format!("Remote Target: {}", plan.remote_target()));
    output::detail(format!("Database: {}", session.database));
    output::detail(format!("Username: {}", session.username));
    output::blank();

    output::notice(format!("Starting {} in background...", settings.binary));
    output::detail(format!("Command: {}", plan.command_line(&settings.binary)));
    output::blank();

    let mut tunnel = TunnelProcess::spawn(&binary, plan, Attach::Background)?;
    let result = run_session(&mut tunnel, plan, session, settings, shutdown).await;

    output::blank();
    output::notice("Shutting down tunnel...");
    if let Err(err) = tunnel.shutdown(settings.grace).await {
        warn!(%err, "Failed to stop tunnel");
    }

    result
}

async fn run_session(
    tunnel: &mut TunnelProcess,
    plan: &TunnelPlan,
    session: &Session,
    settings: &LaunchSettings,
    shutdown: Shutdown,
) -> Result<()> {
    output::notice("Waiting for tunnel to establish...");
    let ready = tokio::time::timeout(
        settings.ready_timeout,
        wait_for_listener(plan.local_port, settings.poll_interval),
    );

    tokio::select! {
        biased;
        _ = shutdown.requested() => return Ok(()),
        ready = ready => {
            if ready.is_err() {
                output::warn(format!(
                    "Local listener on {}:{} not detected after {:?}, starting psql anyway",
                    LOCAL_BIND, plan.local_port, settings.ready_timeout
                ));
            }
        }
        status = tunnel.wait() => return Err(CliError::from_status(tunnel.program(), status?)),
    }

    output::ok("Tunnel established!");
    output::ok("Starting psql session...");
    output::blank();

    // Ctrl+C belongs to psql while it runs.
    let shutdown = shutdown.narrow(Signals::Terminate).map_err(CliError::Signal)?;

    let mut psql = match session.spawn(plan.local_port) {
        Ok(child) => child,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(psql = %session.psql, "psql not found");
            let shutdown = shutdown
                .narrow(Signals::InterruptAndTerminate)
                .map_err(CliError::Signal)?;
            return keep_tunnel_open(tunnel, plan, session, shutdown).await;
        }
        Err(source) => {
            return Err(CliError::Spawn {
                program: session.psql.clone(),
                source,
            })
        }
    };

    tokio::select! {
        biased;
        _ = shutdown.requested() => Ok(()),
        status = psql.wait() => {
            let status = status?;
            if status.success() {
                output::blank();
                output::ok("Session ended.");
                Ok(())
            } else if shutdown.explains(&status).await {
                Ok(())
            } else {
                Err(CliError::from_status(&session.psql, status))
            }
        }
        status = tunnel.wait() => {
            let status = status?;
            if shutdown.explains(&status).await {
                Ok(())
            } else {
                Err(CliError::from_status(tunnel.program(), status))
            }
        }
    }
}

/// Without psql the tunnel stays up until a shutdown is requested.
async fn keep_tunnel_open(
    tunnel: &mut TunnelProcess,
    plan: &TunnelPlan,
    session: &Session,
    shutdown: Shutdown,
) -> Result<()> {
    output::blank();
    output::warn("psql is not installed. Please install PostgreSQL client.");
    output::detail(format!("Tunnel is running at localhost:{}", plan.local_port));
    output::detail("You can connect manually with:");
    output::indented(session.manual_command(plan.local_port));
    output::detail("Press Ctrl+C to close tunnel.");

    tokio::select! {
        biased;
        _ = shutdown.requested() => Ok(()),
        status = tunnel.wait() => Err(CliError::from_status(tunnel.program(), status?)),
    }
}
