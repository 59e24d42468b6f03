//! API Frenzy CLI
//!
//! Command-line interface for the API Frenzy platform.
//!
//! - `version` prints build and platform information
//! - `tunnel` runs a WebSocket-to-TCP tunnel through the external `wstunnel` binary
//! - `db connect` opens a psql session through such a tunnel
//!
//! All tunneling itself is done by `wstunnel`; this tool builds its command
//! line, supervises the child and forwards termination signals to it.

#![deny(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::style)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod db;
mod error;
mod output;
mod signals;
#[cfg(all(test, unix))]
mod testing;
mod tunnel;
mod version;

use config::{Config, TunnelConfig};
use error::CliError;
use signals::{Shutdown, Signals};
use tunnel::{LaunchSettings, TunnelOutcome, TunnelPlan};

#[derive(Parser, Debug)]
#[command(name = "af-cli")]
#[command(
    author,
    version,
    about = "API Frenzy CLI - Command-line interface for the API Frenzy platform"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Name or path of the wstunnel executable
    #[arg(long, global = true, env = "AF_CLI_WSTUNNEL")]
    wstunnel: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Display version information
    Version,

    /// Start a tunnel using wstunnel
    Tunnel(TunnelArgs),

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    /// Connect to a database through a tunnel and start psql
    Connect(ConnectArgs),
}

#[derive(Parser, Debug)]
struct TunnelArgs {
    /// Tunnel server URL (http://, https://, ws:// or wss://)
    url: String,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Parser, Debug)]
struct ConnectArgs {
    /// Tunnel server URL (http://, https://, ws:// or wss://)
    tunnel_url: String,

    /// Database username
    #[arg(short, long)]
    username: String,

    /// Database password
    #[arg(short, long)]
    password: String,

    /// Database name
    #[arg(short, long)]
    database: String,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Local port to bind to [default: 5432]
    #[arg(short, long)]
    local_port: Option<u16>,

    /// Remote database host [default: localhost]
    #[arg(long)]
    remote_host: Option<String>,

    /// Remote database port [default: 5432]
    #[arg(long)]
    remote_port: Option<u16>,
}

impl TargetArgs {
    /// Resolve flags > config file > built-in defaults.
    fn plan(&self, url: &str, defaults: &TunnelConfig) -> TunnelPlan {
        let local_port = self
            .local_port
            .or(defaults.local_port)
            .unwrap_or(tunnel::DEFAULT_PORT);
        let remote_host = self
            .remote_host
            .as_deref()
            .or(defaults.remote_host.as_deref())
            .unwrap_or(tunnel::DEFAULT_REMOTE_HOST);
        let remote_port = self
            .remote_port
            .or(defaults.remote_port)
            .unwrap_or(tunnel::DEFAULT_PORT);

        TunnelPlan::new(url, local_port, remote_host, remote_port)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load().unwrap_or_else(|err| {
        warn!("Ignoring config file: {:#}", err);
        Config::default()
    });

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let settings = launch_settings(cli.wstunnel, &config.tunnel);

    match cli.command {
        Some(Commands::Version) => {
            version::report();
            Ok(())
        }
        Some(Commands::Tunnel(args)) => run_tunnel(args, &settings, &config).await,
        Some(Commands::Db {
            action: DbCommands::Connect(args),
        }) => run_db_connect(args, &settings, &config).await,
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            eprintln!();
            eprintln!("Quick start:");
            eprintln!("  af-cli tunnel <url> -l <port>                 Start a tunnel");
            eprintln!("  af-cli db connect <url> -u <user> -p <pass> -d <db>");
            eprintln!("  af-cli version                                Show version information");
            std::process::exit(1);
        }
    }
}

async fn run_tunnel(args: TunnelArgs, settings: &LaunchSettings, config: &Config) -> Result<()> {
    let plan = args.target.plan(&args.url, &config.tunnel);
    let shutdown = Shutdown::listen(Signals::InterruptAndTerminate).map_err(CliError::Signal)?;

    match tunnel::launch(&plan, settings, shutdown).await? {
        TunnelOutcome::Closed => debug!("Tunnel exited cleanly"),
        TunnelOutcome::Stopped { forced } => debug!(forced, "Tunnel stopped on request"),
    }
    Ok(())
}

async fn run_db_connect(
    args: ConnectArgs,
    settings: &LaunchSettings,
    config: &Config,
) -> Result<()> {
    let plan = args.target.plan(&args.tunnel_url, &config.tunnel);
    let session = db::Session {
        username: args.username,
        password: args.password,
        database: args.database,
        psql: config
            .tunnel
            .psql
            .clone()
            .unwrap_or_else(|| db::DEFAULT_PSQL.to_string()),
    };
    let shutdown = Shutdown::listen(Signals::InterruptAndTerminate).map_err(CliError::Signal)?;

    db::connect(&plan, &session, settings, shutdown).await?;
    Ok(())
}

fn launch_settings(flag: Option<String>, defaults: &TunnelConfig) -> LaunchSettings {
    LaunchSettings {
        binary: flag
            .or_else(|| defaults.wstunnel.clone())
            .unwrap_or_else(|| tunnel::DEFAULT_BINARY.to_string()),
        ..LaunchSettings::default()
    }
}

fn report(err: &anyhow::Error) {
    output::error(err);
    match err.downcast_ref::<CliError>() {
        Some(CliError::MissingBinary { .. }) => output::install_hint(),
        Some(CliError::PortInUse { .. }) => output::info("Pick a free port with --local-port"),
        _ => {}
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>()
        .map(CliError::exit_code)
        .unwrap_or(1)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
