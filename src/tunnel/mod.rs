//! WebSocket-to-TCP tunnels through the external `wstunnel` binary.
//!
//! - [`TunnelPlan`] - resolved options, forwarding rule and argument vector
//! - [`lookup`] - locating the executable on `PATH`
//! - [`TunnelProcess`] - the owned child process
//! - [`launch`] - the `af-cli tunnel` flow

mod launcher;
pub mod lookup;
mod process;
pub mod readiness;

pub use launcher::{launch, LaunchSettings, TunnelOutcome};
pub use process::{Attach, TunnelProcess};
pub(crate) use process::spawn_command;

pub const DEFAULT_BINARY: &str = "wstunnel";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_REMOTE_HOST: &str = "localhost";

/// Address the local listener binds to.
pub const LOCAL_BIND: &str = "127.0.0.1";

/// Rewrite an HTTP(S) URL into the matching WebSocket scheme.
///
/// `http://` becomes `ws://` and `https://` becomes `wss://`; anything else is
/// returned unchanged.
pub fn to_websocket_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else {
        url.to_string()
    }
}

/// A tunnel from `127.0.0.1:<local_port>` to `<remote_host>:<remote_port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelPlan {
    /// URL as given on the command line
    pub server_url: String,
    pub ws_url: String,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl TunnelPlan {
    pub fn new(server_url: &str, local_port: u16, remote_host: &str, remote_port: u16) -> Self {
        Self {
            server_url: server_url.to_string(),
            ws_url: to_websocket_url(server_url),
            local_port,
            remote_host: remote_host.to_string(),
            remote_port,
        }
    }

    /// `tcp://127.0.0.1:<local>:<host>:<remote>`
    pub fn forward_rule(&self) -> String {
        format!(
            "tcp://{}:{}:{}:{}",
            LOCAL_BIND, self.local_port, self.remote_host, self.remote_port
        )
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "client".to_string(),
            "-L".to_string(),
            self.forward_rule(),
            self.ws_url.clone(),
        ]
    }

    /// Printable command line for status output.
    pub fn command_line(&self, binary: &str) -> String {
        format!("{} {}", binary, self.args().join(" "))
    }

    pub fn remote_target(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_becomes_ws() {
        assert_eq!(to_websocket_url("http://example.com"), "ws://example.com");
        assert_eq!(
            to_websocket_url("http://example.com:8080/tunnel?x=1"),
            "ws://example.com:8080/tunnel?x=1"
        );
    }

    #[test]
    fn test_https_becomes_wss() {
        assert_eq!(to_websocket_url("https://db.example.com"), "wss://db.example.com");
        assert_eq!(
            to_websocket_url("https://db.example.com:443/path"),
            "wss://db.example.com:443/path"
        );
    }

    #[test]
    fn test_other_schemes_pass_through() {
        for url in [
            "ws://example.com",
            "wss://example.com",
            "ftp://example.com",
            "HTTP://example.com",
            "example.com:8080",
            "",
        ] {
            assert_eq!(to_websocket_url(url), url);
        }
    }

    #[test]
    fn test_plan_builds_forward_rule() {
        let plan = TunnelPlan::new("https://db.example.com", 5433, "10.0.0.5", 5432);

        assert_eq!(plan.ws_url, "wss://db.example.com");
        assert_eq!(plan.forward_rule(), "tcp://127.0.0.1:5433:10.0.0.5:5432");
        assert_eq!(
            plan.args(),
            vec![
                "client",
                "-L",
                "tcp://127.0.0.1:5433:10.0.0.5:5432",
                "wss://db.example.com"
            ]
        );
        assert_eq!(plan.remote_target(), "10.0.0.5:5432");
    }

    #[test]
    fn test_command_line() {
        let plan = TunnelPlan::new("http://localhost:8080", DEFAULT_PORT, DEFAULT_REMOTE_HOST, DEFAULT_PORT);

        assert_eq!(
            plan.command_line(DEFAULT_BINARY),
            "wstunnel client -L tcp://127.0.0.1:5432:localhost:5432 ws://localhost:8080"
        );
    }
}
