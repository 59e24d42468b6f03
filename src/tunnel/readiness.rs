//! Detection of the tunnel's local listener.
//!
//! The listener is considered up once `127.0.0.1:<port>` can no longer be
//! bound. The check socket sets `SO_REUSEADDR` and never listens, so it does
//! not take the port away from wstunnel. No connection is opened either, so
//! nothing is forwarded to the remote side.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::trace;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether something is listening on the local tunnel port.
pub fn listener_up(port: u16) -> bool {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));

    let socket = match Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)) {
        Ok(socket) => socket,
        Err(err) => {
            trace!(%err, "Could not create check socket");
            return false;
        }
    };

    #[cfg(unix)]
    if let Err(err) = socket.set_reuse_address(true) {
        trace!(%err, "Could not set SO_REUSEADDR on check socket");
    }

    match socket.bind(&addr.into()) {
        Ok(()) => false,
        Err(err) => {
            trace!(port, %err, "Local port not bindable");
            err.kind() == ErrorKind::AddrInUse
        }
    }
}

/// Resolves once the local listener on `port` is detected.
pub async fn wait_for_listener(port: u16, poll: Duration) {
    let mut interval = tokio::time::interval(poll);
    loop {
        interval.tick().await;
        if listener_up(port) {
            return;
        }
    }
}
