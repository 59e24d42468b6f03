//! Shutdown context fed by OS signals.
//!
//! A [`Shutdown`] owns the signal listener task and the token it cancels.
//! Dropping it tears the listener down.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Which signals request a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signals {
    /// SIGINT (Ctrl+C) and SIGTERM
    InterruptAndTerminate,
    /// SIGTERM only; Ctrl+C is left to a foreground child
    Terminate,
}

/// How long a child killed by SIGINT or SIGTERM waits for the matching shutdown request.
///
/// A terminal delivers Ctrl+C to the whole foreground process group, so the
/// child can die before the listener task has cancelled the token.
pub const SIGNAL_SETTLE: Duration = Duration::from_millis(250);

pub struct Shutdown {
    token: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl Shutdown {
    /// Register handlers for `signals` and start listening.
    ///
    /// Handlers are registered before returning so registration errors surface here.
    pub fn listen(signals: Signals) -> io::Result<Self> {
        let token = CancellationToken::new();
        let listener = spawn_listener(signals, token.clone())?;
        debug!(?signals, "Signal handlers registered");

        Ok(Self {
            token,
            listener: Some(listener),
        })
    }

    /// A context no signal is routed to; cancel it through its token.
    #[cfg(test)]
    pub fn manual() -> Self {
        Self {
            token: CancellationToken::new(),
            listener: None,
        }
    }

    /// Switch the listened-for signals, keeping the same token.
    ///
    /// A manual context stays manual.
    pub fn narrow(mut self, signals: Signals) -> io::Result<Self> {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            self.listener = Some(spawn_listener(signals, self.token.clone())?);
            debug!(?signals, "Signal handlers replaced");
        }
        Ok(self)
    }

    #[cfg(test)]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once a shutdown was requested.
    pub async fn requested(&self) {
        self.token.cancelled().await
    }

    /// Whether a child's unsuccessful `status` is part of a requested shutdown.
    ///
    /// True when a shutdown is already pending, or when the child died from
    /// SIGINT/SIGTERM and the request arrives within [`SIGNAL_SETTLE`].
    pub async fn explains(&self, status: &ExitStatus) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        if !killed_by_shutdown_signal(status) {
            return false;
        }
        let settled = tokio::time::timeout(SIGNAL_SETTLE, self.requested())
            .await
            .is_ok();
        debug!(%status, settled, "Child killed by a shutdown signal");
        settled
    }
}

#[cfg(unix)]
fn killed_by_shutdown_signal(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;

    matches!(status.signal(), Some(libc::SIGINT) | Some(libc::SIGTERM))
}

#[cfg(not(unix))]
fn killed_by_shutdown_signal(_status: &ExitStatus) -> bool {
    false
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(unix)]
fn spawn_listener(signals: Signals, token: CancellationToken) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = match signals {
        Signals::InterruptAndTerminate => Some(signal(SignalKind::interrupt())?),
        Signals::Terminate => None,
    };

    Ok(tokio::spawn(async move {
        let interrupted = async {
            match interrupt.as_mut() {
                Some(interrupt) => interrupt.recv().await,
                None => std::future::pending::<Option<()>>().await,
            }
        };

        tokio::select! {
            _ = interrupted => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
        token.cancel();
    }))
}

#[cfg(not(unix))]
fn spawn_listener(signals: Signals, token: CancellationToken) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match signals {
            Signals::InterruptAndTerminate => {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C");
                    token.cancel();
                }
            }
            Signals::Terminate => std::future::pending::<()>().await,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    // Raised signals reach every listener in the test process.
    static SIGNAL_LOCK: Mutex<()> = Mutex::const_new(());

    #[tokio::test]
    async fn test_manual_shutdown() {
        let shutdown = Shutdown::manual();
        assert!(!shutdown.token().is_cancelled());

        shutdown.token().cancel();

        tokio::time::timeout(Duration::from_secs(1), shutdown.requested())
            .await
            .expect("shutdown should resolve after cancel");
        assert!(shutdown.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_narrow_keeps_token() {
        let shutdown = Shutdown::manual();
        let token = shutdown.token().clone();

        let shutdown = shutdown.narrow(Signals::Terminate).unwrap();
        token.cancel();

        assert!(shutdown.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_listen_and_drop() {
        let _guard = SIGNAL_LOCK.lock().await;
        let shutdown = Shutdown::listen(Signals::InterruptAndTerminate).unwrap();
        assert!(!shutdown.token().is_cancelled());

        let shutdown = shutdown.narrow(Signals::Terminate).unwrap();
        assert!(shutdown.listener.is_some());
        drop(shutdown);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_requests_shutdown() {
        let _guard = SIGNAL_LOCK.lock().await;
        let shutdown = Shutdown::listen(Signals::Terminate).unwrap();

        unsafe { libc::raise(libc::SIGTERM) };

        tokio::time::timeout(Duration::from_secs(2), shutdown.requested())
            .await
            .expect("SIGTERM should request a shutdown");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigint_requests_shutdown() {
        let _guard = SIGNAL_LOCK.lock().await;
        let shutdown = Shutdown::listen(Signals::InterruptAndTerminate).unwrap();

        unsafe { libc::raise(libc::SIGINT) };

        tokio::time::timeout(Duration::from_secs(2), shutdown.requested())
            .await
            .expect("SIGINT should request a shutdown");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_narrow_ignores_sigint() {
        let _guard = SIGNAL_LOCK.lock().await;
        let shutdown = Shutdown::listen(Signals::InterruptAndTerminate)
            .unwrap()
            .narrow(Signals::Terminate)
            .unwrap();
        // Let the aborted listener be torn down before signalling.
        tokio::time::sleep(Duration::from_millis(20)).await;

        unsafe { libc::raise(libc::SIGINT) };
        let early = tokio::time::timeout(Duration::from_millis(200), shutdown.requested()).await;
        assert!(early.is_err(), "SIGINT must not end a narrowed context");

        unsafe { libc::raise(libc::SIGTERM) };
        tokio::time::timeout(Duration::from_secs(2), shutdown.requested())
            .await
            .expect("SIGTERM should still request a shutdown");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_explains_pending_shutdown() {
        use std::os::unix::process::ExitStatusExt;

        let shutdown = Shutdown::manual();
        let failed = ExitStatus::from_raw(3 << 8);
        assert!(!shutdown.explains(&failed).await);

        shutdown.token().cancel();
        assert!(shutdown.explains(&failed).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_explains_signal_death_within_settle() {
        use std::os::unix::process::ExitStatusExt;

        let shutdown = Shutdown::manual();
        let interrupted = ExitStatus::from_raw(libc::SIGINT);
        let token = shutdown.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        assert!(shutdown.explains(&interrupted).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_death_without_shutdown_is_unexplained() {
        use std::os::unix::process::ExitStatusExt;

        let shutdown = Shutdown::manual();

        assert!(!shutdown.explains(&ExitStatus::from_raw(libc::SIGTERM)).await);
        assert!(!shutdown.explains(&ExitStatus::from_raw(libc::SIGKILL)).await);
    }
}
