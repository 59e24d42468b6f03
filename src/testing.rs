//! Helpers shared by unit tests.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TEST_SETUP: Once = Once::new();

/// Route tracing output through the test harness once per process.
pub fn init_test_logging() {
    TEST_SETUP.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Write an executable shell script named `name` into `dir`.
///
/// The script is written under a temporary name and renamed into place, so
/// its final path is never seen half-written.
pub fn fake_binary(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    init_test_logging();

    let path = dir.path().join(name);
    let staging = dir.path().join(format!(".{}.partial", name));
    {
        let mut file = fs::File::create(&staging).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", body).unwrap();
        file.sync_all().unwrap();
    }
    fs::set_permissions(&staging, fs::Permissions::from_mode(0o755)).unwrap();
    fs::rename(&staging, &path).unwrap();
    path
}

/// Wait until a fake binary has written its pid to `path`.
pub async fn wait_for_pid(path: &Path) -> libc::pid_t {
    loop {
        if let Some(pid) = fs::read_to_string(path)
            .ok()
            .and_then(|text| text.trim().parse().ok())
        {
            return pid;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
