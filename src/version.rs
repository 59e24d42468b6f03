//! Build and platform information for `af-cli version`.

use crate::output;

/// Static metadata captured at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_time: &'static str,
    pub rustc: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: option_env!("AF_CLI_GIT_COMMIT").unwrap_or("unknown"),
            build_time: option_env!("AF_CLI_BUILD_TIME").unwrap_or("unknown"),
            rustc: option_env!("AF_CLI_RUSTC_VERSION").unwrap_or("rustc (unknown version)"),
        }
    }

    pub fn label(&self) -> String {
        format!(
            "af-cli version {} (commit: {}, built: {})",
            self.version, self.git_commit, self.build_time
        )
    }

    pub fn runtime(&self) -> String {
        format!("Runtime: {}", self.rustc)
    }
}

pub fn platform() -> String {
    format!(
        "Platform: {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Print the three version lines.
pub fn report() {
    let info = BuildInfo::current();
    output::ok(info.label());
    output::detail(info.runtime());
    output::detail(platform());
}
