//! Records build metadata shown by `af-cli version`.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=AF_CLI_BUILD_TIME");

    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    if let Some(version) = command_output(&rustc, &["--version"]) {
        println!("cargo:rustc-env=AF_CLI_RUSTC_VERSION={}", version);
    }

    if let Some(commit) = command_output("git", &["rev-parse", "--short", "HEAD"]) {
        println!("cargo:rustc-env=AF_CLI_GIT_COMMIT={}", commit);
    }

    if let Ok(built) = env::var("AF_CLI_BUILD_TIME") {
        println!("cargo:rustc-env=AF_CLI_BUILD_TIME={}", built);
    }
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
