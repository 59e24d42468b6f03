//! Tagged status lines printed to the terminal.
//!
//! Tags are colored only when stdout is a terminal and `NO_COLOR` is unset.

use std::fmt::Display;
use std::io::IsTerminal;
use std::sync::OnceLock;

use crossterm::style::{Color, Stylize};

static COLORS: OnceLock<bool> = OnceLock::new();

fn colors_enabled() -> bool {
    *COLORS.get_or_init(|| {
        std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
    })
}

fn tag(label: &str, color: Color) -> String {
    if colors_enabled() {
        label.with(color).to_string()
    } else {
        label.to_string()
    }
}

/// `[OK] msg`
pub fn ok(msg: impl Display) {
    println!("{} {}", tag("[OK]", Color::Green), msg);
}

/// `[->] msg`
pub fn detail(msg: impl Display) {
    println!("{} {}", tag("[->]", Color::Cyan), msg);
}

/// `[!] msg`
pub fn notice(msg: impl Display) {
    println!("{} {}", tag("[!]", Color::Yellow), msg);
}

/// `[INFO] msg`
pub fn info(msg: impl Display) {
    println!("{} {}", tag("[INFO]", Color::Yellow), msg);
}

/// `[WARN] msg`
pub fn warn(msg: impl Display) {
    println!("{} {}", tag("[WARN]", Color::Yellow), msg);
}

/// `[ERROR] msg` on stderr
pub fn error(msg: impl Display) {
    eprintln!("{} {}", tag("[ERROR]", Color::Red), msg);
}

/// Indented plain line
pub fn indented(msg: impl Display) {
    println!("  {}", msg);
}

pub fn blank() {
    println!();
}

/// Installation guidance for a missing `wstunnel`.
pub fn install_hint() {
    info("Install wstunnel:");
    indented("Linux: wget https://github.com/erebe/wstunnel/releases/latest/download/wstunnel-linux-amd64");
    indented("macOS: brew install wstunnel");
}
