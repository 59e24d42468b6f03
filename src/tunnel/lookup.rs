//! `which`-style lookup of executables.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Locate `program` on the current `PATH`.
///
/// A name containing a path separator is checked as-is instead.
pub fn locate(program: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH").unwrap_or_default();
    let found = locate_in(program, &path_var);
    debug!(program, found = ?found, "Looked up executable");
    found
}

pub fn locate_in(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }

    env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates(&dir, program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(not(windows))]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program)]
}

#[cfg(windows)]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    let mut found = vec![dir.join(program)];
    if Path::new(program).extension().is_none() {
        found.push(dir.join(format!("{}.exe", program)));
    }
    found
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn write_file(path: &Path, mode: u32) {
        fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_locate_on_path() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write_file(&second.path().join("wstunnel"), 0o755);

        let path_var = env::join_paths([first.path(), second.path()]).unwrap();

        assert_eq!(
            locate_in("wstunnel", &path_var),
            Some(second.path().join("wstunnel"))
        );
    }

    #[test]
    fn test_first_match_wins() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write_file(&first.path().join("wstunnel"), 0o755);
        write_file(&second.path().join("wstunnel"), 0o755);

        let path_var = env::join_paths([first.path(), second.path()]).unwrap();

        assert_eq!(
            locate_in("wstunnel", &path_var),
            Some(first.path().join("wstunnel"))
        );
    }

    #[test]
    fn test_non_executable_is_skipped() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("wstunnel"), 0o644);
        fs::create_dir(dir.path().join("psql")).unwrap();

        let path_var = env::join_paths([dir.path()]).unwrap();

        assert_eq!(locate_in("wstunnel", &path_var), None);
        assert_eq!(locate_in("psql", &path_var), None);
    }

    #[test]
    fn test_missing_program() {
        let dir = tempdir().unwrap();
        let path_var = env::join_paths([dir.path()]).unwrap();

        assert_eq!(locate_in("wstunnel", &path_var), None);
        assert_eq!(locate_in("", &path_var), None);
        assert_eq!(locate_in("wstunnel", OsStr::new("")), None);
    }

    #[test]
    fn test_explicit_path() {
        let dir = tempdir().unwrap();
        let binary = dir.path().join("wstunnel-custom");
        write_file(&binary, 0o755);

        let empty = OsStr::new("");
        assert_eq!(locate_in(binary.to_str().unwrap(), empty), Some(binary.clone()));
        assert_eq!(
            locate_in(dir.path().join("nope").to_str().unwrap(), empty),
            None
        );
    }
}
