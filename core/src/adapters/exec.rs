//! Locating and running host tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Upper bound for a single introspection or elevation command.
pub(crate) const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default paths to search for sudo.
const SUDO_PATHS: &[&str] = &["/usr/bin/sudo", "/bin/sudo", "/usr/local/bin/sudo"];

/// Locates sudo, if installed.
pub(crate) fn find_sudo() -> Option<PathBuf> {
    find_executable("sudo", SUDO_PATHS)
}

#[cfg(unix)]
pub(crate) fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub(crate) fn running_as_root() -> bool {
    false
}

/// Finds an executable in the given paths, then on `PATH`.
pub(crate) fn find_executable(name: &str, paths: &[&str]) -> Option<PathBuf> {
    for path in paths {
        let path_buf = PathBuf::from(path);
        if path_buf.is_file() {
            return Some(path_buf);
        }
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Captured result of a finished tool invocation.
pub(crate) struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args...` with piped output and the tool timeout.
///
/// Output is decoded lossily; garbled bytes become replacement characters
/// and are left for the parsers to skip.
pub(crate) async fn run_tool(program: &Path, args: &[String]) -> Result<ToolOutput> {
    let result = timeout(TOOL_TIMEOUT, async {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
    })
    .await;

    match result {
        Ok(Ok(output)) => Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(Error::CommandFailed(format!(
            "failed to run {}: {}",
            program.display(),
            e
        ))),
        Err(_) => Err(Error::CommandFailed(format!(
            "{} timed out after {}s",
            program.display(),
            TOOL_TIMEOUT.as_secs()
        ))),
    }
}
