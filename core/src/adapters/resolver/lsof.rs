//! Owner lookup using `lsof`.

use std::path::PathBuf;

use crate::adapters::exec::{find_executable, run_tool};
use crate::domain::Discovery;
use crate::error::{Error, Result};
use crate::ports::IntrospectionBackend;

/// Default paths to search for lsof.
const LSOF_PATHS: &[&str] = &["/usr/sbin/lsof", "/usr/bin/lsof", "/sbin/lsof", "/bin/lsof"];

/// Lists listening PIDs with lsof.
///
/// With [`LsofBackend::via_sudo`] lsof runs as `sudo -n lsof ...`, which can
/// see sockets owned by other users.
pub struct LsofBackend {
    lsof_path: Option<PathBuf>,
    sudo_path: Option<PathBuf>,
}

impl LsofBackend {
    /// Create a backend, searching the usual locations for lsof.
    pub fn new() -> Self {
        Self::with_path(find_executable("lsof", LSOF_PATHS))
    }

    /// Create a backend with a custom lsof path (`None` = unavailable).
    pub fn with_path(lsof_path: Option<PathBuf>) -> Self {
        Self {
            lsof_path,
            sudo_path: None,
        }
    }

    /// Run lsof through `sudo -n`.
    pub fn via_sudo(mut self, sudo_path: PathBuf) -> Self {
        self.sudo_path = Some(sudo_path);
        self
    }

    pub fn is_elevated(&self) -> bool {
        self.sudo_path.is_some()
    }

    /// Whether stderr is sudo's own complaint rather than lsof's.
    pub(crate) fn refused_by_sudo(stderr: &str) -> bool {
        stderr
            .lines()
            .any(|line| line.trim_start().starts_with("sudo:"))
    }

    /// Parse `lsof -t` output: one PID per line.
    ///
    /// Lines that are not a bare PID are skipped.
    pub(crate) fn parse_pids(output: &str) -> Vec<u32> {
        output
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect()
    }
}

impl Default for LsofBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrospectionBackend for LsofBackend {
    fn facility(&self) -> Discovery {
        Discovery::Lsof
    }

    /// Executes: `lsof -nP -t -iTCP:<port> -sTCP:LISTEN`
    ///
    /// Flags:
    /// - -n, -P: no host or service name lookups
    /// - -t: terse output (PIDs only)
    /// - -iTCP:<port> -sTCP:LISTEN: listening TCP sockets on the port
    async fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        let lsof = self
            .lsof_path
            .as_ref()
            .ok_or_else(|| Error::IntrospectionUnavailable {
                facility: "lsof",
                reason: "lsof not found".to_string(),
            })?;

        let mut args = Vec::new();
        let program = match &self.sudo_path {
            Some(sudo) => {
                args.push("-n".to_string());
                args.push(lsof.display().to_string());
                sudo
            }
            None => lsof,
        };
        args.extend([
            "-nP".to_string(),
            "-t".to_string(),
            format!("-iTCP:{}", port),
            "-sTCP:LISTEN".to_string(),
        ]);
        let output = run_tool(program, &args)
            .await
            .map_err(|e| Error::IntrospectionUnavailable {
                facility: "lsof",
                reason: e.to_string(),
            })?;

        // sudo also exits 1 when it refuses to run lsof
        if self.sudo_path.is_some() && Self::refused_by_sudo(&output.stderr) {
            return Err(Error::IntrospectionUnavailable {
                facility: "lsof",
                reason: output.stderr.trim().to_string(),
            });
        }

        // lsof returns exit code 1 when no processes match, which is not an error
        if !output.success && !(output.code == Some(1) && output.stdout.trim().is_empty()) {
            return Err(Error::IntrospectionUnavailable {
                facility: "lsof",
                reason: format!("lsof failed: {}", output.stderr.trim()),
            });
        }

        Ok(Self::parse_pids(&output.stdout))
    }
}
