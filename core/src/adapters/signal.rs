//! Signal delivery to foreign processes.
//!
//! Normal privilege uses `kill(2)` directly. Elevated privilege runs
//! `sudo -n kill -s <SIG> <pid>`; `-n` makes sudo fail instead of prompting,
//! so a missing credential shows up as [`Error::ElevationUnavailable`].
//!
//! Everything here is destructive: a delivered SIGKILL cannot be taken back.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::adapters::exec::{find_sudo, run_tool, running_as_root};
use crate::domain::{Privilege, SignalKind};
use crate::error::{Error, Result};
use crate::ports::SignalSender;

/// Unix signal sender.
#[derive(Debug, Clone)]
pub struct UnixSignaller {
    sudo_path: Option<PathBuf>,
    is_root: bool,
}

impl UnixSignaller {
    /// Create a signaller, detecting root and looking for sudo.
    pub fn new() -> Self {
        Self {
            sudo_path: find_sudo(),
            is_root: running_as_root(),
        }
    }

    /// A signaller that never elevates.
    pub fn without_elevation() -> Self {
        Self {
            sudo_path: None,
            is_root: running_as_root(),
        }
    }

    /// Reject PIDs that `kill(2)` would treat as a process group or broadcast.
    fn target(pid: u32) -> Result<i32> {
        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => Ok(raw),
            _ => Err(Error::SignalDelivery {
                pid,
                reason: "invalid pid".to_string(),
            }),
        }
    }

    #[cfg(unix)]
    fn send_direct(&self, pid: u32, signal: SignalKind) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = Self::target(pid)?;
        let sig = match signal {
            SignalKind::Terminate => Signal::SIGTERM,
            SignalKind::Kill => Signal::SIGKILL,
        };

        debug!(pid, signal = %signal, "Sending signal to process");
        match kill(Pid::from_raw(raw), sig) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(Error::ProcessNotFound(pid)),
            Err(Errno::EPERM) => Err(Error::PermissionDenied(format!(
                "not allowed to send SIG{} to pid {}",
                signal, pid
            ))),
            Err(e) => Err(Error::SignalDelivery {
                pid,
                reason: e.desc().to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn send_direct(&self, _pid: u32, _signal: SignalKind) -> Result<()> {
        Err(Error::UnsupportedPlatform(
            "signal delivery needs a Unix host".to_string(),
        ))
    }

    async fn send_elevated(&self, pid: u32, signal: SignalKind) -> Result<()> {
        if self.is_root {
            return self.send_direct(pid, signal);
        }

        Self::target(pid)?;
        let sudo = self.sudo_path.as_ref().ok_or_else(|| {
            Error::ElevationUnavailable("sudo not found and not running as root".to_string())
        })?;

        debug!(pid, signal = %signal, "Sending signal with sudo");
        let args = vec![
            "-n".to_string(),
            "kill".to_string(),
            "-s".to_string(),
            signal.name().to_string(),
            pid.to_string(),
        ];
        let output = run_tool(sudo, &args).await?;
        if output.success {
            return Ok(());
        }

        Err(classify_sudo_failure(pid, &output.stderr))
    }
}

impl Default for UnixSignaller {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSender for UnixSignaller {
    async fn send(&self, pid: u32, signal: SignalKind, privilege: Privilege) -> Result<()> {
        let result = match privilege {
            Privilege::Normal => self.send_direct(pid, signal),
            Privilege::Elevated => self.send_elevated(pid, signal).await,
        };
        if let Err(e) = &result {
            warn!(pid, signal = %signal, privilege = %privilege, error = %e, "Signal not delivered");
        }
        result
    }

    fn can_elevate(&self) -> bool {
        self.is_root || self.sudo_path.is_some()
    }
}

/// Map `sudo -n kill` stderr onto the error taxonomy.
fn classify_sudo_failure(pid: u32, stderr: &str) -> Error {
    let stderr = stderr.trim();
    let lower = stderr.to_lowercase();

    if lower.contains("no such process") {
        return Error::ProcessNotFound(pid);
    }
    if lower.contains("password is required")
        || lower.contains("not in the sudoers")
        || lower.contains("not allowed to execute")
        || lower.contains("a terminal is required")
    {
        return Error::ElevationUnavailable(stderr.to_string());
    }
    if lower.contains("operation not permitted") || lower.contains("permission denied") {
        return Error::PermissionDenied(stderr.to_string());
    }

    Error::SignalDelivery {
        pid,
        reason: if stderr.is_empty() {
            "sudo kill failed".to_string()
        } else {
            stderr.to_string()
        },
    }
}
