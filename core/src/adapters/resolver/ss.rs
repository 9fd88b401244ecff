//! Owner lookup using `ss` (iproute2).

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use super::utils::split_host_port;
use crate::adapters::exec::{find_executable, run_tool};
use crate::domain::Discovery;
use crate::error::{Error, Result};
use crate::ports::IntrospectionBackend;

/// Default paths to search for ss.
const SS_PATHS: &[&str] = &["/usr/sbin/ss", "/usr/bin/ss", "/sbin/ss", "/bin/ss"];

fn pid_regex() -> &'static Regex {
    static PID_RE: OnceLock<Regex> = OnceLock::new();
    PID_RE.get_or_init(|| Regex::new(r"pid=(\d+)").expect("static pid pattern"))
}

/// Lists listening PIDs with `ss -Htlnp`.
pub struct SsBackend {
    ss_path: Option<PathBuf>,
}

impl SsBackend {
    /// Create a backend, searching the usual locations for ss.
    pub fn new() -> Self {
        Self {
            ss_path: find_executable("ss", SS_PATHS),
        }
    }

    /// Create a backend with a custom ss path (`None` = unavailable).
    pub fn with_path(ss_path: Option<PathBuf>) -> Self {
        Self { ss_path }
    }

    /// Parse ss output into the PIDs listening on `port`.
    ///
    /// Expected ss output format:
    /// ```text
    /// LISTEN     0          4096           [::ffff:127.0.0.1]:63342                    *:*         users:(("rustrover",pid=53561,fd=54))
    /// ```
    ///
    /// A socket shared by several processes lists each of them in the
    /// `users:` column. Rows without a process column (sockets owned by other
    /// users when not root) or with an unparseable address are skipped.
    pub(crate) fn parse_ss_output(output: &str, port: u16) -> Vec<u32> {
        let mut pids = Vec::new();

        for line in output.lines() {
            // Parse columns: [State] [Recv-Q] [Send-Q] [Local Address:Port] [Peer Address:Port] [Process]
            let components: Vec<&str> = line.split_whitespace().collect();
            if components.len() < 6 {
                continue;
            }

            let Some((_, local_port)) = split_host_port(components[3]) else {
                continue;
            };
            if local_port != port {
                continue;
            }

            let process = components[5..].join(" ");
            pids.extend(
                pid_regex()
                    .captures_iter(&process)
                    .filter_map(|caps| caps[1].parse::<u32>().ok()),
            );
        }

        pids
    }
}

impl Default for SsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrospectionBackend for SsBackend {
    fn facility(&self) -> Discovery {
        Discovery::SocketStats
    }

    /// Executes: `ss -Htlnp`
    ///
    /// Flags explained:
    /// -H, --no-header     Suppress header line
    /// -t, --tcp           display only TCP sockets
    /// -l, --listening     display listening sockets
    /// -n, --numeric       don't resolve service names
    /// -p, --processes     show process using socket
    async fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        let ss = self
            .ss_path
            .as_ref()
            .ok_or_else(|| Error::IntrospectionUnavailable {
                facility: "ss",
                reason: "ss not found".to_string(),
            })?;

        let output = run_tool(ss, &["-Htlnp".to_string()])
            .await
            .map_err(|e| Error::IntrospectionUnavailable {
                facility: "ss",
                reason: e.to_string(),
            })?;

        if !output.success {
            return Err(Error::IntrospectionUnavailable {
                facility: "ss",
                reason: format!("ss failed: {}", output.stderr.trim()),
            });
        }

        Ok(Self::parse_ss_output(&output.stdout, port))
    }
}
