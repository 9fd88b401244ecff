//! Owner lookup by reading the kernel socket tables under `/proc`.
//!
//! Needs no external tools. Only sockets whose owning process we may
//! inspect (same user, or root) can be attributed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::domain::Discovery;
use crate::error::{Error, Result};
use crate::ports::IntrospectionBackend;

/// TCP state code for LISTEN in `/proc/net/tcp`.
const TCP_LISTEN: &str = "0A";

/// Socket tables scanned, IPv4 and IPv6.
const TCP_TABLES: &[&str] = &["net/tcp", "net/tcp6"];

/// Lists listening PIDs from `/proc/net/tcp*` and `/proc/<pid>/fd`.
pub struct ProcFsBackend {
    root: PathBuf,
}

impl ProcFsBackend {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Use a different procfs mount (for testing).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Inodes of LISTEN sockets bound to `port` in one socket table.
    ///
    /// Expected format (header line first):
    /// ```text
    ///   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
    ///    0: 0100007F:1F40 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 123456 1 ...
    /// ```
    pub(crate) fn parse_tcp_table(table: &str, port: u16) -> HashSet<u64> {
        let mut inodes = HashSet::new();

        for line in table.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN {
                continue;
            }

            let Some((_, port_hex)) = fields[1].rsplit_once(':') else {
                continue;
            };
            match u16::from_str_radix(port_hex, 16) {
                Ok(p) if p == port => {}
                _ => continue,
            }

            match fields[9].parse::<u64>() {
                Ok(inode) if inode != 0 => {
                    inodes.insert(inode);
                }
                _ => continue,
            }
        }

        inodes
    }

    /// Inode from an fd link target such as `socket:[123456]`.
    pub(crate) fn socket_inode(link: &Path) -> Option<u64> {
        let target = link.to_str()?;
        target
            .strip_prefix("socket:[")?
            .strip_suffix(']')?
            .parse()
            .ok()
    }

    /// PIDs holding any of `inodes` open. Unreadable processes are skipped.
    fn pids_holding(root: &Path, inodes: &HashSet<u64>) -> Vec<u32> {
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };

            let holds = fds.flatten().any(|fd| {
                std::fs::read_link(fd.path())
                    .ok()
                    .and_then(|link| Self::socket_inode(&link))
                    .is_some_and(|inode| inodes.contains(&inode))
            });
            if holds {
                pids.push(pid);
            }
        }

        pids
    }
}

impl Default for ProcFsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrospectionBackend for ProcFsBackend {
    fn facility(&self) -> Discovery {
        Discovery::ProcFs
    }

    async fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        let mut inodes = HashSet::new();
        let mut readable = false;

        for table in TCP_TABLES {
            if let Ok(content) = tokio::fs::read_to_string(self.root.join(table)).await {
                readable = true;
                inodes.extend(Self::parse_tcp_table(&content, port));
            }
        }

        if !readable {
            return Err(Error::IntrospectionUnavailable {
                facility: "procfs",
                reason: format!("no socket tables under {}", self.root.display()),
            });
        }
        if inodes.is_empty() {
            return Ok(Vec::new());
        }

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::pids_holding(&root, &inodes))
            .await
            .map_err(|e| Error::IntrospectionUnavailable {
                facility: "procfs",
                reason: format!("fd scan aborted: {}", e),
            })
    }
}
