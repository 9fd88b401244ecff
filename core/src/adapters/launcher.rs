//! Detached service launcher.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::PortSpec;
use crate::error::{Error, Result};

/// Where a launched service's stdout and stderr go.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OutputSink {
    /// `/dev/null`
    #[default]
    Discard,
    /// Appended to this file, created if missing.
    File(PathBuf),
}

impl OutputSink {
    /// Open the sink as a (stdout, stderr) pair.
    fn open(&self) -> std::io::Result<(Stdio, Stdio)> {
        match self {
            OutputSink::Discard => Ok((Stdio::null(), Stdio::null())),
            OutputSink::File(path) => {
                let file: File = OpenOptions::new().create(true).append(true).open(path)?;
                let err = file.try_clone()?;
                Ok((Stdio::from(file), Stdio::from(err)))
            }
        }
    }
}

impl FromStr for OutputSink {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(Error::Config("output sink must not be empty".to_string())),
            "discard" | "null" | "/dev/null" => Ok(OutputSink::Discard),
            path => Ok(OutputSink::File(PathBuf::from(path))),
        }
    }
}

impl TryFrom<String> for OutputSink {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<OutputSink> for String {
    fn from(sink: OutputSink) -> Self {
        sink.to_string()
    }
}

impl fmt::Display for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSink::Discard => f.write_str("discard"),
            OutputSink::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The service to start: an explicit program, arguments and environment.
///
/// `{host}` and `{port}` inside arguments are replaced with the acquired
/// address. The child also gets `HOST` and `PORT` in its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ServiceCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        }
    }

    /// Build from an argv list; the first element is the program.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Config("no service command given".to_string()))?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Arguments with `{host}` and `{port}` filled in from `spec`.
    pub fn render_args(&self, spec: &PortSpec) -> Vec<String> {
        let port = spec.port().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{host}", spec.host()).replace("{port}", &port))
            .collect()
    }
}

/// Starts services detached from the invoking session.
#[derive(Debug, Clone, Default)]
pub struct ServiceLauncher {
    sink: OutputSink,
}

impl ServiceLauncher {
    pub fn new(sink: OutputSink) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    /// Spawn `command` bound to `spec` and return its PID without waiting.
    ///
    /// On Unix the child runs in a new session (`setsid`), so it outlives
    /// this process and its terminal. Any failure to start, including an
    /// unopenable log file, is returned as [`Error::Spawn`].
    pub fn start(&self, spec: &PortSpec, command: &ServiceCommand) -> Result<u32> {
        let spawn_error = |source: std::io::Error| Error::Spawn {
            program: command.program.clone(),
            source,
        };

        let (stdout, stderr) = self.sink.open().map_err(spawn_error)?;

        let mut cmd = Command::new(&command.program);
        cmd.args(command.render_args(spec))
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("HOST", spec.host())
            .env("PORT", spec.port().to_string())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Detach from our session and controlling terminal.
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid()
                        .map(|_| ())
                        .map_err(std::io::Error::from)
                });
            }
        }

        let child = cmd.spawn().map_err(spawn_error)?;
        let pid = child.id();
        info!(pid, program = %command.program, bind = %spec, sink = %self.sink, "Service started");

        // Dropping the handle neither waits for nor kills the child.
        drop(child);
        Ok(pid)
    }
}
