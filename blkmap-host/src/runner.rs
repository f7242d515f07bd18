// SPDX-License-Identifier: MIT

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{HostError, HostResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Fed to the process, then stdin is closed.
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl ToolRequest {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_stdin<S: Into<String>>(mut self, stdin: S) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero exit into an error.
    pub fn check(self, tool: &str) -> HostResult<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(HostError::ExitStatus {
            tool: tool.to_string(),
            code: self.code,
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        })
    }

    pub fn stdout_str(&self, tool: &str) -> HostResult<&str> {
        std::str::from_utf8(&self.stdout).map_err(|_| HostError::Utf8 {
            tool: tool.to_string(),
        })
    }
}

/// Everything blkmap needs from the host system.
///
/// `SystemHost` spawns real processes; tests substitute a scripted
/// implementation.
pub trait HostOps: Sync {
    fn run(&self, request: &ToolRequest) -> HostResult<ToolOutput>;

    /// Inode number of the directory entry itself (symlinks are not followed,
    /// matching `find -inum`).
    fn inode_of(&self, path: &Path) -> HostResult<u64> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            std::fs::symlink_metadata(path)
                .map(|m| m.ino())
                .map_err(|e| HostError::Stat {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            Err(HostError::Unsupported("inode numbers"))
        }
    }
}

/// Runs tools as child processes of blkmap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl HostOps for SystemHost {
    fn run(&self, request: &ToolRequest) -> HostResult<ToolOutput> {
        run_process(request)
    }
}

/// Kills and reaps the child on every exit path that did not wait for it.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn wait_until(&mut self, deadline: Instant, tool: &str) -> HostResult<Option<ExitStatus>> {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.reaped = true;
                    return Ok(Some(status));
                }
                Ok(None) if Instant::now() >= deadline => return Ok(None),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(HostError::Io {
                        tool: tool.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

/// Writes `input` then closes the pipe. A child that exits without reading
/// everything is not an error; its exit status tells the story.
fn feed(mut pipe: ChildStdin, input: String) -> JoinHandle<std::io::Result<()>> {
    thread::spawn(move || {
        match pipe.write_all(input.as_bytes()).and_then(|_| pipe.flush()) {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    })
}

fn join_pipe(
    handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    tool: &str,
) -> HostResult<Vec<u8>> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    let io_err = |reason: String| HostError::Io {
        tool: tool.to_string(),
        reason,
    };
    handle
        .join()
        .map_err(|_| io_err("pipe reader panicked".into()))?
        .map_err(|e| io_err(e.to_string()))
}

fn run_process(request: &ToolRequest) -> HostResult<ToolOutput> {
    let tool = request.program.as_str();
    log::debug!("exec: {}", request.command_line());

    let child = Command::new(tool)
        .args(&request.args)
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HostError::Spawn {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;

    let mut guard = ChildGuard {
        child,
        reaped: false,
    };

    let stdout = guard.child.stdout.take().map(drain);
    let stderr = guard.child.stderr.take().map(drain);

    let stdin = match (guard.child.stdin.take(), request.stdin.clone()) {
        (Some(pipe), Some(input)) => Some(feed(pipe, input)),
        _ => None,
    };

    let deadline = Instant::now() + request.timeout;
    let Some(status) = guard.wait_until(deadline, tool)? else {
        // The guard kills and reaps the child; pipe threads end with it.
        return Err(HostError::Timeout {
            tool: tool.to_string(),
            secs: request.timeout.as_secs(),
        });
    };

    if let Some(handle) = stdin {
        handle
            .join()
            .map_err(|_| "pipe writer panicked".to_string())
            .and_then(|r| r.map_err(|e| e.to_string()))
            .map_err(|reason| HostError::Io {
                tool: tool.to_string(),
                reason,
            })?;
    }

    Ok(ToolOutput {
        stdout: join_pipe(stdout, tool)?,
        stderr: join_pipe(stderr, tool)?,
        code: status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_args() {
        let req = ToolRequest::new("fsdb", crate::args!["-r", "/dev/ad0s1d"]);
        assert_eq!(req.command_line(), "fsdb -r /dev/ad0s1d");
        assert_eq!(req.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn check_maps_exit_code() {
        let out = ToolOutput {
            code: Some(3),
            stderr: b"boom".to_vec(),
            ..Default::default()
        };
        assert!(matches!(
            out.check("find"),
            Err(HostError::ExitStatus { code: Some(3), .. })
        ));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let req = ToolRequest::new("blkmap-definitely-not-a-tool", vec![]);
        assert!(matches!(
            SystemHost.run(&req),
            Err(HostError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn feeds_stdin_and_captures_stdout() {
        let req = ToolRequest::new("cat", vec![]).with_stdin("findblk 1 2\nexit\n");
        let out = SystemHost.run(&req).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_str("cat").unwrap(), "findblk 1 2\nexit\n");
    }

    #[cfg(unix)]
    #[test]
    fn kills_on_timeout() {
        let req = ToolRequest::new("sleep", crate::args![5])
            .with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        assert!(matches!(
            SystemHost.run(&req),
            Err(HostError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_keeps_status_and_stderr() {
        let input = "findblk 1\n".repeat(100_000);
        let req = ToolRequest::new(
            "sh",
            crate::args!["-c", "echo 'cannot open /dev/ad9' >&2; exit 3"],
        )
        .with_stdin(input);
        let out = SystemHost.run(&req).unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stderr), "cannot open /dev/ad9\n");
    }

    #[cfg(unix)]
    #[test]
    fn timeout_covers_unread_stdin() {
        let req = ToolRequest::new("sleep", crate::args![5])
            .with_stdin("x".repeat(1 << 20))
            .with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        assert!(matches!(
            SystemHost.run(&req),
            Err(HostError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn inode_of_existing_file() {
        use std::os::unix::fs::MetadataExt;
        let file = tempfile::NamedTempFile::new().unwrap();
        let expected = std::fs::metadata(file.path()).unwrap().ino();
        assert_eq!(SystemHost.inode_of(file.path()).unwrap(), expected);
        assert!(SystemHost.inode_of(Path::new("/nonexistent/blkmap")).is_err());
    }
}
