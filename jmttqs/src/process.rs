use std::time::{
    Duration,
    Instant,
};
use tokio::process::{
    Child,
    Command,
};

use crate::error::RunnerError;

/// A live external process, spawned as the leader of its own process
/// group so that the entire subtree can be signalled as a unit.
///
/// Owned for the duration of one execution; nothing here touches the
/// task record or the cache.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: i64,
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub exit_status: i64,
    pub elapsed: Duration,
}

impl ProcessHandle {
    /// Spawn the command; the pid is readable immediately, before the
    /// exit status is awaited, so callers can register it while the
    /// process is still running.
    ///
    /// A spawn failure surfaces as `RunnerError::Launch`, never as an
    /// exit status.
    pub fn spawn(command: &mut Command) -> Result<Self, RunnerError> {
        #[cfg(unix)]
        command.process_group(0);
        let child = command.spawn().map_err(RunnerError::Launch)?;
        let pid = child.id()
            .map(i64::from)
            .ok_or_else(|| RunnerError::Launch(std::io::Error::new(
                std::io::ErrorKind::Other,
                "process exited before its pid could be read",
            )))?;
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> i64 {
        self.pid
    }

    /// Wait for the process to exit, bounded by the optional timeout.
    /// On expiry the process group is terminated, the leader reaped,
    /// and a timeout-specific error raised.
    pub async fn wait(
        mut self,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome, RunnerError> {
        let started = Instant::now();
        let exit_status = match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.child.wait()).await {
                    Ok(exit_status) => exit_status?,
                    Err(_) => {
                        if let Err(e) = terminate_group(self.pid) {
                            log::warn!(
                                "group termination of timed out pid {} failed: {e}",
                                self.pid,
                            );
                        }
                        // the leader is reaped regardless
                        let _ = self.child.kill().await;
                        return Err(RunnerError::Timeout {
                            pid: self.pid,
                            timeout: limit.as_secs(),
                        });
                    }
                }
            }
            None => self.child.wait().await?,
        };
        Ok(ProcessOutcome {
            // no exit code means termination by signal
            exit_status: exit_status.code().map(i64::from).unwrap_or(-1),
            elapsed: started.elapsed(),
        })
    }
}

/// SIGTERM the process group led by `pid`.  A group that is already
/// gone reports success, since the desired end state holds.
#[cfg(unix)]
pub fn terminate_group(pid: i64) -> Result<(), RunnerError> {
    use nix::{
        errno::Errno,
        sys::signal::{
            Signal,
            killpg,
        },
        unistd::Pid,
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(RunnerError::Signal { pid, errno }),
    }
}

#[cfg(not(unix))]
pub fn terminate_group(_pid: i64) -> Result<(), RunnerError> {
    Err(RunnerError::SignalUnsupported)
}

/// Whether a process with the given pid currently exists.
#[cfg(unix)]
pub fn process_exists(pid: i64) -> bool {
    use nix::{
        sys::signal::kill,
        unistd::Pid,
    };
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn process_exists(_pid: i64) -> bool {
    false
}

/// Read a captured stream back from disk, bounded so a chatty process
/// cannot balloon the task record.
pub fn read_capped(path: &std::path::Path) -> Result<String, std::io::Error> {
    use std::io::Read;
    let mut buf = Vec::new();
    std::fs::File::open(path)?
        .take(jmtcore::task::CAPTURE_LIMIT as u64)
        .read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
