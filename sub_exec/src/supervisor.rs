//! # Consumer process supervisor
//!
//! Owns the lifecycle of the subordinate consumer process (`sub_ctl`). The
//! supervisor spawns the consumer on enable, stops it on disable (graceful
//! signal first, hard kill if it does not exit in time), and detects a
//! consumer that died on its own so the interlock can fall back to disabled.
//!
//! Every exited child is reaped exactly once, so no zombies accumulate over
//! repeated enable/disable cycles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use thiserror::Error;

use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

// Internal
use util::session::Session;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// How long a stopped consumer is given to exit gracefully before it is
/// killed outright.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Poll interval while waiting out the grace period.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A handle on a running child process.
///
/// Abstracted over so the supervisor's stop sequence can be exercised in
/// tests without spawning real processes.
pub trait ProcessHandle {
    /// Ask the process to exit gracefully.
    fn terminate(&mut self) -> Result<(), SupervisorError>;

    /// Kill the process outright.
    fn kill(&mut self) -> Result<(), SupervisorError>;

    /// Check for exit without blocking. `Ok(Some(_))` reaps the process.
    fn try_wait(&mut self) -> Result<Option<ExitStatus>, SupervisorError>;

    /// Block until the process exits, reaping it.
    fn wait(&mut self) -> Result<ExitStatus, SupervisorError>;

    /// OS process id, for logging.
    fn id(&self) -> u32;
}

/// Something which can spawn a new consumer process.
pub trait Spawner {
    type Handle: ProcessHandle;

    fn spawn(&mut self) -> Result<Self::Handle, SupervisorError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The consumer process supervisor.
pub struct Supervisor<S: Spawner> {
    spawner: S,
    handle: Option<S::Handle>,
}

/// Spawns the real `sub_ctl` binary, with its output captured into the
/// session directory.
pub struct ChildSpawner {
    program: String,
    stdout_path: std::path::PathBuf,
    stderr_path: std::path::PathBuf,
}

/// [`ProcessHandle`] over a real [`std::process::Child`].
pub struct ChildHandle(Child);

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn the consumer process: {0}")]
    SpawnError(std::io::Error),

    #[error("Could not create the consumer's output files: {0}")]
    OutputFileError(std::io::Error),

    #[error("Failed to signal the consumer process: {0}")]
    SignalError(std::io::Error),

    #[error("Failed waiting on the consumer process: {0}")]
    WaitError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S: Spawner> Supervisor<S> {
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            handle: None,
        }
    }

    /// True if a consumer is currently under supervision.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start the consumer.
    ///
    /// A no-op if one is already running, so a repeated enable cannot spawn
    /// a second copy.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if let Some(ref handle) = self.handle {
            warn!(
                "Consumer already running (pid {}), not spawning another",
                handle.id()
            );
            return Ok(());
        }

        let handle = self.spawner.spawn()?;
        info!("Consumer started, pid {}", handle.id());
        self.handle = Some(handle);

        Ok(())
    }

    /// Stop the consumer: graceful signal, grace period, then a hard kill.
    ///
    /// A no-op if none is running. On return the child has been reaped and
    /// the supervisor is ready for the next start.
    pub fn stop(&mut self) -> Result<(), SupervisorError> {
        let mut handle = match self.handle.take() {
            Some(h) => h,
            None => return Ok(()),
        };

        let pid = handle.id();

        // A failed signal falls through to the hard kill rather than
        // returning, so the child is never left alive but unsupervised
        match handle.terminate() {
            Ok(()) => {
                let deadline = Instant::now() + STOP_GRACE_PERIOD;
                loop {
                    if let Some(status) = handle.try_wait()? {
                        info!("Consumer (pid {}) exited: {}", pid, status);
                        return Ok(());
                    }

                    if Instant::now() >= deadline {
                        break;
                    }

                    std::thread::sleep(STOP_POLL_INTERVAL);
                }

                warn!(
                    "Consumer (pid {}) did not exit within the grace period, killing",
                    pid
                );
            }
            Err(e) => warn!("Could not signal the consumer (pid {}), killing: {}", pid, e),
        }

        handle.kill()?;
        let status = handle.wait()?;
        info!("Consumer (pid {}) killed: {}", pid, status);

        Ok(())
    }

    /// Check whether a supervised consumer has died on its own.
    ///
    /// Returns `true` (after reaping the child) if the consumer exited
    /// without being asked to, in which case the caller should drive the
    /// interlock back to disabled.
    pub fn check_liveness(&mut self) -> Result<bool, SupervisorError> {
        let handle = match self.handle.as_mut() {
            Some(h) => h,
            None => return Ok(false),
        };

        match handle.try_wait()? {
            Some(status) => {
                warn!(
                    "Consumer (pid {}) exited unexpectedly: {}",
                    handle.id(),
                    status
                );
                self.handle = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl ChildSpawner {
    /// A spawner for the given program, writing the child's stdout and
    /// stderr into the session directory.
    pub fn new(program: &str, session: &Session) -> Self {
        Self {
            program: program.to_string(),
            stdout_path: session.session_root.join("sub_ctl.stdout"),
            stderr_path: session.session_root.join("sub_ctl.stderr"),
        }
    }
}

impl Spawner for ChildSpawner {
    type Handle = ChildHandle;

    fn spawn(&mut self) -> Result<ChildHandle, SupervisorError> {
        // Appended, not truncated: one session can see many enable cycles
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.stdout_path)
            .map_err(SupervisorError::OutputFileError)?;
        let stderr = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.stderr_path)
            .map_err(SupervisorError::OutputFileError)?;

        let child = Command::new(&self.program)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(SupervisorError::SpawnError)?;

        Ok(ChildHandle(child))
    }
}

impl ProcessHandle for ChildHandle {
    fn terminate(&mut self) -> Result<(), SupervisorError> {
        // SIGTERM, so the consumer can park the actuators before exiting
        let rc = unsafe { libc::kill(self.0.id() as libc::pid_t, libc::SIGTERM) };

        if rc == 0 {
            Ok(())
        } else {
            let err = std::io::Error::last_os_error();

            // ESRCH means the child already exited; try_wait will reap it
            if err.raw_os_error() == Some(libc::ESRCH) {
                Ok(())
            } else {
                Err(SupervisorError::SignalError(err))
            }
        }
    }

    fn kill(&mut self) -> Result<(), SupervisorError> {
        match self.0.kill() {
            Ok(()) => Ok(()),
            // InvalidInput from Child::kill means already exited
            Err(ref e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(SupervisorError::SignalError(e)),
        }
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>, SupervisorError> {
        self.0.try_wait().map_err(SupervisorError::WaitError)
    }

    fn wait(&mut self) -> Result<ExitStatus, SupervisorError> {
        self.0.wait().map_err(SupervisorError::WaitError)
    }

    fn id(&self) -> u32 {
        self.0.id()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted process handle.
    struct MockHandle {
        id: u32,
        /// Exits on the nth try_wait poll after terminate (None = never).
        exits_after_polls: Option<usize>,
        polls: usize,
        terminated: bool,
        terminate_fails: bool,
        killed: bool,
        reaped: Arc<AtomicUsize>,
    }

    impl ProcessHandle for MockHandle {
        fn terminate(&mut self) -> Result<(), SupervisorError> {
            if self.terminate_fails {
                return Err(SupervisorError::SignalError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "scripted signal failure",
                )));
            }

            self.terminated = true;
            Ok(())
        }

        fn kill(&mut self) -> Result<(), SupervisorError> {
            self.killed = true;
            Ok(())
        }

        fn try_wait(&mut self) -> Result<Option<ExitStatus>, SupervisorError> {
            self.polls += 1;
            match self.exits_after_polls {
                Some(n) if self.terminated && self.polls > n => {
                    self.reaped.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(ExitStatus::from_raw(0)))
                }
                _ => Ok(None),
            }
        }

        fn wait(&mut self) -> Result<ExitStatus, SupervisorError> {
            self.reaped.fetch_add(1, Ordering::SeqCst);
            Ok(ExitStatus::from_raw(0))
        }

        fn id(&self) -> u32 {
            self.id
        }
    }

    struct MockSpawner {
        spawned: usize,
        exits_after_polls: Option<usize>,
        terminate_fails: bool,
        reaped: Arc<AtomicUsize>,
    }

    impl Spawner for MockSpawner {
        type Handle = MockHandle;

        fn spawn(&mut self) -> Result<MockHandle, SupervisorError> {
            self.spawned += 1;
            Ok(MockHandle {
                id: 1000 + self.spawned as u32,
                exits_after_polls: self.exits_after_polls,
                polls: 0,
                terminated: false,
                terminate_fails: self.terminate_fails,
                killed: false,
                reaped: self.reaped.clone(),
            })
        }
    }

    fn supervisor(exits_after_polls: Option<usize>) -> (Supervisor<MockSpawner>, Arc<AtomicUsize>) {
        let reaped = Arc::new(AtomicUsize::new(0));
        let sup = Supervisor::new(MockSpawner {
            spawned: 0,
            exits_after_polls,
            terminate_fails: false,
            reaped: reaped.clone(),
        });
        (sup, reaped)
    }

    #[test]
    fn test_start_is_single_shot() {
        let (mut sup, _) = supervisor(Some(0));

        sup.start().unwrap();
        sup.start().unwrap();

        assert_eq!(sup.spawner.spawned, 1);
        assert!(sup.is_running());
    }

    #[test]
    fn test_stop_graceful_reaps_once() {
        let (mut sup, reaped) = supervisor(Some(1));

        sup.start().unwrap();
        sup.stop().unwrap();

        assert!(!sup.is_running());
        assert_eq!(reaped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_falls_back_to_kill() {
        let (mut sup, reaped) = supervisor(None);

        sup.start().unwrap();
        sup.stop().unwrap();

        assert!(!sup.is_running());
        // Reaped via the blocking wait after the kill
        assert_eq!(reaped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_survives_failed_signal() {
        let reaped = Arc::new(AtomicUsize::new(0));
        let mut sup = Supervisor::new(MockSpawner {
            spawned: 0,
            exits_after_polls: Some(0),
            terminate_fails: true,
            reaped: reaped.clone(),
        });

        sup.start().unwrap();
        sup.stop().unwrap();

        // Even though the graceful signal failed, the child was killed and
        // reaped; a later start may spawn again safely
        assert!(!sup.is_running());
        assert_eq!(reaped.load(Ordering::SeqCst), 1);

        sup.start().unwrap();
        assert_eq!(sup.spawner.spawned, 2);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let (mut sup, reaped) = supervisor(Some(0));

        sup.stop().unwrap();
        assert_eq!(reaped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_liveness_detects_self_exit() {
        let (mut sup, reaped) = supervisor(Some(0));

        sup.start().unwrap();

        // Fake a self-exit: mark terminated so the mock reports an exit
        // without the supervisor having asked for one
        sup.handle.as_mut().unwrap().terminated = true;

        assert!(sup.check_liveness().unwrap());
        assert!(!sup.is_running());
        assert_eq!(reaped.load(Ordering::SeqCst), 1);

        // And is quiet once the handle is gone
        assert!(!sup.check_liveness().unwrap());
    }
}
