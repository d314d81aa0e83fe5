//! External tool process management

use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;

use deck_core::prelude::*;

/// How long to wait for the OS to reap a force-killed process
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable "this process has exited" flag.
///
/// Cheap to clone; every clone observes the same process. The exit code is
/// written exactly once by whoever owns the child.
#[derive(Debug, Clone, Default)]
pub struct ExitSignal {
    inner: Arc<ExitInner>,
}

#[derive(Debug, Default)]
struct ExitInner {
    code: OnceLock<Option<i32>>,
    notify: Notify,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the exit and wake all waiters. Later calls are ignored.
    pub fn mark_exited(&self, code: Option<i32>) {
        if self.inner.code.set(code).is_ok() {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn has_exited(&self) -> bool {
        self.inner.code.get().is_some()
    }

    /// Exit code if the process has exited (`Some(None)` for signal deaths)
    pub fn exit_code(&self) -> Option<Option<i32>> {
        self.inner.code.get().copied()
    }

    /// Wait until the process exits and return its code.
    pub async fn wait(&self) -> Option<i32> {
        loop {
            // Register interest before checking so a concurrent mark_exited
            // cannot slip between the check and the await.
            let notified = self.inner.notify.notified();
            if let Some(code) = self.inner.code.get() {
                return *code;
            }
            notified.await;
        }
    }
}

/// A long-running external tool process (`scrcpy` mirror or recorder).
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task.
/// `ToolProcess` keeps a kill channel to request a force-kill and an
/// [`ExitSignal`] for synchronous liveness checks and async exit waits.
pub struct ToolProcess {
    /// Short description used in logs, e.g. `scrcpy mirror emulator-5554`
    label: String,
    /// Process ID
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    exit: ExitSignal,
}

impl std::fmt::Debug for ToolProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProcess")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("exited", &self.exit.has_exited())
            .finish()
    }
}

impl ToolProcess {
    /// Spawn `program args...` and start supervising it.
    ///
    /// A missing executable maps to [`Error::ToolNotFound`], any other OS
    /// failure to [`Error::SpawnFailed`].
    pub fn spawn<S: AsRef<OsStr>>(
        program: &str,
        args: &[S],
        label: impl Into<String>,
    ) -> Result<Self> {
        let label = label.into();
        info!("Spawning {}: {}", label, program);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(program)
                } else {
                    Error::spawn_failed(format!("{}: {}", label, e))
                }
            })?;

        let pid = child.id();
        info!("{} started with PID: {:?}", label, pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(Self::output_reader(stdout, label.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::output_reader(stderr, label.clone(), "stderr"));
        }

        let exit = ExitSignal::new();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            label.clone(),
            exit.clone(),
        ));

        Ok(Self {
            label,
            pid,
            kill_tx: Some(kill_tx),
            exit,
        })
    }

    /// Background task: owns `child`, waits for it to exit, records the code.
    ///
    /// Two ways the task can end:
    /// 1. The process exits on its own (or after SIGTERM) and `child.wait()` resolves.
    /// 2. `kill_rx` fires and we kill the child first, then wait for it.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        label: String,
        exit: ExitSignal,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("{} exited with status: {:?}", label, status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for {}: {}", label, e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing {}", label);
                if let Err(e) = child.kill().await {
                    error!("Failed to kill {}: {}", label, e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("{} killed, exit status: {:?}", label, status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting after kill of {}: {}", label, e);
                        None
                    }
                }
            }
        };

        exit.mark_exited(code);
    }

    /// Forward tool output into the log
    async fn output_reader<R>(stream: R, label: String, name: &'static str)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            debug!("{} {}: {}", label, name, line);
        }

        trace!("{} {} reader finished", label, name);
    }

    /// Gracefully terminate the process.
    ///
    /// 1. Early exit if the process already died
    /// 2. Request a graceful stop (SIGTERM on Unix, lets scrcpy finalize recordings)
    /// 3. Wait up to `grace` for the exit
    /// 4. Force kill and wait for the OS to reap it
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.has_exited() {
            debug!("{} already exited, nothing to terminate", self.label);
            return Ok(());
        }

        info!("Terminating {}", self.label);

        let exit = self.exit.clone();
        let exited = exit.wait();
        tokio::pin!(exited);

        if self.request_graceful_stop() {
            if timeout(grace, &mut exited).await.is_ok() {
                info!("{} exited gracefully", self.label);
                return Ok(());
            }
            warn!(
                "{} did not exit within {:?}, force killing",
                self.label, grace
            );
        }

        self.force_kill();

        match timeout(KILL_REAP_TIMEOUT, &mut exited).await {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::timeout(
                format!("terminating {}", self.label),
                KILL_REAP_TIMEOUT.as_millis() as u64,
            )),
        }
    }

    /// Send SIGTERM. Returns `false` when no graceful path exists.
    #[cfg(unix)]
    fn request_graceful_stop(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };

        // SAFETY: plain kill(2) on a PID we spawned; the wait task has not
        // reaped it yet because `has_exited()` was false.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            warn!(
                "SIGTERM to {} failed: {}",
                self.label,
                std::io::Error::last_os_error()
            );
            return false;
        }
        true
    }

    #[cfg(not(unix))]
    fn request_graceful_stop(&self) -> bool {
        false
    }

    /// Force kill the process by signalling the wait task.
    fn force_kill(&mut self) {
        warn!("Force killing {} via kill channel", self.label);
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may have already exited naturally.
            let _ = tx.send(());
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit.has_exited()
    }

    pub fn is_alive(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("{} dropped while process may still be running", self.label);
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net.
        debug!("{} dropped", self.label);
    }
}
