// src/shell/executor.rs

//! Individual shell process lifecycle: spawn, supervise, stop, kill,
//! restart, remove, adopt.
//!
//! Every running shell owns:
//! - one reader task per output stream, draining into the ring buffers until
//!   EOF without ever blocking the caller of `spawn`;
//! - one supervisor task awaiting process exit and recording the terminal
//!   state.
//!
//! Processes are started in their own process group so they can be signaled
//! independently of the daemon's lifetime — shells deliberately survive a
//! daemon restart and are re-attached (adopted) or reconciled at startup.

use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use nix::pty::openpty;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::errors::{OrchestratorError, Result};
use crate::logbuf::{StreamKind, TaskLogs};
use crate::registry::{Registry, TaskEntry};
use crate::shell::stats;
use crate::task::{ShellSpec, TaskId, TaskRecord, TaskStatus, TaskSummary};

/// Poll interval for the watcher that re-supervises adopted (non-child)
/// processes.
const ADOPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll interval while `restart` waits for the previous run to finish.
const RESTART_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `restart` waits for the previous run to reach a terminal state
/// before giving up, in poll intervals.
const RESTART_POLL_ATTEMPTS: u32 = 100;

/// Process executor for shell tasks.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    registry: Registry,
}

impl ShellExecutor {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Create and launch a new shell task.
    ///
    /// Capacity is enforced atomically with the record insert. A spawn
    /// failure is recorded as the task's terminal `failed` status rather
    /// than propagated, so the caller still receives the record.
    pub async fn spawn(
        &self,
        spec: ShellSpec,
        label: Option<String>,
        autostart: bool,
    ) -> Result<TaskSummary> {
        validate_spec(&spec)?;
        let record = TaskRecord::new_shell(spec, label, autostart);
        let entry = self.registry.insert_shell(record)?;
        self.launch(&entry).await;
        Ok(TaskSummary::from_record(&entry.record_snapshot()))
    }

    /// Launch (or relaunch) the process for an existing entry.
    async fn launch(&self, entry: &Arc<TaskEntry>) {
        let (id, spec) = {
            let record = entry.record.lock().unwrap();
            (record.id.clone(), record.shell_spec().cloned())
        };
        let Some(spec) = spec else {
            error!(task = %id, "launch called on a non-shell task");
            return;
        };

        let launched = if spec.pty {
            self.launch_pty(entry, &id, &spec).await
        } else {
            self.launch_piped(entry, &id, &spec).await
        };

        if let Err(err) = launched {
            error!(task = %id, error = %err, "failed to spawn shell process");
            self.registry.mutate(entry, |record| {
                record.mark_failed(format!("spawn failed: {err}"));
            });
        }
    }

    async fn launch_piped(
        &self,
        entry: &Arc<TaskEntry>,
        id: &TaskId,
        spec: &ShellSpec,
    ) -> Result<()> {
        let mut cmd = build_command(spec)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|err| OrchestratorError::Spawn(err.to_string()))?;

        let pid = child.id().map(|p| p as i32);
        let ticks = pid.and_then(stats::start_ticks);
        self.registry.mutate(entry, |record| {
            record.mark_running(pid, ticks);
        });
        info!(task = %id, ?pid, cmd = %spec.command.join(" "), "shell process started");

        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(id.clone(), StreamKind::Stdout, stdout, entry.logs.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(id.clone(), StreamKind::Stderr, stderr, entry.logs.clone());
        }

        let registry = self.registry.clone();
        let entry = entry.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            finalize_exit(&registry, &entry, status);
        });
        Ok(())
    }

    async fn launch_pty(
        &self,
        entry: &Arc<TaskEntry>,
        id: &TaskId,
        spec: &ShellSpec,
    ) -> Result<()> {
        let pty = openpty(None, None).map_err(|err| {
            OrchestratorError::Spawn(format!("failed to allocate pty: {err}"))
        })?;
        let master = std::fs::File::from(pty.master);
        let slave = std::fs::File::from(pty.slave);

        let mut cmd = build_command(spec)?;
        cmd.env("TERM", "xterm-256color")
            .stdin(Stdio::from(slave.try_clone()?))
            .stdout(Stdio::from(slave.try_clone()?))
            .stderr(Stdio::from(slave));

        let child = cmd
            .spawn()
            .map_err(|err| OrchestratorError::Spawn(err.to_string()))?;

        let pid = child.id().map(|p| p as i32);
        let ticks = pid.and_then(stats::start_ticks);
        self.registry.mutate(entry, |record| {
            record.mark_running(pid, ticks);
        });
        info!(task = %id, ?pid, cmd = %spec.command.join(" "), "pty shell started");

        *entry.stdin.lock().unwrap() = Some(master.try_clone()?);
        spawn_pty_reader(id.clone(), master, entry.logs.clone());

        let registry = self.registry.clone();
        let entry = entry.clone();
        let mut child = child;
        tokio::spawn(async move {
            let status = child.wait().await;
            entry.stdin.lock().unwrap().take();
            finalize_exit(&registry, &entry, status);
        });
        Ok(())
    }

    /// Graceful stop: SIGTERM the process group, record `stopping`, and
    /// escalate to SIGKILL after the grace period. Idempotent: stopping an
    /// already-finished task is a no-op success.
    ///
    /// Asynchronous to the caller: this returns once the signal is issued,
    /// not once the process has exited.
    pub fn stop(&self, entry: &Arc<TaskEntry>) -> Result<()> {
        let (pid, status) = {
            let record = entry.record.lock().unwrap();
            (record.pid, record.status)
        };
        if status.is_terminal() {
            return Ok(());
        }
        let Some(pid) = pid else {
            return Ok(());
        };

        entry.stop_requested.store(true, Ordering::SeqCst);
        self.registry.mutate(entry, |record| {
            if record.status == TaskStatus::Running {
                record.mark_stopping();
            }
        });
        signal_group(pid, Signal::SIGTERM);

        let grace = self.registry.config().stop_grace_period();
        let entry = entry.clone();
        tokio::spawn(async move {
            sleep(grace).await;
            let still_live = !entry.record.lock().unwrap().status.is_terminal();
            if still_live && stats::pid_alive(pid) {
                warn!(pid, "stop grace period expired; escalating to SIGKILL");
                signal_group(pid, Signal::SIGKILL);
            }
        });
        Ok(())
    }

    /// Immediate forceful stop. Idempotent like `stop`.
    pub fn kill(&self, entry: &Arc<TaskEntry>) -> Result<()> {
        let (pid, status) = {
            let record = entry.record.lock().unwrap();
            (record.pid, record.status)
        };
        if status.is_terminal() {
            return Ok(());
        }
        let Some(pid) = pid else {
            return Ok(());
        };
        entry.stop_requested.store(true, Ordering::SeqCst);
        signal_group(pid, Signal::SIGKILL);
        Ok(())
    }

    /// Explicit cancellation: forceful kill recorded as `cancelled`.
    pub fn cancel(&self, entry: &Arc<TaskEntry>) -> Result<()> {
        let (id, pid, status) = {
            let record = entry.record.lock().unwrap();
            (record.id.clone(), record.pid, record.status)
        };
        if status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(id));
        }
        entry.cancel.cancel();
        self.registry.mutate(entry, |record| {
            record.cancel_requested = true;
            if record.pid.is_none() {
                // Never started; nothing will observe the exit.
                record.mark_cancelled(None);
            }
        });
        if let Some(pid) = pid {
            signal_group(pid, Signal::SIGKILL);
        }
        Ok(())
    }

    /// Kill the current run and relaunch the stored spec under the same task
    /// identity, producing a new run (`run_id + 1`).
    pub async fn restart(&self, entry: &Arc<TaskEntry>) -> Result<TaskSummary> {
        let (id, pid, terminal) = {
            let record = entry.record.lock().unwrap();
            (record.id.clone(), record.pid, record.status.is_terminal())
        };

        if !terminal {
            entry.stop_requested.store(true, Ordering::SeqCst);
            if let Some(pid) = pid {
                signal_group(pid, Signal::SIGKILL);
            }
            let mut finished = false;
            for _ in 0..RESTART_POLL_ATTEMPTS {
                if entry.record.lock().unwrap().status.is_terminal() {
                    finished = true;
                    break;
                }
                sleep(RESTART_POLL_INTERVAL).await;
            }
            if !finished {
                return Err(OrchestratorError::Other(anyhow::anyhow!(
                    "previous run of '{id}' did not terminate in time"
                )));
            }
        }

        entry.stop_requested.store(false, Ordering::SeqCst);
        entry.cancel.reset();
        self.registry.mutate(entry, |record| record.begin_new_run());
        info!(task = %id, "restarting shell under the same identity");
        self.launch(entry).await;
        Ok(TaskSummary::from_record(&entry.record_snapshot()))
    }

    /// Remove the task: metadata and logs. Rejects a live task unless
    /// `force`, in which case the process group is killed first.
    pub fn remove(&self, id: &str, force: bool) -> Result<()> {
        let entry = self.registry.entry(id)?;
        let (pid, status) = {
            let record = entry.record.lock().unwrap();
            (record.pid, record.status)
        };
        if !status.is_terminal() {
            if !force {
                return Err(OrchestratorError::Validation(format!(
                    "task '{id}' is still running; pass force=true to kill and remove"
                )));
            }
            entry.stop_requested.store(true, Ordering::SeqCst);
            if let Some(pid) = pid {
                signal_group(pid, Signal::SIGKILL);
            }
        }
        self.registry.remove_entry(id)?;
        self.registry.persist();
        info!(task = %id, force, "shell task removed");
        Ok(())
    }

    /// Write input bytes to an interactive shell's pty.
    pub fn write_stdin(&self, entry: &TaskEntry, data: &[u8]) -> Result<()> {
        let mut guard = entry.stdin.lock().unwrap();
        let Some(master) = guard.as_mut() else {
            return Err(OrchestratorError::Validation(
                "task has no attached pty".to_string(),
            ));
        };
        master.write_all(data)?;
        Ok(())
    }

    /// Re-supervise every adopted shell found at startup.
    ///
    /// An adopted process is not our child, so its exit code cannot be
    /// collected; a watcher polls the pid fingerprint and records the
    /// terminal state when the process goes away.
    pub fn resume_adopted(&self) {
        let snapshot = self.registry.snapshot();
        for record in snapshot {
            if record.kind != crate::task::TaskKind::Shell
                || record.status.is_terminal()
                || !record.adopted
            {
                continue;
            }
            if let Ok(entry) = self.registry.entry(&record.id) {
                self.watch_adopted(entry);
            }
        }
    }

    fn watch_adopted(&self, entry: Arc<TaskEntry>) {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let (id, pid, ticks) = {
                let record = entry.record.lock().unwrap();
                (record.id.clone(), record.pid, record.start_ticks)
            };
            let Some(pid) = pid else { return };
            debug!(task = %id, pid, "watching adopted process");
            loop {
                sleep(ADOPT_POLL_INTERVAL).await;
                if entry.record.lock().unwrap().status.is_terminal() {
                    return;
                }
                if stats::fingerprint_matches(pid, ticks) {
                    continue;
                }
                let cancelled = entry.cancel.is_cancelled();
                let stopped = entry.stop_requested.load(Ordering::SeqCst);
                registry.mutate(&entry, |record| {
                    if record.status.is_terminal() {
                        return;
                    }
                    if cancelled {
                        record.mark_cancelled(None);
                    } else if stopped || record.status == TaskStatus::Stopping {
                        record.mark_stopped(None);
                    } else {
                        record.mark_completed(None, None);
                    }
                    record.status_note =
                        Some("exit status unavailable for adopted process".to_string());
                });
                info!(task = %id, pid, "adopted process exited");
                return;
            }
        });
    }
}

// ----------------------------------------------------------------------
// Helpers

fn validate_spec(spec: &ShellSpec) -> Result<()> {
    if spec.command.is_empty() {
        return Err(OrchestratorError::Validation(
            "command must contain at least one argument".to_string(),
        ));
    }
    if spec.command[0].trim().is_empty() {
        return Err(OrchestratorError::Validation(
            "command program must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Working directory for a shell: the given path (created if missing) or the
/// user's home directory.
fn resolve_cwd(cwd: Option<&str>) -> Result<std::path::PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    let target = match cwd {
        None => home,
        Some(raw) => {
            let raw = raw.trim();
            if let Some(rest) = raw.strip_prefix("~/") {
                home.join(rest)
            } else {
                std::path::PathBuf::from(raw)
            }
        }
    };
    if !target.exists() {
        std::fs::create_dir_all(&target)?;
    }
    Ok(target)
}

fn build_command(spec: &ShellSpec) -> Result<Command> {
    let (program, args) = spec.command.split_first().ok_or_else(|| {
        OrchestratorError::Validation("command must contain at least one argument".to_string())
    })?;
    let cwd = resolve_cwd(spec.cwd.as_deref())?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .envs(&spec.env)
        // Own process group: signalable as a unit, survives the daemon.
        .process_group(0);
    Ok(cmd)
}

/// Send a signal to the task's process group (pgid == pid, see
/// `build_command`).
fn signal_group(pid: i32, signal: Signal) {
    if let Err(err) = killpg(Pid::from_raw(pid), signal) {
        debug!(pid, ?signal, error = %err, "signal delivery failed (process may be gone)");
    }
}

/// Drain one piped stream into the ring buffer, line by line, until EOF.
fn spawn_line_reader<R>(task: TaskId, stream: StreamKind, reader: R, logs: Arc<TaskLogs>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logs.push(stream, line);
        }
        debug!(task = %task, ?stream, "stream reader finished");
    });
}

/// Drain a pty master into the stdout ring buffer.
///
/// Reads block on a dedicated worker thread; once the child exits and every
/// slave fd is closed, the read fails with EIO and the reader winds down.
fn spawn_pty_reader(task: TaskId, master: std::fs::File, logs: Arc<TaskLogs>) {
    tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let mut master = master;
        let mut pending = String::new();
        let mut buf = [0u8; 4096];
        loop {
            match master.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                    while let Some(idx) = pending.find('\n') {
                        let line = pending[..idx].trim_end_matches('\r').to_string();
                        pending.drain(..=idx);
                        logs.push(StreamKind::Stdout, line);
                    }
                }
            }
        }
        if !pending.is_empty() {
            logs.push(StreamKind::Stdout, pending);
        }
        debug!(task = %task, "pty reader finished");
    });
}

/// Record the terminal state for an exited child process.
fn finalize_exit(
    registry: &Registry,
    entry: &TaskEntry,
    status: std::io::Result<std::process::ExitStatus>,
) {
    let cancelled = entry.cancel.is_cancelled();
    let stopped = entry.stop_requested.load(Ordering::SeqCst);
    registry.mutate(entry, |record| match &status {
        Ok(st) => {
            // A signal death is recorded as the negated signal number.
            let exit_code = st.code().or_else(|| st.signal().map(|sig| -sig));
            if cancelled {
                if record.mark_cancelled(None) {
                    record.exit_code = exit_code;
                }
            } else if stopped {
                record.mark_stopped(exit_code);
            } else if st.success() {
                record.mark_completed(exit_code, None);
            } else if record.mark_failed(format!("process exited with {st}")) {
                record.exit_code = exit_code;
            }
            info!(
                task = %record.id,
                run_id = record.run_id,
                ?exit_code,
                status = ?record.status,
                "shell process exited"
            );
        }
        Err(err) => {
            record.mark_failed(format!("failed waiting for process: {err}"));
        }
    });
}
