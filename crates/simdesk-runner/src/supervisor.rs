use crate::relay::{LogSender, LogStream};
use simdesk_core::Endpoint;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// How long `stop` waits for the child to honor graceful termination
/// before force-killing it.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn simulator {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
}

/// How to invoke the external simulator. The command line is built from
/// exactly the two start parameters plus whatever is configured here;
/// nothing ambient is assumed.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Simulator executable.
    pub program: PathBuf,
    /// Extra arguments appended after the data-dir/endpoint pair.
    pub extra_args: Vec<String>,
    /// Grace period between terminate and force kill.
    pub grace: Duration,
    /// Working directory for the child, when it matters to the simulator.
    pub working_dir: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("snmpsim-command-responder"),
            extra_args: Vec::new(),
            grace: DEFAULT_GRACE,
            working_dir: None,
        }
    }
}

struct RunningChild {
    child: Child,
}

/// Owns the simulator child process lifecycle: Idle -> Running on a
/// successful spawn, back to Idle on `stop` or when the child exits on its
/// own. At most one child is live; `start` while Running is a no-op and
/// every spawned child is reaped before the supervisor lets go of its
/// handle.
pub struct Supervisor {
    config: SupervisorConfig,
    log: LogSender,
    running: Option<RunningChild>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, log: LogSender) -> Self {
        Self {
            config,
            log,
            running: None,
        }
    }

    /// Whether a child is currently live. Re-checks the OS so a child that
    /// exited on its own is reaped here instead of leaving a stale handle.
    pub fn is_running(&mut self) -> bool {
        let Some(running) = &mut self.running else {
            return false;
        };
        match running.child.try_wait() {
            Ok(Some(status)) => {
                info!(%status, "simulator exited on its own");
                self.running = None;
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!(%err, "could not poll simulator status");
                true
            }
        }
    }

    /// OS pid of the live child, if any.
    pub fn child_id(&self) -> Option<u32> {
        self.running.as_ref().map(|running| running.child.id())
    }

    /// Spawns the simulator bound to `endpoint`, serving records from
    /// `data_dir`. A no-op while a child is live (idempotent start). Spawn
    /// failure leaves the supervisor Idle; retrying is the caller's call.
    pub fn start(&mut self, endpoint: &Endpoint, data_dir: &Path) -> Result<(), RunnerError> {
        if self.is_running() {
            debug!("start ignored, simulator already running");
            return Ok(());
        }

        let mut command = Command::new(&self.config.program);
        command
            .arg("--data-dir")
            .arg(data_dir)
            .arg("--agent-udpv4-endpoint")
            .arg(endpoint.to_string())
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            spawn_reader("sim-stdout", stdout, LogStream::Stdout, self.log.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader("sim-stderr", stderr, LogStream::Stderr, self.log.clone());
        }

        info!(
            pid = child.id(),
            %endpoint,
            data_dir = %data_dir.display(),
            "simulator started"
        );
        self.running = Some(RunningChild { child });
        Ok(())
    }

    /// Requests graceful termination, waits up to the configured grace
    /// period, then force-kills. Always ends Idle; a no-op when Idle.
    /// Teardown problems are logged, not raised, so `stop` is safe on any
    /// state including a child that already exited.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        if matches!(running.child.try_wait(), Ok(Some(_))) {
            debug!("simulator already exited before stop");
            return;
        }

        request_terminate(&mut running.child);
        let deadline = Instant::now() + self.config.grace;
        loop {
            match running.child.try_wait() {
                Ok(Some(status)) => {
                    info!(%status, "simulator stopped");
                    break;
                }
                Ok(None) if Instant::now() >= deadline => {
                    warn!(
                        grace_ms = self.config.grace.as_millis() as u64,
                        "simulator ignored terminate, force killing"
                    );
                    if let Err(err) = running.child.kill() {
                        warn!(%err, "force kill failed");
                    }
                    if let Err(err) = running.child.wait() {
                        warn!(%err, "could not reap simulator");
                    }
                    break;
                }
                Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(err) => {
                    warn!(%err, "could not poll simulator, force killing");
                    let _ = running.child.kill();
                    let _ = running.child.wait();
                    break;
                }
            }
        }
        // The reader threads are not joined: they end on their own at
        // end-of-stream once the dead child's pipes close, and a blocked
        // send unparks when the relay is dropped. Joining here could wait
        // on a full relay nobody is draining anymore.
    }
}

// No leaked children: dropping the supervisor tears the process down the
// same way an explicit stop does.
impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Detached, like the original's daemon readers: the thread ends at
/// end-of-stream, so there is nothing to join at stop time.
fn spawn_reader(name: &str, stream: impl Read + Send + 'static, kind: LogStream, log: LogSender) {
    let spawned = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || read_stream(stream, kind, log));
    if let Err(err) = spawned {
        warn!(%err, "could not spawn {kind} reader thread");
    }
}

/// Forwards lines until end-of-stream (the normal shutdown path). A real
/// read fault becomes a diagnostic line on the relay; background readers
/// never take the host application down.
fn read_stream(stream: impl Read, kind: LogStream, log: LogSender) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(text) => log.send(kind, text),
            Err(err) => {
                log.send(kind, format!("[supervisor] {kind} read failed: {err}"));
                break;
            }
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Err(err) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        warn!(%err, "SIGTERM failed, falling back to kill");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) {
    // No graceful signal on this platform; the grace loop reaps the kill.
    let _ = child.kill();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::relay::LogRelay;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn supervisor_for(program: PathBuf, grace: Duration, relay: &LogRelay) -> Supervisor {
        Supervisor::new(
            SupervisorConfig {
                program,
                grace,
                ..SupervisorConfig::default()
            },
            relay.sender(),
        )
    }

    fn endpoint() -> Endpoint {
        "127.0.0.1:1161".parse().unwrap()
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "sim", "exec sleep 30");
        let relay = LogRelay::new();
        let mut supervisor = supervisor_for(program, DEFAULT_GRACE, &relay);

        supervisor.start(&endpoint(), dir.path()).unwrap();
        let first_pid = supervisor.child_id().expect("live child");
        supervisor.start(&endpoint(), dir.path()).unwrap();
        assert_eq!(supervisor.child_id(), Some(first_pid));
        assert!(supervisor.is_running());

        supervisor.stop();
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.child_id(), None);
    }

    #[test]
    fn stop_force_kills_a_term_ignoring_child_within_the_grace_bound() {
        let dir = tempdir().unwrap();
        let program = script(
            dir.path(),
            "stubborn",
            "trap '' TERM\nwhile :; do sleep 0.1; done",
        );
        let relay = LogRelay::new();
        let grace = Duration::from_millis(500);
        let mut supervisor = supervisor_for(program, grace, &relay);

        supervisor.start(&endpoint(), dir.path()).unwrap();
        assert!(supervisor.is_running());

        let began = Instant::now();
        supervisor.stop();
        let elapsed = began.elapsed();
        assert!(!supervisor.is_running());
        assert!(
            elapsed < grace + Duration::from_secs(2),
            "teardown took {elapsed:?}"
        );
    }

    #[test]
    fn output_from_both_streams_reaches_the_relay() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "chatty", "echo from-stdout\necho from-stderr >&2");
        let relay = LogRelay::new();
        let mut supervisor = supervisor_for(program, DEFAULT_GRACE, &relay);

        supervisor.start(&endpoint(), dir.path()).unwrap();
        let mut lines = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while lines.len() < 2 && Instant::now() < deadline {
            if let Some(line) = relay.recv_timeout(Duration::from_millis(100)) {
                lines.push(line);
            }
        }

        assert!(lines
            .iter()
            .any(|l| l.stream == LogStream::Stdout && l.text == "from-stdout"));
        assert!(lines
            .iter()
            .any(|l| l.stream == LogStream::Stderr && l.text == "from-stderr"));

        // The child exits on its own; the supervisor notices and stop stays
        // a safe no-op.
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!supervisor.is_running());
        supervisor.stop();
    }

    #[test]
    fn spawn_failure_reports_and_stays_idle() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-simulator");
        let relay = LogRelay::new();
        let mut supervisor = supervisor_for(missing, DEFAULT_GRACE, &relay);

        let result = supervisor.start(&endpoint(), dir.path());
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
        assert!(!supervisor.is_running());

        // The failed attempt does not poison the supervisor.
        let program = script(dir.path(), "sim", "exec sleep 30");
        supervisor.config.program = program;
        supervisor.start(&endpoint(), dir.path()).unwrap();
        assert!(supervisor.is_running());
        supervisor.stop();
    }

    #[test]
    fn restart_after_stop_spawns_a_fresh_child() {
        let dir = tempdir().unwrap();
        let program = script(dir.path(), "sim", "exec sleep 30");
        let relay = LogRelay::new();
        let mut supervisor = supervisor_for(program, DEFAULT_GRACE, &relay);

        supervisor.start(&endpoint(), dir.path()).unwrap();
        let first_pid = supervisor.child_id();
        supervisor.stop();
        supervisor.start(&endpoint(), dir.path()).unwrap();
        assert!(supervisor.is_running());
        assert_ne!(supervisor.child_id(), first_pid);
        supervisor.stop();
    }
}
