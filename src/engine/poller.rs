// src/engine/poller.rs

//! Completion poller pool (direct strategy).
//!
//! A fixed number of long-lived workers, each the sole owner of a registry
//! of in-flight children. Registration messages arrive over a per-worker
//! channel, which doubles as the wake signal; no lock is ever shared between
//! workers. Each worker multiplexes, in one `select!`:
//!
//! - new registrations,
//! - completion of outstanding pipe reads (a read owns its reader and hands
//!   it back together with the chunk, so at most one read per stream is in
//!   flight at a time),
//! - a sleep sized to the soonest time-to-timeout among owned descriptors.
//!
//! A descriptor that is both readable and past its deadline takes the
//! timeout path; killing is idempotent with respect to already-buffered
//! output, draining further is not.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[cfg(windows)]
use crate::command::prepare::escape_create_process_arg;
use crate::command::prepare::pretty_print_arguments;
use crate::engine::dispatch::CallbackExecutor;
use crate::errors::EngineError;
use crate::process::{
    unix_time, Arguments, Callback, ProcessResult, SPAWN_FAILURE_EXIT_STATUS, TIMEOUT_MARKER,
};

/// Bytes requested per pipe read.
const READ_CHUNK: usize = 4096;

/// Remaining time-to-timeout below this floor is replaced by the poll
/// interval, so an imminent deadline does not degenerate into a busy spin.
const MIN_WAIT_FLOOR: f64 = 0.01;

/// A registration message: everything a worker needs to spawn and track one
/// child. The environment block is already composed (see
/// [`crate::command::compose_environment`]).
pub(crate) struct PollerRequest {
    pub id: u64,
    pub arguments: Arguments,
    pub environment: Vec<(String, String)>,
    pub timeout: f64,
    pub callback: Callback,
}

/// The fixed pool of poller workers.
pub(crate) struct PollerPool {
    workers: Vec<mpsc::UnboundedSender<PollerRequest>>,
}

impl PollerPool {
    /// Spawn `pool_size` workers onto the current runtime.
    pub(crate) fn start(
        pool_size: usize,
        poll_interval: Duration,
        executor: Arc<dyn CallbackExecutor>,
    ) -> Result<Self, EngineError> {
        if pool_size == 0 {
            return Err(EngineError::EmptyPool);
        }
        let handle = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let mut workers = Vec::with_capacity(pool_size);
        for index in 0..pool_size {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = PollerWorker::new(index, rx, Arc::clone(&executor), poll_interval);
            handle.spawn(worker.run());
            workers.push(tx);
        }

        Ok(Self { workers })
    }

    /// Register a descriptor with the worker selected by its stable
    /// sequence id. Never blocks.
    pub(crate) fn register(&self, req: PollerRequest) {
        let slot = (req.id % self.workers.len() as u64) as usize;
        if self.workers[slot].send(req).is_err() {
            error!(worker = slot, "poller worker is gone; dropping request");
        }
    }
}

/// One in-flight child, owned exclusively by a single worker.
struct InFlight {
    arguments: Arguments,
    child: Child,
    pid: u32,
    output: Vec<u8>,
    execution_start: f64,
    timeout: f64,
    deadline: Option<Instant>,
    /// Pipe readers not currently out on a read.
    idle: Vec<PipeReader>,
    open_streams: usize,
    pending_reads: usize,
    callback: Callback,
}

/// An owned reader for one of the child's output pipes. Reads consume the
/// reader and return it with the chunk, so the worker can keep the
/// descriptor itself in its registry while a read is outstanding.
enum PipeReader {
    Stdout(ChildStdout),
    Stderr(ChildStderr),
}

/// Outcome of one outstanding read. `reader` is `None` on EOF or read
/// error, which uniformly mean "no more output from this stream".
struct ReadEvent {
    id: u64,
    reader: Option<PipeReader>,
    data: Vec<u8>,
}

impl PipeReader {
    async fn read_chunk(mut self, id: u64) -> ReadEvent {
        let mut data = vec![0u8; READ_CHUNK];
        let read = match &mut self {
            PipeReader::Stdout(r) => r.read(&mut data).await,
            PipeReader::Stderr(r) => r.read(&mut data).await,
        };

        match read {
            Ok(0) => ReadEvent { id, reader: None, data: Vec::new() },
            Ok(n) => {
                data.truncate(n);
                ReadEvent { id, reader: Some(self), data }
            }
            Err(err) => {
                debug!(error = %err, "pipe read failed; treating as end of output");
                ReadEvent { id, reader: None, data: Vec::new() }
            }
        }
    }
}

/// A single poller worker: sole owner of its registry, driven entirely by
/// its channel, its outstanding reads, and its deadline sleep.
pub(crate) struct PollerWorker {
    index: usize,
    rx: mpsc::UnboundedReceiver<PollerRequest>,
    registry: HashMap<u64, InFlight>,
    reads: JoinSet<ReadEvent>,
    executor: Arc<dyn CallbackExecutor>,
    poll_interval: Duration,
    open: bool,
}

impl PollerWorker {
    pub(crate) fn new(
        index: usize,
        rx: mpsc::UnboundedReceiver<PollerRequest>,
        executor: Arc<dyn CallbackExecutor>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            index,
            rx,
            registry: HashMap::new(),
            reads: JoinSet::new(),
            executor,
            poll_interval,
            open: true,
        }
    }

    /// Worker loop. Runs until the registration channel closes and every
    /// owned descriptor has been finalized.
    pub(crate) async fn run(mut self) {
        debug!(worker = self.index, "poller worker started");

        loop {
            if !self.open && self.registry.is_empty() {
                break;
            }

            self.issue_reads();
            let budget = self.wait_budget();

            tokio::select! {
                req = self.rx.recv(), if self.open => {
                    match req {
                        Some(req) => self.admit(req),
                        None => self.open = false,
                    }
                }
                Some(joined) = self.reads.join_next(), if !self.reads.is_empty() => {
                    if let Ok(event) = joined {
                        self.note_read(event);
                    }
                }
                _ = wait_for(budget) => {}
            }

            self.sweep().await;
        }

        debug!(worker = self.index, "poller worker finished (channel closed)");
    }

    /// Issue an overlapped read for every idle pipe reader.
    fn issue_reads(&mut self) {
        for (id, inflight) in self.registry.iter_mut() {
            while let Some(reader) = inflight.idle.pop() {
                inflight.pending_reads += 1;
                let id = *id;
                self.reads.spawn(reader.read_chunk(id));
            }
        }
    }

    /// Wait budget: minimum remaining time-to-timeout across owned
    /// descriptors, clamped to the poll interval when nearly due. `None`
    /// means no descriptor carries a deadline, so only readiness or a new
    /// registration can wake us.
    fn wait_budget(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut soonest: Option<f64> = None;

        for inflight in self.registry.values() {
            let Some(deadline) = inflight.deadline else { continue };
            let remaining = deadline.saturating_duration_since(now).as_secs_f64();
            soonest = Some(soonest.map_or(remaining, |s: f64| s.min(remaining)));
        }

        soonest.map(|s| {
            if s < MIN_WAIT_FLOOR {
                self.poll_interval
            } else {
                Duration::from_secs_f64(s)
            }
        })
    }

    /// Spawn the child for a new registration, or deliver the spawn-failure
    /// result straight away.
    fn admit(&mut self, req: PollerRequest) {
        let execution_start = unix_time();
        let started = Instant::now();

        match spawn_child(&req.arguments, &req.environment) {
            Ok(mut child) => {
                let pid = child.id().unwrap_or(0);
                info!(
                    command = %pretty_print_arguments(&req.arguments),
                    pid,
                    "running command"
                );

                let mut idle = Vec::with_capacity(2);
                if let Some(stdout) = child.stdout.take() {
                    idle.push(PipeReader::Stdout(stdout));
                }
                if let Some(stderr) = child.stderr.take() {
                    idle.push(PipeReader::Stderr(stderr));
                }

                let deadline = if req.timeout > 0.0 {
                    Duration::try_from_secs_f64(req.timeout)
                        .ok()
                        .and_then(|d| started.checked_add(d))
                } else {
                    None
                };

                let open_streams = idle.len();
                self.registry.insert(
                    req.id,
                    InFlight {
                        arguments: req.arguments,
                        child,
                        pid,
                        output: Vec::new(),
                        execution_start,
                        timeout: req.timeout,
                        deadline,
                        idle,
                        open_streams,
                        pending_reads: 0,
                        callback: req.callback,
                    },
                );
            }
            Err(err) => {
                let output = format!(
                    "Command {} failed to execute: {}",
                    pretty_print_arguments(&req.arguments),
                    err
                );
                debug!(
                    command = %pretty_print_arguments(&req.arguments),
                    error = %err,
                    "spawn failed"
                );

                let execution_end = unix_time().max(execution_start);
                let result = ProcessResult {
                    pid: 0,
                    execution_start,
                    execution_end,
                    exit_status: SPAWN_FAILURE_EXIT_STATUS,
                    output,
                };
                let callback = req.callback;
                self.executor.enqueue(Box::new(move || callback(result)));
            }
        }
    }

    /// Fold a completed read back into its descriptor. Reads that complete
    /// after their descriptor was finalized (timeout path) are dropped.
    fn note_read(&mut self, event: ReadEvent) {
        let Some(inflight) = self.registry.get_mut(&event.id) else {
            return;
        };

        inflight.pending_reads -= 1;
        match event.reader {
            Some(reader) => {
                inflight.output.extend_from_slice(&event.data);
                inflight.idle.push(reader);
            }
            None => inflight.open_streams -= 1,
        }
    }

    /// Finalize every descriptor that is past its deadline or fully
    /// drained. The deadline test runs first, so timeout wins over
    /// readiness observed in the same iteration.
    async fn sweep(&mut self) {
        let now = Instant::now();
        let due: Vec<(u64, bool)> = self
            .registry
            .iter()
            .filter_map(|(id, inflight)| {
                if inflight.deadline.is_some_and(|d| d <= now) {
                    Some((*id, true))
                } else if inflight.open_streams == 0 && inflight.pending_reads == 0 {
                    Some((*id, false))
                } else {
                    None
                }
            })
            .collect();

        for (id, timed_out) in due {
            let Some(inflight) = self.registry.remove(&id) else {
                continue;
            };
            if timed_out {
                Self::finalize_timeout(&self.executor, inflight).await;
            } else {
                Self::finalize(&self.executor, inflight).await;
            }
        }
    }

    /// Timeout path: mark the output, kill the whole process group, reap,
    /// deliver.
    async fn finalize_timeout(executor: &Arc<dyn CallbackExecutor>, mut inflight: InFlight) {
        warn!(
            pid = inflight.pid,
            command = %pretty_print_arguments(&inflight.arguments),
            timeout_secs = inflight.timeout,
            "killing process group after timeout"
        );

        inflight.output.extend_from_slice(TIMEOUT_MARKER.as_bytes());
        kill_process_group(&mut inflight.child, inflight.pid);

        let exit_status = match inflight.child.wait().await {
            Ok(status) => exit_code(&status),
            Err(err) => {
                debug!(pid = inflight.pid, error = %err, "waiting for killed child failed");
                -1
            }
        };

        Self::deliver(executor, inflight, exit_status);
    }

    /// Normal path: all output drained, reap the exit status and deliver.
    async fn finalize(executor: &Arc<dyn CallbackExecutor>, mut inflight: InFlight) {
        let exit_status = match inflight.child.wait().await {
            Ok(status) => exit_code(&status),
            Err(err) => {
                debug!(pid = inflight.pid, error = %err, "waiting for child failed");
                -1
            }
        };

        info!(
            pid = inflight.pid,
            command = %pretty_print_arguments(&inflight.arguments),
            exit_status,
            "command terminated"
        );

        Self::deliver(executor, inflight, exit_status);
    }

    /// Build the one-shot result and hand it to the callback executor. All
    /// native resources are released when the descriptor's remains are
    /// dropped here.
    fn deliver(executor: &Arc<dyn CallbackExecutor>, inflight: InFlight, exit_status: i32) {
        let InFlight { pid, execution_start, output, callback, .. } = inflight;

        let execution_end = unix_time().max(execution_start);
        let result = ProcessResult {
            pid,
            execution_start,
            execution_end,
            exit_status,
            output: String::from_utf8_lossy(&output).into_owned(),
        };

        executor.enqueue(Box::new(move || callback(result)));
    }
}

async fn wait_for(budget: Option<Duration>) {
    match budget {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Spawn a child with the given argv and a fully composed environment
/// block. Output pipes are merged into one buffer by the caller; the child
/// is placed in its own process group so descendants can be terminated
/// together.
fn spawn_child(
    arguments: &[String],
    environment: &[(String, String)],
) -> std::io::Result<Child> {
    let (program, rest) = arguments.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argument list")
    })?;

    let mut cmd = Command::new(program);

    #[cfg(not(windows))]
    cmd.args(rest);
    #[cfg(windows)]
    for arg in rest {
        cmd.raw_arg(escape_create_process_arg(arg));
    }

    cmd.env_clear();
    cmd.envs(environment.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

/// Map a wait status to the reported exit code: the code itself when the
/// child exited, `128 + signal` when it was killed by a signal.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child, pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // pid 0 would address our own process group.
    if pid == 0 {
        let _ = child.start_kill();
        return;
    }

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => {}
        // The group is already gone; reaping below picks up the status.
        Err(Errno::ESRCH) => {
            let _ = child.start_kill();
        }
        Err(err) => {
            warn!(pid, error = %err, "failed to kill process group");
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child, pid: u32) {
    if let Err(err) = child.start_kill() {
        warn!(pid, error = %err, "failed to kill process");
    }
}
