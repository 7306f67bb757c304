//! Helpers for running child processes with timeouts, cancellation and bounded output.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// How long a single wait blocks before re-checking the cancellation token.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// How long output readers get to finish once their process group has been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Shared flag that asks in-flight children to be killed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounds applied to every child process.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Wall-clock budget; the child is killed when it elapses.
    pub timeout: Duration,
    /// Captured stdout/stderr beyond this many bytes is drained and discarded.
    pub output_limit_bytes: usize,
    pub cancel: CancelToken,
}

impl ExecContext {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
            cancel: CancelToken::new(),
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_OUTPUT_LIMIT_BYTES)
    }
}

/// Captured child process output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }

    /// Human-readable dump of captured output, empty when nothing was captured.
    pub fn transcript(&self, label: &str) -> String {
        if self.stdout.is_empty() && self.stderr.is_empty() {
            return String::new();
        }
        let mut buf = String::new();
        buf.push_str("=== stdout ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        buf.push_str(&self.stdout_truncated_notice(label));
        buf.push_str("\n=== stderr ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        buf.push_str(&self.stderr_truncated_notice(label));
        buf
    }
}

/// Run a command under `ctx`, capturing stdout/stderr without risking pipe deadlocks.
///
/// Output is read on detached threads while the child runs. When `sink` is `Some`, every
/// line of stdout and stderr is also written to it as it arrives, so the sink sees the
/// combined stream. Captured output is bounded by `ctx.output_limit_bytes`.
///
/// On Unix the child leads its own process group. Timeout and cancellation kill the whole
/// group, and descendants that outlive the child are killed once the deadline passes.
#[instrument(skip_all, fields(timeout_secs = ctx.timeout.as_secs(), streaming = sink.is_some()))]
pub fn run_command(
    mut cmd: Command,
    ctx: &ExecContext,
    sink: Option<&mut (dyn Write + Send)>,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut cmd);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    let deadline = Instant::now() + ctx.timeout;

    let (tx, rx) = mpsc::channel();
    if let Err(err) = spawn_readers(&mut child, tx) {
        let _ = kill_tree(&mut child);
        let _ = child.wait();
        return Err(err);
    }
    let mut collector = Collector {
        rx,
        open: 2,
        limit: ctx.output_limit_bytes,
        stdout: Capture::default(),
        stderr: Capture::default(),
        sink,
    };

    let (status, interrupt) = wait_bounded(&mut child, ctx, deadline, &mut collector)?;
    drain_after_exit(child.id(), ctx, deadline, interrupt.is_some(), &mut collector);
    let Collector { stdout, stderr, .. } = collector;

    if stdout.truncated > 0 || stderr.truncated > 0 {
        warn!(
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "output truncated"
        );
    }

    let output = CommandOutput {
        exit_code: status.code(),
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.truncated,
        stderr_truncated: stderr.truncated,
        timed_out: interrupt == Some(Interrupt::TimedOut),
        cancelled: interrupt == Some(Interrupt::Cancelled),
    };
    debug!(
        exit_code = ?output.exit_code,
        timed_out = output.timed_out,
        cancelled = output.cancelled,
        "command finished"
    );
    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

enum ReaderEvent {
    Line(Stream, Vec<u8>),
    Closed,
}

/// Bounded in-memory copy of one output stream.
#[derive(Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: usize,
}

impl Capture {
    fn push(&mut self, line: &[u8], limit: usize) {
        let keep = line.len().min(limit.saturating_sub(self.bytes.len()));
        self.bytes.extend_from_slice(&line[..keep]);
        self.truncated += line.len() - keep;
    }
}

/// Consumes reader events on the calling thread: bounded capture plus tee to the sink.
struct Collector<'a> {
    rx: Receiver<ReaderEvent>,
    /// Readers that have not reported EOF yet.
    open: usize,
    limit: usize,
    stdout: Capture,
    stderr: Capture,
    sink: Option<&'a mut (dyn Write + Send)>,
}

impl Collector<'_> {
    fn handle(&mut self, event: ReaderEvent) {
        let (stream, line) = match event {
            ReaderEvent::Line(stream, line) => (stream, line),
            ReaderEvent::Closed => {
                self.open = self.open.saturating_sub(1);
                return;
            }
        };
        if let Some(sink) = self.sink.as_deref_mut()
            && let Err(e) = sink.write_all(&line).and_then(|()| sink.flush())
        {
            warn!(err = %e, "failed to write to output sink");
        }
        let capture = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        capture.push(&line, self.limit);
    }

    /// Handle every event already queued, without blocking.
    fn take_ready(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
        }
    }

    /// Wait up to `timeout` for one event. Returns `false` once no reader can send again.
    fn recv_for(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                true
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => {
                self.open = 0;
                false
            }
        }
    }

    fn finished(&self) -> bool {
        self.open == 0
    }
}

fn spawn_readers(child: &mut Child, tx: Sender<ReaderEvent>) -> Result<()> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    spawn_reader(stdout, Stream::Stdout, tx.clone())?;
    spawn_reader(stderr, Stream::Stderr, tx)
}

/// Forward `reader` line by line until EOF.
///
/// The thread is detached: a pipe held open by a stray descendant never blocks the caller.
fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    tx: Sender<ReaderEvent>,
) -> Result<()> {
    let name = match stream {
        Stream::Stdout => "stdout-reader",
        Stream::Stderr => "stderr-reader",
    };
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(ReaderEvent::Line(stream, line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(err = %e, ?stream, "failed to read child output");
                        break;
                    }
                }
            }
            let _ = tx.send(ReaderEvent::Closed);
        })
        .context("spawn output reader")?;
    Ok(())
}

/// Wait for the child, killing its group once the deadline passes or the token is cancelled.
fn wait_bounded(
    child: &mut Child,
    ctx: &ExecContext,
    deadline: Instant,
    collector: &mut Collector<'_>,
) -> Result<(ExitStatus, Option<Interrupt>)> {
    loop {
        collector.take_ready();
        if ctx.cancel.is_cancelled() {
            warn!("command cancelled, killing");
            return kill(child, Interrupt::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(
                timeout_secs = ctx.timeout.as_secs(),
                "command timed out, killing"
            );
            return kill(child, Interrupt::TimedOut);
        }
        let slice = WAIT_SLICE.min(deadline - now);
        match child.wait_timeout(slice) {
            Ok(Some(status)) => return Ok((status, None)),
            Ok(None) => {}
            Err(e) => {
                let _ = kill_tree(child);
                let _ = child.wait();
                return Err(e).context("wait for command");
            }
        }
    }
}

fn kill(child: &mut Child, reason: Interrupt) -> Result<(ExitStatus, Option<Interrupt>)> {
    kill_tree(child).context("kill command")?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, Some(reason)))
}

/// Collect the output still in flight after the child has exited.
///
/// Descendants may keep the pipes open. They get until the deadline (or a cancellation),
/// then the process group is killed. Readers still open [`DRAIN_GRACE`] after the group
/// was killed are abandoned.
fn drain_after_exit(
    pgid: u32,
    ctx: &ExecContext,
    deadline: Instant,
    group_killed: bool,
    collector: &mut Collector<'_>,
) {
    let mut group_killed = group_killed;
    let mut until = if group_killed {
        Instant::now() + DRAIN_GRACE
    } else {
        deadline
    };
    while !collector.finished() {
        let now = Instant::now();
        if !group_killed && (now >= until || ctx.cancel.is_cancelled()) {
            warn!("descendants still hold the output pipes, killing process group");
            if let Err(e) = kill_group(pgid) {
                warn!(err = %e, "failed to kill process group");
            }
            group_killed = true;
            until = now + DRAIN_GRACE;
            continue;
        }
        if now >= until {
            warn!("abandoning output readers held open by descendants");
            break;
        }
        if !collector.recv_for(WAIT_SLICE.min(until - now)) {
            break;
        }
    }
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Kill the child together with every process in its group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    kill_group(child.id()).or_else(|e| {
        warn!(err = %e, "failed to kill process group, killing child only");
        child.kill()
    })
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> io::Result<()> {
    child.kill()
}

#[cfg(unix)]
fn kill_group(pgid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pgid).map_err(io::Error::other)?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> io::Result<()> {
    Ok(())
}
