//! Child process execution with streamed, cancellable output.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};

use crate::error::KernelError;
use crate::sink::{BufferSink, OutputSink};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag asking the running cell to stop. Cloning shares the flag.
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

    /// Clear a cancellation so the token can be reused for the next cell.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How a streamed child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited on its own. `None` when terminated by a signal.
    Exited(Option<i32>),
    Cancelled,
}

impl ExitStatus {
    pub fn success(self) -> bool {
        self == ExitStatus::Exited(Some(0))
    }
}

enum Chunk {
    Stdout(String),
    Stderr(String),
}

fn pump<R: Read + Send + 'static>(reader: R, tx: Sender<Chunk>, wrap: fn(String) -> Chunk) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(wrap(text)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Run `cmd`, forwarding its output to `sink` as it arrives, until it exits
/// or `cancel` fires. On cancellation the child is killed; output delivered
/// before that is kept.
pub fn run_streaming(
    cmd: &mut Command,
    sink: &mut dyn OutputSink,
    cancel: &CancelToken,
) -> Result<ExitStatus, KernelError> {
    let program = program_name(cmd);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| KernelError::Spawn {
            program: program.clone(),
            source,
        })?;
    tracing::debug!(%program, pid = child.id(), "spawned");

    let (tx, rx) = unbounded();
    if let Some(stdout) = child.stdout.take() {
        pump(stdout, tx.clone(), Chunk::Stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        pump(stderr, tx.clone(), Chunk::Stderr);
    }
    drop(tx);

    let mut cancelled = false;
    loop {
        if cancel.is_cancelled() {
            cancelled = true;
            kill(&mut child, &program);
            while let Ok(chunk) = rx.try_recv() {
                forward(sink, chunk);
            }
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => forward(sink, chunk),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait().map_err(|source| KernelError::Spawn {
        program: program.clone(),
        source,
    })?;
    if cancelled {
        tracing::debug!(%program, "cancelled");
        return Ok(ExitStatus::Cancelled);
    }
    Ok(ExitStatus::Exited(status.code()))
}

fn forward(sink: &mut dyn OutputSink, chunk: Chunk) {
    match chunk {
        Chunk::Stdout(text) => sink.stdout(&text),
        Chunk::Stderr(text) => sink.stderr(&text),
    }
}

fn kill(child: &mut Child, program: &str) {
    if let Err(err) = child.kill() {
        tracing::warn!(%program, error = %err, "failed to kill child");
    }
}

/// Output of a command run to completion.
#[derive(Debug, Clone)]
pub struct Captured {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// stderr followed by stdout, the order the Go tool reports in.
    pub fn combined(&self) -> String {
        let mut out = self.stderr.clone();
        out.push_str(&self.stdout);
        out
    }
}

/// Run `cmd` to completion and capture its output.
pub fn run_captured(cmd: &mut Command) -> Result<Captured, KernelError> {
    let program = program_name(cmd);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| KernelError::Spawn { program, source })?;
    Ok(Captured {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `cmd` to completion and capture its output, killing it if `cancel`
/// fires first. `None` means it was cancelled.
pub fn run_captured_cancellable(
    cmd: &mut Command,
    cancel: &CancelToken,
) -> Result<Option<Captured>, KernelError> {
    let mut buffer = BufferSink::new();
    let status = run_streaming(cmd, &mut buffer, cancel)?;
    Ok(match status {
        ExitStatus::Cancelled => None,
        ExitStatus::Exited(code) => Some(Captured {
            success: status.success(),
            code,
            stdout: buffer.stdout,
            stderr: buffer.stderr,
        }),
    })
}
