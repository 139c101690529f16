//! Out-of-process worker speaking the JSON-lines protocol over stdin/stdout.
//!
//! The child runs [`serve`]; the parent talks to it through [`ProcessWorker`].

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Sender};
use std::thread;

use lightsim_render::protocol::{
    decode_from_worker, decode_to_worker, encode_from_worker, encode_to_worker,
};
use lightsim_render::{
    ComputeWorker, Inbound, RenderRequest, ToWorker, WorkerError, WorkerFactory, WorkerHandle,
    WorkerMessage,
};

use crate::session::{Sampler, run_session};

/// Serve requests read line by line from `input`, writing replies to `output`.
///
/// Returns when `input` is exhausted or `output` can no longer be written.
/// Lines that do not decode are answered with an `error` message.
pub fn serve<S, R, W>(mut sampler: S, input: R, mut output: W) -> io::Result<()>
where
    S: Sampler,
    R: BufRead,
    W: Write,
{
    write_message(&mut output, &WorkerMessage::Loaded)?;
    let never = AtomicBool::new(false);
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request = match decode_to_worker(&line) {
            Ok(ToWorker::RenderRequest(request)) => request,
            Err(err) => {
                tracing::warn!(%err, "unreadable request");
                let error = err.to_string();
                write_message(&mut output, &WorkerMessage::Error { error })?;
                continue;
            }
        };
        let mut write_failure = None;
        let end = run_session(&mut sampler, &request, &never, |msg| {
            match write_message(&mut output, &msg) {
                Ok(()) => true,
                Err(err) => {
                    write_failure = Some(err);
                    false
                }
            }
        });
        if let Some(err) = write_failure {
            return Err(err);
        }
        tracing::debug!(?end, "request served");
    }
    Ok(())
}

fn write_message<W: Write>(output: &mut W, msg: &WorkerMessage) -> io::Result<()> {
    let line = encode_from_worker(msg).map_err(io::Error::other)?;
    writeln!(output, "{line}")?;
    output.flush()
}

/// A child process running [`serve`].
#[derive(Debug)]
pub struct ProcessWorker {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ComputeWorker for ProcessWorker {
    fn post(&mut self, request: RenderRequest) -> Result<(), WorkerError> {
        let stdin = self.stdin.as_mut().ok_or(WorkerError::Disconnected)?;
        let line = encode_to_worker(&ToWorker::RenderRequest(request))?;
        writeln!(stdin, "{line}")?;
        stdin.flush()?;
        Ok(())
    }

    fn terminate(&mut self) {
        self.stdin = None;
        if let Err(err) = self.child.kill() {
            tracing::debug!(%err, "worker process already exited");
        }
        let _ = self.child.wait();
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            self.terminate();
        }
    }
}

/// Launches `program args...` as a worker process for every `spawn`.
#[derive(Debug, Clone)]
pub struct ProcessFactory {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl WorkerFactory for ProcessFactory {
    fn spawn(&mut self) -> Result<WorkerHandle, WorkerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| WorkerError::Spawn(format!("{}: {e}", self.program.display())))?;
        let stdin = child.stdin.take();
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(WorkerError::Spawn("worker stdout unavailable".into()));
        };
        let (tx, inbox) = mpsc::channel();
        thread::Builder::new()
            .name("lightsim-worker-reader".into())
            .spawn(move || read_replies(BufReader::new(stdout), tx))
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        tracing::debug!(pid = child.id(), "worker process started");
        let worker = ProcessWorker { child, stdin };
        Ok(WorkerHandle::new(Box::new(worker), inbox))
    }
}

/// Forward decoded lines until the child closes stdout or the inbox is dropped.
fn read_replies<R: BufRead>(reader: R, tx: Sender<Inbound>) {
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(decode_from_worker(&line)).is_err() {
            break;
        }
    }
}
