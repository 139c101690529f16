//! In-process worker: the sampling loop runs on its own OS thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use lightsim_render::{
    ComputeWorker, Inbound, RenderRequest, WorkerError, WorkerFactory, WorkerHandle,
    WorkerMessage,
};

use crate::session::{Sampler, SessionEnd, run_session};

/// A worker thread plus the channel used to feed it requests.
#[derive(Debug)]
pub struct ThreadWorker {
    requests: Option<Sender<RenderRequest>>,
    stop: Arc<AtomicBool>,
}

impl ThreadWorker {
    /// Start a worker thread around `sampler`. It announces `loaded` as soon as it runs.
    pub fn spawn<S>(sampler: S) -> Result<WorkerHandle, WorkerError>
    where
        S: Sampler + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel();
        let (outbox, inbox) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        thread::Builder::new()
            .name("lightsim-worker".into())
            .spawn(move || worker_loop(sampler, request_rx, outbox, flag))
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        let worker = Self {
            requests: Some(request_tx),
            stop,
        };
        Ok(WorkerHandle::new(Box::new(worker), inbox))
    }
}

impl ComputeWorker for ThreadWorker {
    fn post(&mut self, request: RenderRequest) -> Result<(), WorkerError> {
        let tx = self.requests.as_ref().ok_or(WorkerError::Disconnected)?;
        tx.send(request).map_err(|_| WorkerError::Disconnected)
    }

    fn terminate(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.requests = None;
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop<S: Sampler>(
    mut sampler: S,
    requests: Receiver<RenderRequest>,
    outbox: Sender<Inbound>,
    stop: Arc<AtomicBool>,
) {
    if outbox.send(Ok(WorkerMessage::Loaded)).is_err() {
        return;
    }
    tracing::debug!("worker thread loaded");
    while let Ok(request) = requests.recv() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let end = run_session(&mut sampler, &request, &stop, |msg| {
            outbox.send(Ok(msg)).is_ok()
        });
        if end == SessionEnd::Stopped {
            break;
        }
    }
    tracing::debug!("worker thread exiting");
}

/// Spawns a fresh [`ThreadWorker`] with a new sampler for every `spawn`.
pub struct ThreadFactory<F> {
    make_sampler: F,
}

impl<F, S> ThreadFactory<F>
where
    F: FnMut() -> S + Send,
    S: Sampler + 'static,
{
    pub fn new(make_sampler: F) -> Self {
        Self { make_sampler }
    }
}

impl<F, S> WorkerFactory for ThreadFactory<F>
where
    F: FnMut() -> S + Send,
    S: Sampler + 'static,
{
    fn spawn(&mut self) -> Result<WorkerHandle, WorkerError> {
        ThreadWorker::spawn((self.make_sampler)())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::tests::{CountingSampler, request};
    use lightsim_render::{Orchestrator, RenderState};

    const WAIT: Duration = Duration::from_secs(5);

    fn recv(inbox: &Receiver<Inbound>) -> WorkerMessage {
        match inbox.recv_timeout(WAIT) {
            Ok(Ok(msg)) => msg,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn announces_loaded_then_streams_frames() {
        let WorkerHandle { mut worker, inbox } =
            ThreadWorker::spawn(CountingSampler::default()).unwrap();
        assert_eq!(recv(&inbox), WorkerMessage::Loaded);

        worker.post(request(3)).unwrap();
        let names: Vec<_> = (0..3).map(|_| recv(&inbox).name()).collect();
        assert_eq!(names, vec!["frame", "frame", "lastframe"]);
    }

    #[test]
    fn requests_run_in_order() {
        let WorkerHandle { mut worker, inbox } =
            ThreadWorker::spawn(CountingSampler::default()).unwrap();
        recv(&inbox);
        worker.post(request(1)).unwrap();
        worker.post(request(2)).unwrap();
        let names: Vec<_> = (0..3).map(|_| recv(&inbox).name()).collect();
        assert_eq!(names, vec!["lastframe", "frame", "lastframe"]);
    }

    #[test]
    fn terminated_worker_refuses_requests_and_hangs_up() {
        let WorkerHandle { mut worker, inbox } =
            ThreadWorker::spawn(CountingSampler::default()).unwrap();
        recv(&inbox);
        worker.terminate();
        assert!(matches!(
            worker.post(request(1)),
            Err(WorkerError::Disconnected)
        ));
        assert!(matches!(
            inbox.recv_timeout(WAIT),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn orchestrator_end_to_end() {
        let mut orch = Orchestrator::new(ThreadFactory::new(CountingSampler::default));
        orch.load();
        while orch.state() == &RenderState::Loading {
            assert!(orch.wait(WAIT) > 0, "worker never loaded");
        }
        assert_eq!(orch.state(), &RenderState::Ready);

        let req = request(3);
        orch.render(&req.settings, &req.objects).unwrap();
        while orch.state().is_rendering() {
            orch.wait(WAIT);
        }
        match orch.state() {
            RenderState::Finished { image, stats } => {
                assert_eq!(image.pixel(0, 0), Some([3, 0, 0, 255]));
                assert!(stats.samples_per_second > 0.0);
            }
            other => panic!("expected finished, got {other:?}"),
        }
    }
}
