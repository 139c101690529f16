//! Test fake: a worker whose messages are injected by the test.
//!
//! Every spawned worker gets a link index (0, 1, ...). Tests push messages
//! into a link and inspect the requests it received.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use lightsim_common::{PixelBuffer, RenderStats};

use crate::protocol::{Inbound, ProtocolError, RenderRequest, WorkerMessage};
use crate::worker::{ComputeWorker, WorkerError, WorkerFactory, WorkerHandle};

#[derive(Default)]
struct Link {
    outbox: Option<Sender<Inbound>>,
    requests: Vec<RenderRequest>,
    terminated: bool,
}

#[derive(Default)]
struct Script {
    links: Vec<Link>,
    silent: bool,
    fail_next_spawn: Option<String>,
}

/// Factory for scripted workers. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFactory {
    /// Workers announce `loaded` as soon as they are spawned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Workers never announce `loaded` on their own.
    pub fn silent() -> Self {
        let factory = Self::default();
        factory.lock().silent = true;
        factory
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Make the next `spawn` fail with `message`.
    pub fn fail_next_spawn(&self, message: &str) {
        self.lock().fail_next_spawn = Some(message.to_owned());
    }

    pub fn spawn_count(&self) -> usize {
        self.lock().links.len()
    }

    /// Deliver a message from worker `link`. Returns false if the receiver is gone.
    pub fn send(&self, link: usize, msg: WorkerMessage) -> bool {
        self.send_inbound(link, Ok(msg))
    }

    /// Deliver undecodable data from worker `link`.
    pub fn send_garbage(&self, link: usize, text: &str) -> bool {
        let err = serde_json::from_str::<WorkerMessage>(text)
            .err()
            .map(ProtocolError::from);
        match err {
            Some(err) => self.send_inbound(link, Err(err)),
            None => false,
        }
    }

    fn send_inbound(&self, link: usize, inbound: Inbound) -> bool {
        let script = self.lock();
        script
            .links
            .get(link)
            .and_then(|l| l.outbox.as_ref())
            .is_some_and(|tx| tx.send(inbound).is_ok())
    }

    /// Simulate a crash: drop the worker's sending side.
    pub fn crash(&self, link: usize) {
        if let Some(l) = self.lock().links.get_mut(link) {
            l.outbox = None;
        }
    }

    /// Requests worker `link` has received, in order.
    pub fn requests(&self, link: usize) -> Vec<RenderRequest> {
        self.lock()
            .links
            .get(link)
            .map(|l| l.requests.clone())
            .unwrap_or_default()
    }

    pub fn is_terminated(&self, link: usize) -> bool {
        self.lock().links.get(link).is_some_and(|l| l.terminated)
    }

    /// Play a well-behaved response to a request of `samples` passes:
    /// frames for 1..N-1, then `lastframe`.
    pub fn play_render(&self, link: usize, samples: u32, width: u32, height: u32) {
        for i in 1..samples {
            self.send(
                link,
                WorkerMessage::Frame {
                    progress: i as f64 / samples as f64,
                    image: PixelBuffer::new(width, height),
                },
            );
        }
        self.send(
            link,
            WorkerMessage::LastFrame {
                image: PixelBuffer::new(width, height),
                stats: RenderStats::default(),
            },
        );
    }
}

impl WorkerFactory for ScriptedFactory {
    fn spawn(&mut self) -> Result<WorkerHandle, WorkerError> {
        let mut script = self.lock();
        if let Some(message) = script.fail_next_spawn.take() {
            return Err(WorkerError::Spawn(message));
        }
        let (tx, rx) = mpsc::channel();
        if !script.silent {
            let _ = tx.send(Ok(WorkerMessage::Loaded));
        }
        let index = script.links.len();
        script.links.push(Link {
            outbox: Some(tx),
            ..Link::default()
        });
        drop(script);
        let worker = ScriptedWorker {
            index,
            script: Arc::clone(&self.script),
        };
        Ok(WorkerHandle::new(Box::new(worker), rx))
    }
}

struct ScriptedWorker {
    index: usize,
    script: Arc<Mutex<Script>>,
}

impl ComputeWorker for ScriptedWorker {
    fn post(&mut self, request: RenderRequest) -> Result<(), WorkerError> {
        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        let link = script
            .links
            .get_mut(self.index)
            .ok_or(WorkerError::Disconnected)?;
        if link.terminated || link.outbox.is_none() {
            return Err(WorkerError::Disconnected);
        }
        link.requests.push(request);
        Ok(())
    }

    fn terminate(&mut self) {
        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(link) = script.links.get_mut(self.index) {
            link.terminated = true;
        }
    }
}
