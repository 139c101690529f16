//! Compute workers: the numerical side of the render boundary.
//!
//! A worker owns a [`Sampler`] and answers render requests with a stream of
//! progressively refined images. Two transports are provided:
//! - [`ThreadFactory`] runs each worker on its own OS thread.
//! - [`ProcessFactory`] runs each worker as a child process speaking JSON lines;
//!   the child side is [`serve`].
//!
//! [`TraceSampler`] is the bundled CPU path tracer.

mod process;
mod session;
mod thread;
mod trace;

pub use process::{ProcessFactory, ProcessWorker, serve};
pub use session::{Sampler, SessionEnd, run_session, validate_request};
pub use thread::{ThreadFactory, ThreadWorker};
pub use trace::TraceSampler;
