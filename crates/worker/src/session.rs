use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use lightsim_common::{PixelBuffer, RenderStats};
use lightsim_render::{RenderRequest, WorkerMessage};

/// Produces successive estimates of one image.
pub trait Sampler: Send {
    /// Set up for `request`, discarding any previous accumulation.
    /// An `Err` is reported to the orchestrator as a compute error.
    fn prepare(&mut self, request: &RenderRequest) -> Result<(), String>;

    /// Accumulate one more pass and return the current estimate.
    fn sample(&mut self) -> PixelBuffer;
}

/// How a render session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// `lastframe` was delivered.
    Completed,
    /// The request was refused with an `error` message.
    Rejected,
    /// Stop was requested or the receiver went away.
    Stopped,
}

/// Check a request before any sampling happens.
pub fn validate_request(request: &RenderRequest) -> Result<(), String> {
    request.settings.validate().map_err(|e| e.to_string())?;
    for (index, object) in request.objects.iter().enumerate() {
        object
            .validate()
            .map_err(|e| format!("object {index}: {e}"))?;
    }
    Ok(())
}

/// Run one request to completion.
///
/// Sends `frame` after passes 1..N-1 and `lastframe` after pass N, or a single
/// `error` if the request is refused. `emit` returns false once nobody is
/// listening; `stop` is checked before every pass.
pub fn run_session<S>(
    sampler: &mut S,
    request: &RenderRequest,
    stop: &AtomicBool,
    mut emit: impl FnMut(WorkerMessage) -> bool,
) -> SessionEnd
where
    S: Sampler + ?Sized,
{
    let total = request.samples();
    let span = tracing::info_span!("render_session", samples = total);
    let _enter = span.enter();

    if let Err(error) = validate_request(request).and_then(|()| sampler.prepare(request)) {
        tracing::warn!(%error, "request rejected");
        emit(WorkerMessage::Error { error });
        return SessionEnd::Rejected;
    }

    let started = Instant::now();
    for pass in 1..=total {
        if stop.load(Ordering::Relaxed) {
            tracing::debug!(pass, "stop requested");
            return SessionEnd::Stopped;
        }
        let image = sampler.sample();
        let msg = if pass < total {
            WorkerMessage::Frame {
                progress: pass as f64 / total as f64,
                image,
            }
        } else {
            let stats = RenderStats::from_timing(
                total,
                started.elapsed(),
                request.settings.width,
                request.settings.height,
            );
            WorkerMessage::LastFrame { image, stats }
        };
        if !emit(msg) {
            tracing::debug!(pass, "receiver gone");
            return SessionEnd::Stopped;
        }
    }
    tracing::debug!(elapsed = ?started.elapsed(), "session complete");
    SessionEnd::Completed
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lightsim_common::{RenderSettings, SceneObject, default_object};
    use proptest::prelude::*;

    /// Sampler whose pass count is visible in every pixel.
    #[derive(Default)]
    pub(crate) struct CountingSampler {
        width: u32,
        height: u32,
        passes: u8,
    }

    impl Sampler for CountingSampler {
        fn prepare(&mut self, request: &RenderRequest) -> Result<(), String> {
            if request.objects.len() > 3 {
                return Err("too many objects".into());
            }
            self.width = request.settings.width;
            self.height = request.settings.height;
            self.passes = 0;
            Ok(())
        }

        fn sample(&mut self) -> PixelBuffer {
            self.passes += 1;
            let mut image = PixelBuffer::new(self.width, self.height);
            image.set_pixel(0, 0, [self.passes, 0, 0, 255]);
            image
        }
    }

    pub(crate) fn request(samples: u32) -> RenderRequest {
        RenderRequest::new(
            vec![default_object()],
            RenderSettings {
                width: 2,
                height: 2,
                samples_per_pixel: samples,
                ..RenderSettings::default()
            },
        )
    }

    fn collect(req: &RenderRequest) -> (SessionEnd, Vec<WorkerMessage>) {
        let mut sent = Vec::new();
        let end = run_session(
            &mut CountingSampler::default(),
            req,
            &AtomicBool::new(false),
            |m| {
                sent.push(m);
                true
            },
        );
        (end, sent)
    }

    #[test]
    fn three_samples_two_frames_then_last() {
        let (end, sent) = collect(&request(3));
        assert_eq!(end, SessionEnd::Completed);
        let names: Vec<_> = sent.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["frame", "frame", "lastframe"]);
        match &sent[1] {
            WorkerMessage::Frame { progress, image } => {
                assert_eq!(*progress, 2.0 / 3.0);
                assert_eq!(image.pixel(0, 0), Some([2, 0, 0, 255]));
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn single_sample_is_only_lastframe() {
        let (_, sent) = collect(&request(1));
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], WorkerMessage::LastFrame { .. }));
    }

    #[test]
    fn invalid_object_is_rejected_before_sampling() {
        let mut req = request(3);
        req.objects.push(SceneObject {
            radius: -1.0,
            ..SceneObject::default()
        });
        let (end, sent) = collect(&req);
        assert_eq!(end, SessionEnd::Rejected);
        match &sent[..] {
            [WorkerMessage::Error { error }] => assert!(error.starts_with("object 1")),
            other => panic!("expected one error, got {other:?}"),
        }
    }

    #[test]
    fn sampler_refusal_is_reported() {
        let mut req = request(2);
        req.objects = vec![default_object(); 4];
        let (end, sent) = collect(&req);
        assert_eq!(end, SessionEnd::Rejected);
        assert_eq!(
            sent,
            vec![WorkerMessage::Error {
                error: "too many objects".into()
            }]
        );
    }

    #[test]
    fn stops_when_receiver_gone() {
        let mut count = 0;
        let end = run_session(
            &mut CountingSampler::default(),
            &request(5),
            &AtomicBool::new(false),
            |_| {
                count += 1;
                count < 2
            },
        );
        assert_eq!(end, SessionEnd::Stopped);
        assert_eq!(count, 2);
    }

    #[test]
    fn stop_flag_halts_before_sampling() {
        let mut sent = 0;
        let end = run_session(
            &mut CountingSampler::default(),
            &request(5),
            &AtomicBool::new(true),
            |_| {
                sent += 1;
                true
            },
        );
        assert_eq!(end, SessionEnd::Stopped);
        assert_eq!(sent, 0);
    }

    proptest! {
        #[test]
        fn progress_is_pass_over_total(samples in 1u32..64) {
            let (end, sent) = collect(&request(samples));
            prop_assert_eq!(end, SessionEnd::Completed);
            prop_assert_eq!(sent.len(), samples as usize);

            let (last, frames) = sent.split_last().unwrap();
            prop_assert!(matches!(last, WorkerMessage::LastFrame { .. }), "ended with {}", last.name());
            for (i, msg) in frames.iter().enumerate() {
                match msg {
                    WorkerMessage::Frame { progress, .. } => {
                        prop_assert_eq!(*progress, (i + 1) as f64 / samples as f64);
                        prop_assert!(*progress < 1.0);
                    }
                    other => prop_assert!(false, "expected frame, got {}", other.name()),
                }
            }
        }
    }
}
