use std::time::Duration;

use lightsim_common::{PixelBuffer, RenderStats};
use lightsim_events::Notification;
use serde::{Deserialize, Serialize};

/// The observable state of the renderer.
///
/// ```text
/// loading -> ready -> rendering -> finished | error
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RenderState {
    /// Worker not ready yet.
    Loading,
    /// Worker loaded and idle.
    Ready,
    /// A render is in flight. `progress` is in [0, 1]; `image` is absent until the first frame.
    Rendering {
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<PixelBuffer>,
    },
    Finished {
        image: PixelBuffer,
        stats: RenderStats,
    },
    Error {
        message: String,
    },
}

impl RenderState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Rendering { .. } => "rendering",
            Self::Finished { .. } => "finished",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_rendering(&self) -> bool {
        matches!(self, Self::Rendering { .. })
    }

    /// Finished or failed; nothing more will happen without user action.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Error { .. })
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Rendering { progress, .. } => Some(*progress),
            Self::Finished { .. } => Some(1.0),
            _ => None,
        }
    }

    /// Latest image, partial or final.
    pub fn image(&self) -> Option<&PixelBuffer> {
        match self {
            Self::Rendering { image, .. } => image.as_ref(),
            Self::Finished { image, .. } => Some(image),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<&RenderStats> {
        match self {
            Self::Finished { stats, .. } => Some(stats),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Why the renderer entered the error state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderFailure {
    /// The worker did not signal readiness in time.
    #[error("renderer failed to load: timed out after {}s", .0.as_secs())]
    LoadTimeout(Duration),
    /// The worker crashed, disconnected, or broke the protocol.
    #[error("renderer worker failed: {0}")]
    WorkerFault(String),
    /// The worker reported that it could not render the request.
    #[error("render failed: {0}")]
    ComputeError(String),
}

impl RenderFailure {
    /// Whether the worker that produced this failure is still usable.
    pub fn worker_survives(&self) -> bool {
        matches!(self, Self::ComputeError(_))
    }
}

/// Notification kinds published by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderEventKind {
    StateChange,
}

/// Orchestrator notifications. Each carries the full new state.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    StateChange(RenderState),
}

impl Notification for RenderEvent {
    type Kind = RenderEventKind;

    fn kind(&self) -> RenderEventKind {
        match self {
            Self::StateChange(_) => RenderEventKind::StateChange,
        }
    }
}

impl RenderEvent {
    pub fn state(&self) -> &RenderState {
        match self {
            Self::StateChange(state) => state,
        }
    }
}
