//! Worker message protocol.
//!
//! One message is one tagged JSON record:
//! ```text
//! to worker:   {"type":"renderRequest","objects":[...],"settings":{...}}
//! from worker: {"type":"loaded"}
//!              {"type":"frame","progress":0.5,"image":{...}}
//!              {"type":"lastframe","image":{...},"stats":{...}}
//!              {"type":"error","error":"..."}
//! ```
//! Per request the worker sends zero or more `frame` records with strictly
//! increasing progress, then exactly one terminal `lastframe` or `error`.

use lightsim_common::{PixelBuffer, RenderSettings, RenderStats, SceneObject};
use serde::{Deserialize, Serialize};

/// Errors decoding or encoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Everything the worker needs for one render. Always an owned copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub objects: Vec<SceneObject>,
    pub settings: RenderSettings,
}

impl RenderRequest {
    pub fn new(objects: Vec<SceneObject>, settings: RenderSettings) -> Self {
        Self { objects, settings }
    }

    pub fn samples(&self) -> u32 {
        self.settings.samples_per_pixel
    }
}

/// Messages sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToWorker {
    RenderRequest(RenderRequest),
}

/// Messages sent by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    /// Worker started and can accept requests. Sent once, before anything else.
    Loaded,
    /// Intermediate result after sample `i` of `N`, with `progress = i / N`.
    Frame { progress: f64, image: PixelBuffer },
    /// Terminal success: the final image.
    #[serde(rename = "lastframe")]
    LastFrame {
        image: PixelBuffer,
        stats: RenderStats,
    },
    /// Terminal failure.
    Error { error: String },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LastFrame { .. } | Self::Error { .. })
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Frame { .. } => "frame",
            Self::LastFrame { .. } => "lastframe",
            Self::Error { .. } => "error",
        }
    }
}

/// What arrives in an orchestrator inbox: a message, or data that failed to decode.
pub type Inbound = Result<WorkerMessage, ProtocolError>;

pub fn encode_to_worker(msg: &ToWorker) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode_to_worker(text: &str) -> Result<ToWorker, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_from_worker(msg: &WorkerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode_from_worker(text: &str) -> Result<WorkerMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightsim_common::default_object;

    #[test]
    fn render_request_wire_shape() {
        let msg = ToWorker::RenderRequest(RenderRequest::new(
            vec![default_object()],
            RenderSettings::default(),
        ));
        let json: serde_json::Value =
            serde_json::from_str(&encode_to_worker(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "renderRequest");
        assert_eq!(json["objects"][0]["radius"], 1.0);
        assert_eq!(json["settings"]["samplesPerPixel"], 10);
        assert_eq!(decode_to_worker(&json.to_string()).unwrap(), msg);
    }

    #[test]
    fn worker_message_tags() {
        let image = PixelBuffer::new(1, 1);
        let cases = [
            (WorkerMessage::Loaded, "loaded"),
            (
                WorkerMessage::Frame {
                    progress: 0.5,
                    image: image.clone(),
                },
                "frame",
            ),
            (
                WorkerMessage::LastFrame {
                    image,
                    stats: RenderStats::default(),
                },
                "lastframe",
            ),
            (
                WorkerMessage::Error {
                    error: "boom".into(),
                },
                "error",
            ),
        ];
        for (msg, tag) in cases {
            let text = encode_from_worker(&msg).unwrap();
            let json: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(json["type"], tag);
            assert_eq!(msg.name(), tag);
            assert_eq!(decode_from_worker(&text).unwrap(), msg);
        }
    }

    #[test]
    fn lastframe_stats_are_camel_case() {
        let text = r#"{"type":"lastframe","image":{"width":1,"height":1,"data":[0,0,0,255]},
            "stats":{"samplesPerSecond":2.5,"totalRenderTime":4.0,"megapixelsPerSecond":0.0}}"#;
        match decode_from_worker(text).unwrap() {
            WorkerMessage::LastFrame { stats, .. } => assert_eq!(stats.samples_per_second, 2.5),
            other => panic!("expected lastframe, got {other:?}"),
        }
    }

    #[test]
    fn error_field_is_named_error() {
        let msg = decode_from_worker(r#"{"type":"error","error":"bad scene"}"#).unwrap();
        assert_eq!(
            msg,
            WorkerMessage::Error {
                error: "bad scene".into()
            }
        );
        assert!(msg.is_terminal());
    }

    #[test]
    fn unknown_or_broken_messages_are_errors() {
        assert!(decode_from_worker(r#"{"type":"explode"}"#).is_err());
        assert!(decode_from_worker("not json").is_err());
        assert!(decode_from_worker(
            r#"{"type":"frame","progress":0.5,"image":{"width":2,"height":2,"data":[0]}}"#
        )
        .is_err());
    }
}
