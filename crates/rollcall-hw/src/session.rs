//! Camera session lifecycle: `Idle → Requesting → Live → Idle`.
//!
//! Acquisition itself happens elsewhere (usually on a blocking thread); the
//! session only tracks which request is current. Every request gets a fresh
//! generation number so a stream that arrives after the request was abandoned
//! can be recognized and stopped.

use crate::camera::CameraError;
use crate::frame;
use crate::media::VideoStream;
use rollcall_core::CapturedImage;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Requesting,
    Live,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Live => "live",
        }
    }
}

pub struct CameraSession {
    state: SessionState,
    generation: u64,
    stream: Option<Arc<dyn VideoStream>>,
    jpeg_quality: u8,
}

impl CameraSession {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            stream: None,
            jpeg_quality,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Start a new request. Returns its generation, or `None` if not Idle.
    pub fn begin_request(&mut self) -> Option<u64> {
        if self.state != SessionState::Idle {
            return None;
        }
        self.generation += 1;
        self.state = SessionState::Requesting;
        tracing::debug!(generation = self.generation, "camera requested");
        Some(self.generation)
    }

    /// Whether `generation` names the request currently in flight.
    pub fn is_pending(&self, generation: u64) -> bool {
        self.state == SessionState::Requesting && self.generation == generation
    }

    /// Attach an acquired stream. A stale stream is stopped and `false` returned.
    pub fn attach(&mut self, generation: u64, stream: Arc<dyn VideoStream>) -> bool {
        if !self.is_pending(generation) {
            tracing::info!(generation, current = self.generation, "discarding stream for abandoned request");
            stream.stop();
            return false;
        }
        tracing::info!(
            generation,
            width = stream.width(),
            height = stream.height(),
            "camera live"
        );
        self.stream = Some(stream);
        self.state = SessionState::Live;
        true
    }

    /// Give up on a request whose acquisition failed.
    pub fn abandon(&mut self, generation: u64) {
        if self.is_pending(generation) {
            self.state = SessionState::Idle;
        }
    }

    /// The live stream, if any.
    pub fn live_stream(&self) -> Option<Arc<dyn VideoStream>> {
        match self.state {
            SessionState::Live => self.stream.clone(),
            _ => None,
        }
    }

    /// Capture a mirrored JPEG still. `None` when not Live or on read failure.
    pub fn capture_frame(&self) -> Option<CapturedImage> {
        let stream = self.live_stream()?;
        match capture_still(stream.as_ref(), self.jpeg_quality) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(error = %e, "still capture failed");
                None
            }
        }
    }

    /// Stop the stream and return to Idle. Returns `false` if already Idle.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
        self.state = SessionState::Idle;
        tracing::info!(generation = self.generation, "camera closed");
        true
    }
}

/// Read one frame, mirror it to match the preview and encode it as JPEG.
pub fn capture_still(stream: &dyn VideoStream, quality: u8) -> Result<CapturedImage, CameraError> {
    let raw = stream.read_frame()?;
    let mirrored = frame::mirror_horizontal(&raw);
    let uri = frame::encode_jpeg_data_uri(&mirrored, quality)?;
    tracing::debug!(sequence = raw.sequence, bytes = uri.len(), "still captured");
    Ok(CapturedImage::from_data_uri(uri))
}
