//! Media capability: stream constraints, acquisition and the one-shot fallback.

use crate::camera::CameraError;
use crate::frame::RgbaFrame;
use serde::Serialize;

/// Which way the requested camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, pointed at the room.
    Environment,
    /// Front camera, pointed at the operator.
    User,
}

/// What to ask the media source for. `None` fields are left to the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamConstraints {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub facing: Option<FacingMode>,
}

impl StreamConstraints {
    /// Rear-facing camera at the given resolution.
    pub fn preferred(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            facing: Some(FacingMode::Environment),
        }
    }

    /// Any camera, any resolution.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        self == &Self::default()
    }
}

/// A live video stream.
pub trait VideoStream: Send + Sync {
    /// Read the current frame.
    fn read_frame(&self) -> Result<RgbaFrame, CameraError>;

    /// Stop the stream. Later reads fail with [`CameraError::Stopped`].
    fn stop(&self);

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Something that can hand out video streams.
pub trait MediaSource: Send + Sync {
    fn acquire(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// Acquire with `preferred` constraints, retrying once unconstrained.
///
/// Blocking; callers on an async runtime should run this on a blocking thread.
pub fn acquire_with_fallback(
    source: &dyn MediaSource,
    preferred: &StreamConstraints,
) -> Result<Box<dyn VideoStream>, CameraError> {
    match source.acquire(preferred) {
        Ok(stream) => Ok(stream),
        Err(first) => {
            tracing::warn!(error = %first, ?preferred, "camera access error; retrying unconstrained");
            source
                .acquire(&StreamConstraints::unconstrained())
                .map_err(|e| {
                    tracing::error!(error = %e, "camera access failed entirely");
                    e
                })
        }
    }
}
