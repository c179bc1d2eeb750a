//! rollcall-hw — Camera acquisition and still capture.
//!
//! Provides the media-source abstraction with its rear-to-any fallback, a
//! V4L2 backend, the camera session state machine and frame processing
//! (format conversion, mirroring, grayscale, JPEG data URIs).

pub mod camera;
pub mod frame;
pub mod media;
pub mod session;

pub use camera::{CameraError, PixelFormat, V4lMediaSource};
pub use frame::RgbaFrame;
pub use media::{acquire_with_fallback, MediaSource, StreamConstraints, VideoStream};
pub use session::{CameraSession, SessionState};
