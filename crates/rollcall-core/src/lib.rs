//! rollcall-core — Attendance workflow core.
//!
//! Roster store, capture batching, reconciliation of recognition results,
//! roster views, the recognition-service client and the face-detection seam.

pub mod asset;
pub mod capture;
pub mod detector;
pub mod presentation;
pub mod reconcile;
pub mod roster;
pub mod types;
pub mod upload;

pub use capture::CaptureBuffer;
pub use detector::{DetectParams, DetectorError, FaceDetector};
pub use reconcile::reconcile;
pub use roster::{Roster, RosterError};
pub use types::{CapturedImage, FaceRect, StudentRecord};
pub use upload::{HttpRecognitionService, RecognitionService, UploadError, UploadResponse};
