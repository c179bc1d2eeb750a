//! Face detection capability.
//!
//! Detection itself is delegated to an external classifier. This module only
//! fixes the seam: a grayscale frame goes in, face rectangles come out. The
//! `opencv` feature provides a Haar cascade backend.

use crate::types::FaceRect;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("classifier asset not found: {0}")]
    ModelNotFound(String),
    #[error("classifier asset could not be loaded: {0}")]
    LoadFailed(String),
    #[error("invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("detection failed: {0}")]
    DetectionFailed(String),
    #[error("no detection backend compiled in (enable the `opencv` feature)")]
    Unsupported,
}

/// Multi-scale detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    /// Image pyramid step between scales.
    pub scale_factor: f64,
    /// Overlapping hits required to keep a candidate.
    pub min_neighbors: u32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
        }
    }
}

/// A loaded face detector.
///
/// Implementations may hold scratch buffers between frames, hence `&mut self`.
pub trait FaceDetector: Send {
    /// Detect faces in a row-major grayscale buffer of `width * height` bytes.
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        params: &DetectParams,
    ) -> Result<Vec<FaceRect>, DetectorError>;
}

/// Reject buffers that are too short for the stated dimensions.
pub fn check_frame(gray: &[u8], width: u32, height: u32) -> Result<(), DetectorError> {
    let expected = width as usize * height as usize;
    if gray.len() < expected {
        return Err(DetectorError::InvalidFrame {
            expected,
            actual: gray.len(),
        });
    }
    Ok(())
}

/// Whether a detection backend is compiled in.
pub const fn backend_available() -> bool {
    cfg!(feature = "opencv")
}

/// Load the compiled-in detection backend from a resolved classifier asset.
pub fn load_detector(asset: &Path) -> Result<Box<dyn FaceDetector>, DetectorError> {
    if !asset.exists() {
        return Err(DetectorError::ModelNotFound(asset.display().to_string()));
    }
    load_backend(asset)
}

#[cfg(feature = "opencv")]
fn load_backend(asset: &Path) -> Result<Box<dyn FaceDetector>, DetectorError> {
    Ok(Box::new(cascade::CascadeDetector::load(asset)?))
}

#[cfg(not(feature = "opencv"))]
fn load_backend(asset: &Path) -> Result<Box<dyn FaceDetector>, DetectorError> {
    tracing::warn!(path = %asset.display(), "classifier resolved but no detection backend is compiled in");
    Err(DetectorError::Unsupported)
}

#[cfg(feature = "opencv")]
pub mod cascade {
    //! Haar cascade detection via OpenCV's `CascadeClassifier`.

    use super::{check_frame, DetectParams, DetectorError, FaceDetector};
    use crate::types::FaceRect;
    use opencv::core::{Mat, Rect, Size, Vector};
    use opencv::objdetect::CascadeClassifier;
    use opencv::prelude::*;
    use std::path::Path;

    pub struct CascadeDetector {
        classifier: CascadeClassifier,
        faces: Vector<Rect>,
    }

    impl CascadeDetector {
        pub fn load(path: &Path) -> Result<Self, DetectorError> {
            let path_str = path.to_string_lossy();
            let classifier = CascadeClassifier::new(&path_str)
                .map_err(|e| DetectorError::LoadFailed(format!("{path_str}: {e}")))?;
            let empty = classifier
                .empty()
                .map_err(|e| DetectorError::LoadFailed(e.to_string()))?;
            if empty {
                return Err(DetectorError::LoadFailed(format!(
                    "{path_str}: classifier is empty"
                )));
            }
            tracing::info!(path = %path_str, "loaded cascade classifier");
            Ok(Self {
                classifier,
                faces: Vector::new(),
            })
        }
    }

    impl FaceDetector for CascadeDetector {
        fn detect(
            &mut self,
            gray: &[u8],
            width: u32,
            height: u32,
            params: &DetectParams,
        ) -> Result<Vec<FaceRect>, DetectorError> {
            check_frame(gray, width, height)?;
            let pixels = width as usize * height as usize;
            let failed = |e: opencv::Error| DetectorError::DetectionFailed(e.to_string());

            let mat = Mat::new_rows_cols_with_data(height as i32, width as i32, &gray[..pixels])
                .map_err(failed)?
                .try_clone()
                .map_err(failed)?;

            self.faces.clear();
            self.classifier
                .detect_multi_scale(
                    &mat,
                    &mut self.faces,
                    params.scale_factor,
                    params.min_neighbors as i32,
                    0,
                    Size::new(0, 0),
                    Size::new(0, 0),
                )
                .map_err(failed)?;

            Ok(self
                .faces
                .iter()
                .map(|r| FaceRect {
                    x: r.x,
                    y: r.y,
                    width: r.width,
                    height: r.height,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let p = DetectParams::default();
        assert_eq!(p.scale_factor, 1.1);
        assert_eq!(p.min_neighbors, 3);
    }

    #[test]
    fn test_check_frame_short_buffer() {
        match check_frame(&[0u8; 5], 3, 2) {
            Err(DetectorError::InvalidFrame { expected, actual }) => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 5);
            }
            other => panic!("expected InvalidFrame, got {other:?}"),
        }
    }

    #[test]
    fn test_check_frame_exact() {
        assert!(check_frame(&[0u8; 6], 3, 2).is_ok());
    }

    #[test]
    fn test_load_missing_asset() {
        let result = load_detector(Path::new("/nonexistent/face.xml"));
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_no_backend_by_default() {
        assert!(!backend_available());
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_backend_with_opencv() {
        assert!(backend_available());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_load_without_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.xml");
        std::fs::write(&path, b"<opencv_storage/>").unwrap();
        assert!(matches!(load_detector(&path), Err(DetectorError::Unsupported)));
    }
}
