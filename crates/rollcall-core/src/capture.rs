//! Pending captures awaiting upload.

use crate::types::CapturedImage;

/// Insertion-ordered, unbounded buffer of captured stills.
///
/// Owned by a single controller, so `drain` needs no synchronization to be
/// atomic with respect to `append`.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    images: Vec<CapturedImage>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, image: CapturedImage) {
        self.images.push(image);
        tracing::debug!(buffered = self.images.len(), "capture appended");
    }

    /// Take every buffered image in insertion order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<CapturedImage> {
        std::mem::take(&mut self.images)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[CapturedImage] {
        &self.images
    }
}
