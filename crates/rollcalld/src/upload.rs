use rollcall_core::upload::{RecognitionService, UploadError, UploadResponse};
use rollcall_core::CaptureBuffer;
use std::future::Future;
use std::sync::Arc;

/// Gatekeeper for batch uploads: one in flight at a time, never empty.
pub struct UploadCoordinator<S> {
    service: Arc<S>,
    in_flight: bool,
}

impl<S: RecognitionService> UploadCoordinator<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            in_flight: false,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn can_upload(&self, buffer: &CaptureBuffer) -> bool {
        !self.in_flight && !buffer.is_empty()
    }

    /// Drain the buffer into a submission.
    ///
    /// Returns the batch size and the request future, or `None` when the
    /// buffer is empty or another upload has not resolved yet. Images
    /// captured while the request is in flight stay buffered for the next batch.
    pub fn begin(
        &mut self,
        buffer: &mut CaptureBuffer,
    ) -> Option<(
        usize,
        impl Future<Output = Result<UploadResponse, UploadError>> + Send + 'static,
    )> {
        if self.in_flight {
            tracing::warn!("upload already in flight; request ignored");
            return None;
        }
        if buffer.is_empty() {
            tracing::debug!("nothing buffered; upload skipped");
            return None;
        }
        let images = buffer.drain();
        let count = images.len();
        self.in_flight = true;

        let service = Arc::clone(&self.service);
        Some((count, async move { service.submit(images).await }))
    }

    /// Mark the in-flight upload resolved.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }
}
