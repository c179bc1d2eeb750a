use rollcall_core::{DetectParams, FaceDetector, FaceRect};
use rollcall_hw::frame::to_grayscale_into;
use rollcall_hw::{CameraError, VideoStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Run the live detection loop on a blocking thread.
///
/// Each pass reads the current (unmirrored) frame, converts it to grayscale,
/// detects faces and hands the boxes to `publish`. A failed read or detection
/// drops that frame only. The loop ends when `token` is cancelled, the
/// stream reports it was stopped, or `publish` returns `false`. The detector
/// is handed back so the next session can reuse it.
pub fn spawn_overlay<F>(
    stream: Arc<dyn VideoStream>,
    mut detector: Box<dyn FaceDetector>,
    params: DetectParams,
    interval: Duration,
    token: CancellationToken,
    mut publish: F,
) -> JoinHandle<Box<dyn FaceDetector>>
where
    F: FnMut(Vec<FaceRect>) -> bool + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut gray = Vec::new();
        let mut passes: u64 = 0;
        let mut dropped: u64 = 0;

        while !token.is_cancelled() {
            passes += 1;
            match stream.read_frame() {
                Ok(frame) => {
                    to_grayscale_into(&frame, &mut gray);
                    match detector.detect(&gray, frame.width, frame.height, &params) {
                        Ok(faces) => {
                            if !publish(faces) {
                                break;
                            }
                        }
                        Err(e) => {
                            dropped += 1;
                            tracing::debug!(error = %e, "detection pass failed; frame dropped");
                        }
                    }
                }
                Err(CameraError::Stopped) => break,
                Err(e) => {
                    dropped += 1;
                    tracing::debug!(error = %e, "overlay frame read failed; frame dropped");
                }
            }
            std::thread::sleep(interval);
        }

        tracing::debug!(passes, dropped, "overlay loop stopped");
        detector
    })
}
