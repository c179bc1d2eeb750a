//! V4L2 camera backend via the `v4l` crate.

use crate::frame::{self, FrameError, RgbaFrame};
use crate::media::{MediaSource, StreamConstraints, VideoStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("stream stopped")]
    Stopped,
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// Packed 24-bit RGB.
    Rgb3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(Self::Grey)
        } else if fourcc == FourCC::new(b"RGB3") {
            Some(Self::Rgb3)
        } else {
            None
        }
    }
}

/// Hands out streams from V4L2 devices.
///
/// Constrained requests (rear-facing, fixed resolution) open the configured
/// device and negotiate YUYV at the requested size. Unconstrained requests
/// open the first capture device in its current format.
pub struct V4lMediaSource {
    device_path: String,
}

impl V4lMediaSource {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }
}

impl MediaSource for V4lMediaSource {
    fn acquire(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        let stream = if constraints.is_unconstrained() {
            let device = list_devices()
                .into_iter()
                .next()
                .ok_or_else(|| CameraError::DeviceNotFound("no V4L2 capture devices".into()))?;
            V4lStream::open(&device.path, None)?
        } else {
            let size = constraints.width.zip(constraints.height);
            tracing::debug!(device = %self.device_path, facing = ?constraints.facing, "constrained camera request");
            V4lStream::open(&self.device_path, size)?
        };
        Ok(Box::new(stream))
    }
}

/// An open V4L2 capture device with its mmap buffer queue.
///
/// The queue is created once in `open` and released by `stop`, which
/// turns streaming off on the device.
pub struct V4lStream {
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    stopped: AtomicBool,
    /// `None` once stopped.
    stream: Mutex<Option<MmapStream<'static>>>,
}

impl V4lStream {
    /// Open a device, optionally negotiating YUYV at `size`.
    pub fn open(device_path: &str, size: Option<(u32, u32)>) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        let negotiated = match size {
            Some((width, height)) => {
                fmt.fourcc = FourCC::new(b"YUYV");
                fmt.width = width;
                fmt.height = height;
                device.set_format(&fmt).map_err(|e| {
                    CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
                })?
            }
            None => fmt,
        };

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or RGB3)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "opened camera"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, 4).map_err(|e| {
            CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
        })?;

        Ok(Self {
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc: negotiated.fourcc,
            pixel_format,
            stopped: AtomicBool::new(false),
            stream: Mutex::new(Some(stream)),
        })
    }

    fn buf_to_rgba(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let rgba = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgba(buf, self.width, self.height)?,
            PixelFormat::Grey => frame::grey_to_rgba(buf, self.width, self.height)?,
            PixelFormat::Rgb3 => frame::rgb_to_rgba(buf, self.width, self.height)?,
        };
        Ok(rgba)
    }
}

impl VideoStream for V4lStream {
    fn read_frame(&self) -> Result<RgbaFrame, CameraError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(CameraError::Stopped);
        }
        let mut guard = self.stream.lock().unwrap_or_else(|p| p.into_inner());
        let stream = guard.as_mut().ok_or(CameraError::Stopped)?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let rgba = self.buf_to_rgba(buf)?;
        Ok(RgbaFrame::new(rgba, self.width, self.height, meta.sequence)?)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            // Waits out an in-progress dequeue before releasing the buffers.
            let released = self
                .stream
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .take();
            drop(released);
            tracing::info!(device = %self.device_path, "camera stream stopped");
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card.clone(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
        });
    }

    devices
}
