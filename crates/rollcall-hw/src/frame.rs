//! Frame type and pixel processing: format conversion, mirroring, grayscale, JPEG stills.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// A captured RGBA camera frame.
#[derive(Clone)]
pub struct RgbaFrame {
    /// RGBA pixel data (width * height * 4 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl RgbaFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = pixel_count(width, height) * 4;
        if expected == 0 || data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert packed YUYV (4:2:2) to RGBA with BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgba(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = pixel_count(width, height) * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    let mut rgba = Vec::with_capacity(pixel_count(width, height) * 4);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0] as f32, quad[2] as f32] {
            rgba.push(clamp_u8(y + 1.402 * v));
            rgba.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgba.push(clamp_u8(y + 1.772 * u));
            rgba.push(255);
        }
    }
    Ok(rgba)
}

/// Expand 8-bit grayscale to opaque RGBA.
pub fn grey_to_rgba(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = pixel_count(width, height);
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(grey[..expected]
        .iter()
        .flat_map(|&g| [g, g, g, 255])
        .collect())
}

/// Expand packed 24-bit RGB to opaque RGBA.
pub fn rgb_to_rgba(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = pixel_count(width, height) * 3;
    if rgb.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: rgb.len(),
        });
    }
    Ok(rgb[..expected]
        .chunks_exact(3)
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect())
}

/// RGBA to 8-bit luma (0.299 R + 0.587 G + 0.114 B), written into `out`.
///
/// `out` is resized as needed so the overlay loop can reuse one buffer.
pub fn to_grayscale_into(frame: &RgbaFrame, out: &mut Vec<u8>) {
    let pixels = pixel_count(frame.width, frame.height);
    out.clear();
    out.reserve(pixels);
    out.extend(frame.data[..pixels * 4].chunks_exact(4).map(|p| {
        clamp_u8(0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
    }));
}

pub fn to_grayscale(frame: &RgbaFrame) -> Vec<u8> {
    let mut out = Vec::new();
    to_grayscale_into(frame, &mut out);
    out
}

/// Flip a frame left-to-right.
pub fn mirror_horizontal(frame: &RgbaFrame) -> RgbaFrame {
    let w = frame.width as usize;
    let row_bytes = w * 4;
    let mut data = Vec::with_capacity(frame.data.len());
    for row in frame.data.chunks_exact(row_bytes).take(frame.height as usize) {
        for px in row.chunks_exact(4).rev() {
            data.extend_from_slice(px);
        }
    }
    RgbaFrame {
        data,
        width: frame.width,
        height: frame.height,
        timestamp: frame.timestamp,
        sequence: frame.sequence,
    }
}

/// Encode a frame as a `data:image/jpeg;base64,...` URI at the given quality (1–100).
pub fn encode_jpeg_data_uri(frame: &RgbaFrame, quality: u8) -> Result<String, FrameError> {
    let pixels = pixel_count(frame.width, frame.height);
    // JPEG carries no alpha channel.
    let rgb: Vec<u8> = frame.data[..pixels * 4]
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| FrameError::Encode(e.to_string()))?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}
