//! Image source adapter: normalizes file picks, drag-and-drop lists, and live
//! camera captures into a single validated [`ImagePayload`].

use std::io::Cursor;

use crate::models::payload::{ImageMime, ImagePayload, MAX_UPLOAD_BYTES};

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("image is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("image data is empty")]
    EmptyPayload,

    #[error("no image file among dropped items")]
    NoImageInDrop,

    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("captured frame is malformed: {0}")]
    MalformedFrame(String),

    #[error("failed to encode captured frame: {0}")]
    FrameEncode(#[from] image::ImageError),
}

/// Build a payload from a fully-read file. The declared content type must be
/// on the whitelist and the content itself must sniff as a supported image;
/// the sniffed format wins when the two disagree.
pub fn from_file(
    file_name: &str,
    content_type: &str,
    bytes: Vec<u8>,
) -> Result<ImagePayload, AcquireError> {
    let declared = ImageMime::from_content_type(content_type)
        .ok_or_else(|| AcquireError::UnsupportedFormat(content_type.to_string()))?;

    if bytes.is_empty() {
        return Err(AcquireError::EmptyPayload);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AcquireError::PayloadTooLarge {
            size: bytes.len(),
            max: MAX_UPLOAD_BYTES,
        });
    }

    let sniffed = match image::guess_format(&bytes) {
        Ok(image::ImageFormat::Jpeg) => ImageMime::Jpeg,
        Ok(image::ImageFormat::Png) => ImageMime::Png,
        Ok(image::ImageFormat::WebP) => ImageMime::Webp,
        _ => {
            return Err(AcquireError::UnsupportedFormat(format!(
                "{file_name}: content is not a supported image"
            )))
        }
    };

    if sniffed != declared {
        tracing::debug!(
            file_name,
            declared = %declared,
            sniffed = %sniffed,
            "declared content type disagrees with sniffed format"
        );
    }

    Ok(ImagePayload::new(bytes, sniffed))
}

/// One entry from a drag-and-drop event.
#[derive(Debug, Clone)]
pub struct DroppedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Select the first dropped entry with an `image/` content type and delegate
/// to [`from_file`].
pub fn from_drop(items: Vec<DroppedFile>) -> Result<ImagePayload, AcquireError> {
    let item = items
        .into_iter()
        .find(|item| item.content_type.starts_with("image/"))
        .ok_or(AcquireError::NoImageInDrop)?;
    from_file(&item.file_name, &item.content_type, item.bytes)
}

/// One decoded still frame from a capture device: tightly-packed 8-bit RGB.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A camera-like capture device. Opening acquires exclusive ownership of the
/// device; implementations reject a second open while a stream is live.
pub trait CaptureDevice: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureStream>, AcquireError>;
}

/// An open capture stream. `release` must be idempotent.
pub trait CaptureStream: Send {
    fn still_frame(&mut self) -> Result<RawFrame, AcquireError>;
    fn release(&mut self);
}

/// Scoped camera ownership. The device is released in `Drop`, so every exit
/// path — capture, abort, or error — gives it back.
pub struct CameraSession {
    stream: Option<Box<dyn CaptureStream>>,
}

impl CameraSession {
    pub fn open(device: &dyn CaptureDevice) -> Result<Self, AcquireError> {
        let stream = device.open()?;
        tracing::debug!("capture device acquired");
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Grab one still frame, encode it as JPEG, and release the device.
    pub fn capture(mut self) -> Result<ImagePayload, AcquireError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AcquireError::CaptureUnavailable("session already closed".into()))?;
        let frame = stream.still_frame()?;
        drop(self); // release before the (potentially slow) encode
        encode_frame_as_jpeg(frame)
    }

    /// Abandon the session without capturing.
    pub fn abort(self) {}
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            tracing::debug!("capture device released");
        }
    }
}

/// Convenience wrapper for the single-shot capture flow.
pub fn from_camera_capture(device: &dyn CaptureDevice) -> Result<ImagePayload, AcquireError> {
    CameraSession::open(device)?.capture()
}

fn encode_frame_as_jpeg(frame: RawFrame) -> Result<ImagePayload, AcquireError> {
    let buffer = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels)
        .ok_or_else(|| {
            AcquireError::MalformedFrame(format!(
                "pixel buffer does not match {}x{} RGB dimensions",
                frame.width, frame.height
            ))
        })?;

    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(buffer).write_to(&mut out, image::ImageFormat::Jpeg)?;
    let bytes = out.into_inner();

    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AcquireError::PayloadTooLarge {
            size: bytes.len(),
            max: MAX_UPLOAD_BYTES,
        });
    }
    Ok(ImagePayload::new(bytes, ImageMime::Jpeg))
}
