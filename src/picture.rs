use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::DocumentError;

pub const ACCEPTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "img", "webp"];

/// An image picked in Image Nerd, decoded once and kept for display.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    image: Arc<DynamicImage>,
    format: Option<ImageFormat>,
}

/// Bytes ready to go out as inline data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

pub fn decode(bytes: &[u8]) -> Result<LoadedImage, DocumentError> {
    let format = image::guess_format(bytes).ok();
    let image = image::load_from_memory(bytes).map_err(|e| DocumentError::Image(e.to_string()))?;

    let (width, height) = image.dimensions();
    tracing::debug!(width, height, ?format, "decoded image");

    Ok(LoadedImage { image: Arc::new(image), format })
}

pub async fn load(path: &Path) -> Result<LoadedImage, DocumentError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(DocumentError::Image(format!(
            "unsupported file type; choose one of {}",
            ACCEPTED_EXTENSIONS.join(", ")
        )));
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| DocumentError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    decode(&bytes)
}

pub const MAX_PREVIEW_HEIGHT: u32 = 1000;

/// Scales to a fixed width, keeping the aspect ratio. Tall images are shrunk
/// further so the preview is never taller than `MAX_PREVIEW_HEIGHT`.
pub fn display_size(width: u32, height: u32, display_width: u32) -> (u32, u32) {
    if width == 0 {
        return (display_width, 0);
    }
    let new_height = display_width as f64 / width as f64 * height as f64;
    if new_height <= MAX_PREVIEW_HEIGHT as f64 {
        return (display_width, new_height as u32);
    }
    let new_width = (display_width as f64 * MAX_PREVIEW_HEIGHT as f64 / new_height) as u32;
    (new_width.max(1), MAX_PREVIEW_HEIGHT)
}

/// Largest size within `max_dim` x `max_dim` that keeps the aspect ratio;
/// `None` when the image already fits.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> Option<(u32, u32)> {
    if width <= max_dim && height <= max_dim {
        return None;
    }
    let scale = (max_dim as f32 / width as f32).min(max_dim as f32 / height as f32);
    Some((((width as f32 * scale) as u32).max(1), ((height as f32 * scale) as u32).max(1)))
}

impl LoadedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// RGBA pixels scaled for the preview, as `(width, height, pixels)`.
    pub fn display_rgba(&self, display_width: u32) -> (u32, u32, Vec<u8>) {
        let (width, height) = self.dimensions();
        let (w, h) = display_size(width, height, display_width);
        let scaled = self
            .image
            .resize_exact(w, h.max(1), image::imageops::FilterType::Triangle)
            .to_rgba8();
        (scaled.width(), scaled.height(), scaled.into_raw())
    }

    /// Re-encodes for the model. JPEG stays JPEG, everything else becomes PNG.
    pub fn encode_for_model(&self, max_dim: u32) -> Result<EncodedImage, DocumentError> {
        let (width, height) = self.dimensions();
        let resized;
        let img: &DynamicImage = match fit_within(width, height, max_dim) {
            Some((w, h)) => {
                tracing::debug!(width, height, w, h, "downscaling image for upload");
                resized = self.image.resize(w, h, image::imageops::FilterType::Lanczos3);
                &resized
            }
            None => self.image.as_ref(),
        };

        let (format, mime_type) = match self.format {
            Some(ImageFormat::Jpeg) => (ImageFormat::Jpeg, "image/jpeg"),
            _ => (ImageFormat::Png, "image/png"),
        };

        let mut data = Vec::new();
        let target = if format == ImageFormat::Jpeg {
            // The JPEG encoder rejects alpha channels.
            DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            img.clone()
        };
        target
            .write_to(&mut std::io::Cursor::new(&mut data), format)
            .map_err(|e| DocumentError::Image(e.to_string()))?;

        tracing::debug!(bytes = data.len(), mime_type, "encoded image");
        Ok(EncodedImage { mime_type, data })
    }
}
