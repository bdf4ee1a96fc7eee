use anyhow::Result;
use base64::{engine::general_purpose, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, RgbImage, Rgba, RgbaImage};
use std::path::Path;

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "avif", "heic", "heif",
];

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Limits applied while turning a photo into an upload-ready JPEG.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Largest accepted source file (10 MiB).
    pub max_file_bytes: usize,
    /// Smaller files are treated as corrupted.
    pub min_file_bytes: usize,
    /// Data URI length the quality back-off aims for.
    pub max_data_uri_len: usize,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            min_file_bytes: 1000,
            max_data_uri_len: 5_000_000,
            initial_quality: 90,
            min_quality: 30,
            quality_step: 10,
        }
    }
}

/// A photo as picked by the user, before any decoding.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// Declared media type; empty when unknown.
    pub mime_type: String,
    pub file_name: String,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Reads a local file, declaring its type from the extension the way a
    /// browser file picker does.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_type_for_extension(extension_of(&file_name).as_deref()).unwrap_or("");

        log::debug!(
            "📊 Read {} ({} bytes, type: '{}')",
            file_name,
            bytes.len(),
            mime_type
        );

        Ok(Self::new(bytes, mime_type, file_name))
    }

    fn extension(&self) -> Option<String> {
        extension_of(&self.file_name)
    }

    pub fn is_heic(&self) -> bool {
        matches!(self.mime_type.as_str(), "image/heic" | "image/heif")
            || matches!(self.extension().as_deref(), Some("heic" | "heif"))
    }
}

/// Upload-ready image as a data URI.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub data_uri: String,
    /// JPEG quality of the final export; `None` for raw pass-through.
    pub quality: Option<u8>,
    /// Number of JPEG exports performed.
    pub exports: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Please select a valid image file (JPEG, PNG, WebP, HEIC, AVIF, etc.)")]
    InvalidType,
    #[error("Image file is too large. Please select an image smaller than 10MB.")]
    TooLarge,
    #[error("Image file appears to be corrupted or too small. Please try taking a new photo.")]
    TooSmallOrCorrupted,
    #[error("HEIF/HEIC files are not supported here. Please convert to JPEG or PNG first, or take a new photo.")]
    UnsupportedHeic,
    #[error("Could not load the image ({0}). Please try a different photo.")]
    DecodeFailed(String),
    #[error("Image processing failed ({0}). Please try taking a new photo or selecting a different image.")]
    ConversionFailed(String),
}

/// Turns arbitrary photos into size-bounded JPEG data URIs.
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Validates, converts and, if conversion fails, tries to pass the
    /// original file through unchanged.
    pub fn normalize(&self, upload: &UploadedImage) -> Result<EncodedImage, NormalizeError> {
        log::info!(
            "📸 Processing {} (type: '{}', size: {:.2}MB)",
            upload.file_name,
            upload.mime_type,
            upload.bytes.len() as f64 / 1024.0 / 1024.0
        );

        self.validate(upload)?;

        let conversion_error = match self.convert_to_jpeg(upload) {
            Ok(encoded) => {
                log::info!(
                    "✅ Image converted successfully: {:.2}MB at quality {:?}",
                    encoded.data_uri.len() as f64 / 1024.0 / 1024.0,
                    encoded.quality
                );
                return Ok(encoded);
            }
            Err(e) => e,
        };

        log::warn!("⚠️ Image conversion failed: {}, trying original file", conversion_error);

        match passthrough(upload) {
            Some(encoded) => {
                log::info!("✅ Using original file without conversion");
                Ok(encoded)
            }
            None if upload.is_heic() => Err(NormalizeError::UnsupportedHeic),
            None => Err(conversion_error),
        }
    }

    /// Runs [`normalize`](Self::normalize) on the blocking pool. Decoding
    /// and JPEG export are CPU-bound and must stay off the async workers.
    pub async fn normalize_blocking(&self, upload: UploadedImage) -> Result<EncodedImage> {
        let normalizer = self.clone();
        let encoded =
            tokio::task::spawn_blocking(move || normalizer.normalize(&upload)).await??;
        Ok(encoded)
    }

    /// Cheap checks that run before any decoding.
    pub fn validate(&self, upload: &UploadedImage) -> Result<(), NormalizeError> {
        let extension_supported = upload
            .extension()
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);

        if !upload.mime_type.starts_with("image/") && !extension_supported {
            return Err(NormalizeError::InvalidType);
        }
        if upload.bytes.len() > self.config.max_file_bytes {
            return Err(NormalizeError::TooLarge);
        }
        if upload.bytes.len() < self.config.min_file_bytes {
            return Err(NormalizeError::TooSmallOrCorrupted);
        }

        Ok(())
    }

    /// Decodes the photo, flattens it onto white and exports JPEG, lowering
    /// quality until the data URI fits or the quality floor is reached.
    pub fn convert_to_jpeg(&self, upload: &UploadedImage) -> Result<EncodedImage, NormalizeError> {
        let decoded = match image::load_from_memory(&upload.bytes) {
            Ok(decoded) => decoded,
            Err(_) if upload.is_heic() => return Err(NormalizeError::UnsupportedHeic),
            Err(e) => return Err(NormalizeError::DecodeFailed(e.to_string())),
        };

        log::debug!(
            "🖼️ Image decoded: {}x{}",
            decoded.width(),
            decoded.height()
        );

        let flattened = flatten_onto_white(&decoded);

        let mut quality = self.config.initial_quality;
        let mut data_uri = encode_jpeg_data_uri(&flattened, quality)?;
        let mut exports = 1;

        while data_uri.len() > self.config.max_data_uri_len && quality > self.config.min_quality {
            quality = quality
                .saturating_sub(self.config.quality_step)
                .max(self.config.min_quality);
            data_uri = encode_jpeg_data_uri(&flattened, quality)?;
            exports += 1;
            log::debug!("Reduced quality to {}, size: {}", quality, data_uri.len());
        }

        if data_uri.len() > self.config.max_data_uri_len {
            log::warn!(
                "⚠️ Image still {} bytes at quality floor {}, sending anyway",
                data_uri.len(),
                quality
            );
        }

        if !is_jpeg_data_uri(&data_uri) {
            return Err(NormalizeError::ConversionFailed(
                "invalid output format".to_string(),
            ));
        }

        Ok(EncodedImage {
            data_uri,
            quality: Some(quality),
            exports,
        })
    }
}

fn flatten_onto_white(decoded: &DynamicImage) -> RgbImage {
    let mut canvas = RgbaImage::from_pixel(
        decoded.width(),
        decoded.height(),
        Rgba([255, 255, 255, 255]),
    );
    imageops::overlay(&mut canvas, &decoded.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

fn encode_jpeg_data_uri(image: &RgbImage, quality: u8) -> Result<String, NormalizeError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .map_err(|e| NormalizeError::ConversionFailed(e.to_string()))?;

    Ok(format!(
        "{}{}",
        JPEG_DATA_URI_PREFIX,
        general_purpose::STANDARD.encode(&buf)
    ))
}

/// A JPEG data URI whose payload decodes and starts with the SOI marker.
pub fn is_jpeg_data_uri(data_uri: &str) -> bool {
    data_uri
        .strip_prefix(JPEG_DATA_URI_PREFIX)
        .and_then(|payload| general_purpose::STANDARD.decode(payload).ok())
        .map(|bytes| bytes.starts_with(&[0xFF, 0xD8]))
        .unwrap_or(false)
}

/// The original bytes as a data URI, if their declared type is an image.
fn passthrough(upload: &UploadedImage) -> Option<EncodedImage> {
    let mime_type = if upload.mime_type.is_empty() {
        "application/octet-stream"
    } else {
        upload.mime_type.as_str()
    };

    if !mime_type.starts_with("image/") || upload.bytes.is_empty() {
        return None;
    }

    Some(EncodedImage {
        data_uri: format!(
            "data:{};base64,{}",
            mime_type,
            general_purpose::STANDARD.encode(&upload.bytes)
        ),
        quality: None,
        exports: 0,
    })
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn mime_type_for_extension(extension: Option<&str>) -> Option<&'static str> {
    let mime_type = match extension? {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => return None,
    };
    Some(mime_type)
}
