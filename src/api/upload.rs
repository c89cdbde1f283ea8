//! Single-image detection: upload a still and report what the service found.

use serde::Deserialize;
use std::fmt::Write as _;
use std::path::Path;

use crate::api::client::ApiClient;
use crate::api::error::{ApiError, Result};
use crate::api::multipart::{content_type_for, MultipartForm};
use crate::pipeline::protocol::DetectionBox;
use crate::pipeline::render::{paint_overlay, LabelFont, RasterSurface, Surface};
use crate::preview::compress::{compress_jpeg, decode_jpeg_b64};

const INFER_PATH: &str = "infer";
const ANNOTATED_JPEG_QUALITY: u8 = 90;

pub const NO_FILE_NOTICE: &str = "Please select a file first";
pub const NO_SUBJECT_NOTICE: &str = "Please select an elderly before uploading";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    #[serde(alias = "person")]
    People,
    Fall,
    None,
}

impl DetectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStatus::People => "people",
            DetectionStatus::Fall => "fall",
            DetectionStatus::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionResult {
    pub timestamp: String,
    #[serde(default)]
    pub source: Option<String>,
    pub status: DetectionStatus,
    pub fall_count: u32,
    pub person_count: u32,
    #[serde(default)]
    pub total_frames: Option<u32>,
    #[serde(default)]
    pub boxes: Vec<DetectionBox>,
}

impl DetectionResult {
    pub fn has_falls(&self) -> bool {
        self.fall_count > 0
    }

    /// Human-readable summary of the result.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Falls detected: {}",
            if self.has_falls() { "Yes" } else { "No" }
        );
        let _ = writeln!(out, "Timestamp: {}", self.timestamp);
        let _ = writeln!(out, "Falls detected: {}", self.fall_count);
        let _ = writeln!(out, "Persons detected: {}", self.person_count);
        let _ = writeln!(out, "Status: {}", self.status.as_str());
        if !self.boxes.is_empty() {
            let _ = writeln!(out, "Boxes:");
            for b in &self.boxes {
                let _ = writeln!(
                    out,
                    "  x1: {}, y1: {}, x2: {}, y2: {}, conf: {:.2}, cls: {}",
                    b.x1, b.y1, b.x2, b.y2, b.conf, b.cls
                );
            }
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferResponse {
    pub result: DetectionResult,
    /// Bare base64 JPEG.
    #[serde(default)]
    pub image_b64: Option<String>,
}

impl InferResponse {
    /// Decode the returned image and paint the result boxes onto it.
    /// Labels are drawn only when `font` is given.
    pub fn annotate(&self, font: Option<&LabelFont>) -> Option<RasterSurface> {
        let frame = decode_jpeg_b64(self.image_b64.as_deref()?)?;
        let mut surface = RasterSurface::new(frame.width, frame.height).with_font(font.cloned());
        surface.draw_frame(&frame);
        paint_overlay(&mut surface, &self.result.boxes);
        Some(surface)
    }

    /// Write the annotated image as a JPEG.
    pub fn save_annotated(&self, path: &Path, font: Option<&LabelFont>) -> Result<()> {
        let surface = self
            .annotate(font)
            .ok_or_else(|| ApiError::Validation("No image in detection result".to_string()))?;
        let image = surface.image();
        let jpeg = compress_jpeg(
            image.as_raw(),
            image.width(),
            image.height(),
            ANNOTATED_JPEG_QUALITY,
        )
        .ok_or_else(|| ApiError::Validation("Failed to encode annotated image".to_string()))?;
        std::fs::write(path, jpeg).map_err(|e| {
            ApiError::Validation(format!("Failed to write {}: {e}", path.display()))
        })
    }
}

/// Upload one image for detection, tagged with the selected subject.
///
/// Both inputs are checked before any request is made.
pub fn upload_image(
    client: &ApiClient,
    file: Option<&Path>,
    subject_id: Option<&str>,
) -> Result<InferResponse> {
    let file = file.ok_or_else(|| ApiError::Validation(NO_FILE_NOTICE.to_string()))?;
    let subject_id = subject_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(NO_SUBJECT_NOTICE.to_string()))?;

    let data = std::fs::read(file).map_err(|e| {
        ApiError::Validation(format!("Failed to read {}: {e}", file.display()))
    })?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let form = MultipartForm::new()
        .file("file", &filename, content_type_for(&filename), &data)
        .text("elderly_id", subject_id);

    let response: InferResponse =
        client.post_multipart("upload image", &client.detect_url(INFER_PATH), form)?;
    tracing::info!(
        "detection for {filename}: status={}, falls={}, persons={}",
        response.result.status.as_str(),
        response.result.fall_count,
        response.result.person_count
    );
    Ok(response)
}
