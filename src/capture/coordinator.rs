//! Capture coordinator — one drag selection, end to end.
//!
//! grab screen → crop to selection → upload. Any failure ends the request
//! with `success: false`; nothing is retried.

use super::region::{self, CaptureRect, CropError, Viewport};
use super::screenshot::{CaptureError, ScreenSource};
use crate::api::{ApiError, CompanionClient, ImageUpload, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Destination for cropped images.
#[async_trait]
pub trait ImageSink: Send + Sync {
    async fn upload_image(&self, upload: &ImageUpload) -> Result<(), ApiError>;
}

#[async_trait]
impl ImageSink for CompanionClient {
    async fn upload_image(&self, upload: &ImageUpload) -> Result<(), ApiError> {
        CompanionClient::upload_image(self, upload).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub rect: CaptureRect,
    pub viewport: Viewport,
    pub session_id: SessionId,
    pub dialogue_index: usize,
}

/// Reply sent back to whoever asked for the capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

pub struct CaptureCoordinator {
    screen: Arc<dyn ScreenSource>,
    sink: Arc<dyn ImageSink>,
    jpeg_quality: u8,
    min_selection_px: f64,
}

impl CaptureCoordinator {
    pub fn new(
        screen: Arc<dyn ScreenSource>,
        sink: Arc<dyn ImageSink>,
        jpeg_quality: u8,
        min_selection_px: f64,
    ) -> Self {
        Self {
            screen,
            sink,
            jpeg_quality,
            min_selection_px,
        }
    }

    /// Runs one capture request. Never panics, never retries.
    pub async fn capture_area(&self, request: CaptureRequest) -> CaptureResponse {
        log::info!(
            "[CAPTURE] Area {:?} in viewport {}x{} for dialogue #{}",
            request.rect,
            request.viewport.width,
            request.viewport.height,
            request.dialogue_index
        );

        match self.run(&request).await {
            Ok(()) => CaptureResponse::ok(),
            Err(e) => {
                log::error!("[CAPTURE] Failed: {}", e);
                CaptureResponse::failed(e.to_string())
            }
        }
    }

    async fn run(&self, request: &CaptureRequest) -> Result<(), CaptureAreaError> {
        if !request.rect.meets_minimum(self.min_selection_px) {
            return Err(CaptureAreaError::TooSmall {
                width: request.rect.width,
                height: request.rect.height,
                min: self.min_selection_px,
            });
        }

        let start = std::time::Instant::now();

        // Step 1: Grab the whole screen on a blocking thread
        let screen = Arc::clone(&self.screen);
        let screenshot = tokio::task::spawn_blocking(move || screen.capture())
            .await
            .map_err(|e| CaptureAreaError::Task(e.to_string()))??;

        let capture_ms = start.elapsed().as_millis();
        log::info!(
            "[CAPTURE] Screen captured in {}ms ({}x{})",
            capture_ms,
            screenshot.width(),
            screenshot.height()
        );

        // Step 2: Scale, clamp, crop and encode
        let cropped =
            region::crop_selection(&screenshot, &request.rect, request.viewport, self.jpeg_quality)?;

        log::info!(
            "[CAPTURE] Cropped {:?} at DPR {:.2} in {}ms — {} bytes",
            cropped.rect,
            cropped.dpr,
            start.elapsed().as_millis() - capture_ms,
            cropped.jpeg_bytes.len()
        );

        // Step 3: Upload
        let upload = ImageUpload {
            session_id: request.session_id.clone(),
            dialogue_index: request.dialogue_index,
            image_data: cropped.data_uri(),
        };
        self.sink.upload_image(&upload).await?;

        log::info!("[CAPTURE] Done in {}ms total", start.elapsed().as_millis());
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureAreaError {
    #[error("Selected area too small ({width}x{height}, minimum {min}px per side)")]
    TooSmall { width: f64, height: f64, min: f64 },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Crop(#[from] CropError),

    #[error("Upload failed: {0}")]
    Upload(#[from] ApiError),

    #[error("Capture task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};
    use std::sync::Mutex;

    struct FixedScreen(DynamicImage);

    impl ScreenSource for FixedScreen {
        fn capture(&self) -> Result<DynamicImage, CaptureError> {
            Ok(self.0.clone())
        }
    }

    struct NoScreen;

    impl ScreenSource for NoScreen {
        fn capture(&self) -> Result<DynamicImage, CaptureError> {
            Err(CaptureError::NoPrimaryMonitor)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        uploads: Mutex<Vec<ImageUpload>>,
        reject: bool,
    }

    #[async_trait]
    impl ImageSink for RecordingSink {
        async fn upload_image(&self, upload: &ImageUpload) -> Result<(), ApiError> {
            if self.reject {
                return Err(ApiError::Status {
                    status: 404,
                    body: "Session not found".into(),
                });
            }
            self.uploads.lock().unwrap().push(upload.clone());
            Ok(())
        }
    }

    fn request(width: f64, height: f64) -> CaptureRequest {
        CaptureRequest {
            rect: CaptureRect::new(10.0, 10.0, width, height),
            viewport: Viewport::new(800.0, 600.0),
            session_id: SessionId::new("s-1"),
            dialogue_index: 2,
        }
    }

    fn screen_2x() -> Arc<dyn ScreenSource> {
        Arc::new(FixedScreen(DynamicImage::ImageRgba8(RgbaImage::new(1600, 1200))))
    }

    #[tokio::test]
    async fn uploads_cropped_region() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = CaptureCoordinator::new(screen_2x(), sink.clone(), 90, 50.0);

        let response = coordinator.capture_area(request(100.0, 80.0)).await;
        assert_eq!(response, CaptureResponse::ok());

        let uploads = sink.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].session_id, SessionId::new("s-1"));
        assert_eq!(uploads[0].dialogue_index, 2);
        assert!(uploads[0].image_data.starts_with("data:image/jpeg;base64,"));

        let b64 = uploads[0].image_data.trim_start_matches("data:image/jpeg;base64,");
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (200, 160));
    }

    #[tokio::test]
    async fn rejects_small_selection_without_capturing() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = CaptureCoordinator::new(Arc::new(NoScreen), sink.clone(), 90, 50.0);

        let response = coordinator.capture_area(request(30.0, 60.0)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("too small"));
        assert!(sink.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_screen_failure() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = CaptureCoordinator::new(Arc::new(NoScreen), sink.clone(), 90, 50.0);

        let response = coordinator.capture_area(request(100.0, 100.0)).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("No primary monitor found"));
        assert!(sink.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn surfaces_server_error_body() {
        let sink = Arc::new(RecordingSink {
            reject: true,
            ..Default::default()
        });
        let coordinator = CaptureCoordinator::new(screen_2x(), sink, 90, 50.0);

        let response = coordinator.capture_area(request(100.0, 100.0)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("Session not found"));
    }

    #[test]
    fn response_serializes_like_runtime_reply() {
        assert_eq!(
            serde_json::to_string(&CaptureResponse::ok()).unwrap(),
            r#"{"success":true}"#
        );
        assert_eq!(
            serde_json::to_string(&CaptureResponse::failed("Upload failed")).unwrap(),
            r#"{"success":false,"error":"Upload failed"}"#
        );
    }
}
