//! Full-screen capture.
//!
//! This is the infrastructure layer — it talks to the OS. The coordinator
//! only sees the `ScreenSource` trait; the desktop build plugs in `xcap`.

use image::DynamicImage;

/// Something that can produce a screenshot of the visible screen.
///
/// Implementations block; callers run them on a blocking thread.
pub trait ScreenSource: Send + Sync {
    fn capture(&self) -> Result<DynamicImage, CaptureError>;
}

/// Captures the primary monitor using the `xcap` crate.
#[cfg(feature = "desktop")]
pub struct PrimaryMonitor;

#[cfg(feature = "desktop")]
impl ScreenSource for PrimaryMonitor {
    fn capture(&self) -> Result<DynamicImage, CaptureError> {
        capture_primary_monitor()
    }
}

/// Captures the primary monitor's screen as a `DynamicImage`.
///
/// Returns the full-screen screenshot including all pixels.
/// The caller is responsible for cropping to the user's selection.
#[cfg(feature = "desktop")]
pub fn capture_primary_monitor() -> Result<DynamicImage, CaptureError> {
    use xcap::Monitor;

    let monitors = Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;

    let mut fallback = None;
    let mut primary = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            primary = Some(monitor);
            break;
        }
        if fallback.is_none() {
            fallback = Some(monitor);
        }
    }

    // Some compositors never report a primary; use the first monitor then.
    let monitor = primary.or(fallback).ok_or(CaptureError::NoPrimaryMonitor)?;

    let image = monitor
        .capture_image()
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

    Ok(DynamicImage::ImageRgba8(image))
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[error("No primary monitor found")]
    NoPrimaryMonitor,

    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),
}
