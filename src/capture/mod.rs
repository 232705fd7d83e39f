//! Screen capture domain — public API.
//!
//! This module owns all screen capture functionality.
//! External code should only use the public items exported here.

mod coordinator;
mod region;
mod screenshot;

pub use coordinator::{
    CaptureAreaError, CaptureCoordinator, CaptureRequest, CaptureResponse, ImageSink,
};
pub use region::{
    crop_selection, crop_to_jpeg_bytes, device_rect, encode_jpeg, to_data_uri, CaptureRect,
    CropError, CroppedImage, PixelRect, Viewport,
};
pub use screenshot::{CaptureError, ScreenSource};

#[cfg(feature = "desktop")]
pub use screenshot::{capture_primary_monitor, PrimaryMonitor};
