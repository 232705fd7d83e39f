//! Pure region cropping logic — functional core.
//!
//! This module has zero infrastructure dependencies.
//! It takes pixel data in, returns pixel data out.
//!
//! Selections arrive in CSS pixels relative to the viewport, while the
//! screenshot is in device pixels. `device_rect` bridges the two.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// A selection rectangle in CSS pixels, relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CaptureRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Both sides are at least `min` CSS pixels.
    pub fn meets_minimum(&self, min: f64) -> bool {
        self.width >= min && self.height >= min
    }
}

/// Logical (CSS) size of the viewport the selection was made in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A crop region in device pixels, guaranteed to lie inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A cropped, encoded region ready for upload.
#[derive(Debug, Clone)]
pub struct CroppedImage {
    pub rect: PixelRect,
    pub dpr: f64,
    pub jpeg_bytes: Vec<u8>,
}

impl CroppedImage {
    pub fn data_uri(&self) -> String {
        to_data_uri("image/jpeg", &self.jpeg_bytes)
    }
}

/// Maps a CSS-pixel selection onto a screenshot of `actual_width × actual_height`.
///
/// DPR is `actual_width / viewport.width`. Each coordinate is scaled and
/// rounded, then clamped in a fixed order: x, then y, then width, then
/// height. Clamping width/height last means an oversized selection is
/// shifted to the image edge first and only then trimmed.
pub fn device_rect(
    rect: &CaptureRect,
    viewport: Viewport,
    actual_width: u32,
    actual_height: u32,
) -> Result<PixelRect, CropError> {
    if !viewport.width.is_finite() || viewport.width <= 0.0 {
        return Err(CropError::InvalidViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    let dpr = actual_width as f64 / viewport.width;
    let scale = |v: f64| (v * dpr).round() as i64;

    let (img_w, img_h) = (actual_width as i64, actual_height as i64);
    let mut width = scale(rect.width);
    let mut height = scale(rect.height);
    if width <= 0 || height <= 0 {
        return Err(CropError::EmptyRegion { width, height });
    }

    let x = scale(rect.x).min(img_w - width).max(0);
    let y = scale(rect.y).min(img_h - height).max(0);
    width = width.min(img_w - x);
    height = height.min(img_h - y);

    if width <= 0 || height <= 0 {
        return Err(CropError::EmptyRegion { width, height });
    }

    Ok(PixelRect {
        x: x as u32,
        y: y as u32,
        width: width as u32,
        height: height as u32,
    })
}

/// Crops a `DynamicImage` to the specified rectangle and returns JPEG bytes.
pub fn crop_to_jpeg_bytes(
    image: &DynamicImage,
    rect: PixelRect,
    quality: u8,
) -> Result<Vec<u8>, CropError> {
    let PixelRect { x, y, width, height } = rect;
    if width == 0 || height == 0 {
        return Err(CropError::ZeroDimension);
    }

    let (img_width, img_height) = (image.width(), image.height());

    if x as u64 + width as u64 > img_width as u64 || y as u64 + height as u64 > img_height as u64 {
        return Err(CropError::OutOfBounds {
            requested: (x, y, width, height),
            image_size: (img_width, img_height),
        });
    }

    let cropped = image.crop_imm(x, y, width, height);
    encode_jpeg(&cropped, quality)
}

/// JPEG-encodes an image. Alpha is dropped; JPEG has no alpha channel.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CropError> {
    let rgb = image.to_rgb8();
    let mut jpeg_bytes: Vec<u8> = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg_bytes, quality)
        .encode_image(&rgb)
        .map_err(|e| CropError::EncodingFailed(e.to_string()))?;
    Ok(jpeg_bytes)
}

/// Full pipeline: scale the selection, crop the screenshot, encode.
pub fn crop_selection(
    screenshot: &DynamicImage,
    rect: &CaptureRect,
    viewport: Viewport,
    quality: u8,
) -> Result<CroppedImage, CropError> {
    let device = device_rect(rect, viewport, screenshot.width(), screenshot.height())?;
    let jpeg_bytes = crop_to_jpeg_bytes(screenshot, device, quality)?;

    Ok(CroppedImage {
        rect: device,
        dpr: screenshot.width() as f64 / viewport.width,
        jpeg_bytes,
    })
}

pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Crop rectangle has zero width or height")]
    ZeroDimension,

    #[error("Empty crop region after clamping ({width}x{height})")]
    EmptyRegion { width: i64, height: i64 },

    #[error("Viewport has no usable width ({width}x{height})")]
    InvalidViewport { width: f64, height: f64 },

    #[error(
        "Crop rectangle ({},{},{},{}) exceeds image bounds ({}x{})",
        requested.0, requested.1, requested.2, requested.3,
        image_size.0, image_size.1
    )]
    OutOfBounds {
        requested: (u32, u32, u32, u32),
        image_size: (u32, u32),
    },

    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn rect(x: f64, y: f64, w: f64, h: f64) -> CaptureRect {
        CaptureRect::new(x, y, w, h)
    }

    #[test]
    fn scales_by_dpr() {
        let r = device_rect(&rect(10.0, 10.0, 100.0, 80.0), Viewport::new(800.0, 600.0), 1600, 1200)
            .unwrap();
        assert_eq!(
            r,
            PixelRect {
                x: 20,
                y: 20,
                width: 200,
                height: 160
            }
        );
    }

    #[test]
    fn unit_dpr_is_identity() {
        let r = device_rect(&rect(5.0, 7.0, 60.0, 70.0), Viewport::new(1000.0, 800.0), 1000, 800)
            .unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (5, 7, 60, 70));
    }

    #[test]
    fn fractional_dpr_rounds_to_nearest() {
        // 1.5x: 11 * 1.5 = 16.5 -> 17, 51 * 1.5 = 76.5 -> 77
        let r = device_rect(&rect(11.0, 11.0, 51.0, 51.0), Viewport::new(1000.0, 800.0), 1500, 1200)
            .unwrap();
        assert_eq!((r.x, r.y, r.width, r.height), (17, 17, 77, 77));
    }

    #[test]
    fn overflowing_selection_is_shifted_not_trimmed() {
        // 150px wide starting at x=900 on a 1000px image: x moves back to 850.
        let r = device_rect(&rect(900.0, 0.0, 150.0, 100.0), Viewport::new(1000.0, 800.0), 1000, 800)
            .unwrap();
        assert_eq!((r.x, r.width), (850, 150));
    }

    #[test]
    fn selection_larger_than_image_is_trimmed() {
        let r = device_rect(&rect(-20.0, -20.0, 2000.0, 2000.0), Viewport::new(1000.0, 800.0), 1000, 800)
            .unwrap();
        assert_eq!(
            r,
            PixelRect {
                x: 0,
                y: 0,
                width: 1000,
                height: 800
            }
        );
    }

    #[test]
    fn result_always_inside_image() {
        let dprs = [0.5, 1.0, 1.25, 1.5, 2.0, 3.0];
        let rects = [
            rect(0.0, 0.0, 50.0, 50.0),
            rect(790.0, 590.0, 60.0, 60.0),
            rect(-30.0, 10.0, 100.0, 900.0),
            rect(400.3, 299.7, 399.9, 300.4),
            rect(10.0, 10.0, 1200.0, 50.0),
        ];
        let viewport = Viewport::new(800.0, 600.0);

        for dpr in dprs {
            let (w, h) = ((800.0 * dpr) as u32, (600.0 * dpr) as u32);
            for r in &rects {
                let out = device_rect(r, viewport, w, h).unwrap();
                assert!(out.width > 0 && out.height > 0);
                assert!(out.x + out.width <= w, "dpr={} rect={:?} -> {:?}", dpr, r, out);
                assert!(out.y + out.height <= h, "dpr={} rect={:?} -> {:?}", dpr, r, out);
            }
        }
    }

    #[test]
    fn empty_region_fails_loudly() {
        let result = device_rect(&rect(10.0, 10.0, 0.0, 80.0), Viewport::new(800.0, 600.0), 1600, 1200);
        assert!(matches!(result, Err(CropError::EmptyRegion { .. })));

        let result = device_rect(&rect(10.0, 10.0, -40.0, 80.0), Viewport::new(800.0, 600.0), 1600, 1200);
        assert!(matches!(result, Err(CropError::EmptyRegion { .. })));

        // Saturates to i64::MIN once scaled.
        let result = device_rect(&rect(0.0, 0.0, -1e300, 80.0), Viewport::new(800.0, 600.0), 1600, 1200);
        assert!(matches!(result, Err(CropError::EmptyRegion { .. })));

        let result = device_rect(&rect(0.0, 0.0, 80.0, f64::NEG_INFINITY), Viewport::new(800.0, 600.0), 1600, 1200);
        assert!(matches!(result, Err(CropError::EmptyRegion { .. })));
    }

    #[test]
    fn zero_width_viewport_is_rejected() {
        let result = device_rect(&rect(0.0, 0.0, 60.0, 60.0), Viewport::new(0.0, 600.0), 1600, 1200);
        assert!(matches!(result, Err(CropError::InvalidViewport { .. })));
    }

    #[test]
    fn crop_produces_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let rect = PixelRect {
            x: 10,
            y: 10,
            width: 50,
            height: 50,
        };
        let bytes = crop_to_jpeg_bytes(&img, rect, 90).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn crop_zero_dimension_fails() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let rect = PixelRect {
            x: 0,
            y: 0,
            width: 0,
            height: 50,
        };
        let result = crop_to_jpeg_bytes(&img, rect, 90);
        assert!(matches!(result, Err(CropError::ZeroDimension)));
    }

    #[test]
    fn crop_out_of_bounds_fails() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let rect = PixelRect {
            x: 80,
            y: 80,
            width: 30,
            height: 30,
        };
        let result = crop_to_jpeg_bytes(&img, rect, 90);
        assert!(matches!(result, Err(CropError::OutOfBounds { .. })));
    }

    #[test]
    fn crop_selection_keeps_selected_pixels() {
        // Left half red, right half blue, at 2x.
        let img = RgbaImage::from_fn(400, 200, |x, _| {
            if x < 200 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let img = DynamicImage::ImageRgba8(img);

        let cropped =
            crop_selection(&img, &rect(110.0, 10.0, 80.0, 60.0), Viewport::new(200.0, 100.0), 95).unwrap();
        assert_eq!(cropped.dpr, 2.0);
        assert_eq!(
            cropped.rect,
            PixelRect {
                x: 220,
                y: 20,
                width: 160,
                height: 120
            }
        );

        let decoded = image::load_from_memory(&cropped.jpeg_bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (160, 120));
        let center = decoded.get_pixel(80, 60);
        assert!(center[2] > 200 && center[0] < 50, "expected blue, got {:?}", center);
    }

    #[test]
    fn data_uri_has_jpeg_prefix() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(64, 64));
        let cropped = crop_selection(&img, &rect(0.0, 0.0, 64.0, 64.0), Viewport::new(64.0, 64.0), 90).unwrap();
        assert!(cropped.data_uri().starts_with("data:image/jpeg;base64,/9j/"));
    }
}
