//! Still-image capture and the raster type handed to the model.

mod command;
mod file;

pub use command::CommandCapture;
pub use file::FileCapture;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use crate::error::{Result, ScreenerError};

/// A decoded screenshot, kept as PNG bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl CapturedImage {
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(Self {
            png: buffer.into_inner(),
            width: img.width(),
            height: img.height(),
        })
    }

    /// Decodes any supported raster format. PNG input is kept as is.
    /// Undecodable or zero-sized input is an invalid capture.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| ScreenerError::InvalidCapture(format!("cannot decode image: {}", e)))?;
        if img.width() == 0 || img.height() == 0 {
            return Err(ScreenerError::InvalidCapture(format!(
                "image is {}x{}",
                img.width(),
                img.height()
            )));
        }
        if image::guess_format(bytes).ok() == Some(ImageFormat::Png) {
            return Ok(Self {
                png: bytes.to_vec(),
                width: img.width(),
                height: img.height(),
            });
        }
        Self::from_dynamic(&img)
    }

    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory_with_format(&self.png, ImageFormat::Png)?)
    }

    /// Crops to `region` clipped to the image bounds; `None` when nothing is left.
    pub fn crop(&self, region: Region) -> Result<Option<Self>> {
        let Some(clipped) = region.clip(self.width, self.height) else {
            return Ok(None);
        };
        let img = self.to_dynamic()?;
        let cropped = img.crop_imm(clipped.x, clipped.y, clipped.width, clipped.height);
        Self::from_dynamic(&cropped).map(Some)
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    pub fn image_ref(&self, file: impl Into<String>) -> ImageRef {
        ImageRef::new(file, self.width, self.height)
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// Immutable reference from a conversation to its source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub file: String,
    pub width: u32,
    pub height: u32,
}

impl ImageRef {
    pub fn new(file: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            file: file.into(),
            width,
            height,
        }
    }
}

/// Screen rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with a `bound_w` x `bound_h` image.
    pub fn clip(&self, bound_w: u32, bound_h: u32) -> Option<Region> {
        if self.x >= bound_w || self.y >= bound_h {
            return None;
        }
        let width = self.width.min(bound_w - self.x);
        let height = self.height.min(bound_h - self.y);
        let clipped = Region::new(self.x, self.y, width, height);
        (!clipped.is_empty()).then_some(clipped)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Region {
    type Err = ScreenerError;

    /// Parses `x,y,w,h`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ScreenerError::Capture(format!(
                "region must be x,y,width,height, got '{}'",
                s
            )));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                ScreenerError::Capture(format!("invalid region component '{}'", part))
            })?;
        }
        Ok(Region::new(values[0], values[1], values[2], values[3]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(CapturedImage),
    /// The user abandoned the selection or the tool produced nothing.
    Cancelled,
}

/// Produces a still image for an optional screen region.
pub trait CaptureService: Send + Sync {
    fn capture(&self, region: Option<Region>) -> Result<CaptureOutcome>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Gradient image so crops are distinguishable.
    pub fn sample_image(width: u32, height: u32) -> CapturedImage {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        CapturedImage::from_dynamic(&DynamicImage::ImageRgb8(img)).unwrap()
    }
}
