use std::path::PathBuf;
use tracing::info;

use super::{CaptureOutcome, CaptureService, CapturedImage, Region};
use crate::error::{Result, ScreenerError};

/// Reads an existing image file, e.g. a screenshot taken by another tool.
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureService for FileCapture {
    fn capture(&self, region: Option<Region>) -> Result<CaptureOutcome> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            ScreenerError::Capture(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let image = CapturedImage::decode(&bytes)?;

        let image = match region {
            None => image,
            Some(region) => match image.crop(region)? {
                Some(cropped) => cropped,
                None => {
                    info!(region = %region, "Selection is empty, capture cancelled");
                    return Ok(CaptureOutcome::Cancelled);
                }
            },
        };

        info!(
            path = %self.path.display(),
            width = image.width(),
            height = image.height(),
            "Captured image from file"
        );
        Ok(CaptureOutcome::Captured(image))
    }
}
