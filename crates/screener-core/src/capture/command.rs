use std::process::Command;
use tracing::{debug, info, warn};

use super::{CaptureOutcome, CaptureService, CapturedImage, Region};
use crate::error::{Result, ScreenerError};

/// Screenshot tools tried by [`CommandCapture::detect`], in order.
const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("screencapture", "screencapture -x {output}"),
    ("grim", "grim {output}"),
    ("gnome-screenshot", "gnome-screenshot -f {output}"),
    ("scrot", "scrot -o {output}"),
];

/// Runs an external screenshot tool through `sh -c`.
///
/// The template's `{output}` placeholder receives a temporary PNG path and
/// `{region}` receives `x,y,w,h`. Without a `{region}` placeholder the full
/// screenshot is cropped afterwards.
pub struct CommandCapture {
    template: String,
}

impl CommandCapture {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// First known screenshot tool found on `PATH`.
    pub fn detect() -> Option<Self> {
        KNOWN_TOOLS
            .iter()
            .find(|(name, _)| command_exists(name))
            .map(|(_, template)| Self::new(*template))
    }

    fn expand(&self, output: &str, region: Option<Region>) -> String {
        let region = region.map(|r| r.to_string()).unwrap_or_default();
        self.template
            .replace("{output}", &shell_quote(output))
            .replace("{region}", &region)
    }
}

impl CaptureService for CommandCapture {
    fn capture(&self, region: Option<Region>) -> Result<CaptureOutcome> {
        if let Some(r) = region {
            if r.is_empty() {
                info!(region = %r, "Selection is empty, capture cancelled");
                return Ok(CaptureOutcome::Cancelled);
            }
        }

        let output = tempfile::Builder::new()
            .prefix("screener-")
            .suffix(".png")
            .tempfile()?;
        let output_path = output.path().to_string_lossy().to_string();
        let command_line = self.expand(&output_path, region);
        debug!(command = %command_line, "Running capture command");

        let status = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .status()
            .map_err(|e| ScreenerError::Capture(format!("failed to run capture command: {}", e)))?;

        if !status.success() {
            warn!(status = ?status.code(), "Capture command exited unsuccessfully, treating as cancelled");
            return Ok(CaptureOutcome::Cancelled);
        }

        let bytes = std::fs::read(output.path())?;
        if bytes.is_empty() {
            info!("Capture command produced no image, treating as cancelled");
            return Ok(CaptureOutcome::Cancelled);
        }
        let mut image = CapturedImage::decode(&bytes)?;

        if let Some(r) = region {
            if !self.template.contains("{region}") {
                match image.crop(r)? {
                    Some(cropped) => image = cropped,
                    None => return Ok(CaptureOutcome::Cancelled),
                }
            }
        }

        info!(width = image.width(), height = image.height(), "Captured screen region");
        Ok(CaptureOutcome::Captured(image))
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {name} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
