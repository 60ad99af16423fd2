use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Session, SessionRecord};
use crate::capture::CapturedImage;
use crate::constants::storage;
use crate::error::{Result, ScreenerError};

/// Listing entry for a saved session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub initial_prompt: String,
    pub turn_count: usize,
    pub dir: PathBuf,
}

/// Directory-per-session storage:
/// `<base>/<id>/screenshot.png` and `<base>/<id>/conversation.json`.
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `base_dir`, creating it if needed.
    pub fn with_dir(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            ScreenerError::Config(format!(
                "Failed to create sessions directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(id)
    }

    fn check_id(id: &str) -> Result<()> {
        if is_valid_id(id) {
            Ok(())
        } else {
            Err(ScreenerError::SessionNotFound(id.to_string()))
        }
    }

    /// Writes the session's current snapshot. The screenshot is written once;
    /// the conversation file is replaced atomically via a temp file.
    pub fn save(&self, session: &Session) -> Result<PathBuf> {
        if !is_valid_id(session.id()) {
            return Err(ScreenerError::corrupt(format!(
                "invalid session id '{}'",
                session.id()
            )));
        }
        let dir = self.session_dir(session.id());
        fs::create_dir_all(&dir)?;

        let image_path = dir.join(storage::SCREENSHOT_FILE);
        if !image_path.exists() {
            write_atomic(&image_path, session.image().png_bytes())?;
        }

        let record = session.record(Utc::now());
        let contents = serde_json::to_string_pretty(&record)?;
        let conversation_path = dir.join(storage::CONVERSATION_FILE);
        write_atomic(&conversation_path, contents.as_bytes())?;

        info!(
            session = %session.id(),
            turns = session.conversation().len(),
            "Session saved"
        );
        Ok(dir)
    }

    fn read_record(dir: &Path) -> Result<SessionRecord> {
        let path = dir.join(storage::CONVERSATION_FILE);
        let contents = fs::read_to_string(&path)?;
        let record: SessionRecord = serde_json::from_str(&contents)
            .map_err(|e| ScreenerError::corrupt(format!("{}: {}", path.display(), e)))?;

        // The directory name is the session's identity on disk.
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !is_valid_id(&record.id) || record.id != dir_name {
            return Err(ScreenerError::corrupt(format!(
                "{}: session id '{}' does not match directory '{}'",
                path.display(),
                record.id,
                dir_name
            )));
        }
        Ok(record)
    }

    fn load_dir(dir: &Path) -> Result<Session> {
        let record = Self::read_record(dir)?;
        let image_path = dir.join(storage::SCREENSHOT_FILE);
        let bytes = fs::read(&image_path)?;
        let image = CapturedImage::decode(&bytes)
            .map_err(|e| ScreenerError::corrupt(format!("{}: {}", image_path.display(), e)))?;
        let session = Session::from_record(record, image)?;
        info!(session = %session.id(), turns = session.conversation().len(), "Session loaded");
        Ok(session)
    }

    pub fn load(&self, id: &str) -> Result<Session> {
        Self::check_id(id)?;
        let dir = self.session_dir(id);
        if !is_session_dir(&dir) {
            return Err(ScreenerError::SessionNotFound(id.to_string()));
        }
        Self::load_dir(&dir)
    }

    /// The most recently saved session, skipping directories that are not
    /// complete sessions or whose record cannot be read.
    pub fn load_latest(&self) -> Result<Option<Session>> {
        let latest = self
            .summaries()?
            .into_iter()
            .max_by(|a, b| a.saved_at.cmp(&b.saved_at).then_with(|| a.id.cmp(&b.id)));
        match latest {
            Some(summary) => Self::load_dir(&summary.dir).map(Some),
            None => {
                debug!(dir = %self.base_dir.display(), "No saved sessions");
                Ok(None)
            }
        }
    }

    fn summaries(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let dir = entry?.path();
            if !is_session_dir(&dir) {
                continue;
            }
            match Self::read_record(&dir) {
                Ok(record) => summaries.push(SessionSummary {
                    id: record.id,
                    created_at: record.created_at,
                    saved_at: record.saved_at,
                    initial_prompt: record.initial_prompt,
                    turn_count: record.conversation.turns.len(),
                    dir,
                }),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Skipping unreadable session"),
            }
        }
        Ok(summaries)
    }

    /// Summaries of all readable sessions, most recently saved first.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = self.summaries()?;
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| b.id.cmp(&a.id)));
        Ok(summaries)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        Self::check_id(id)?;
        let dir = self.session_dir(id);
        if !dir.is_dir() {
            return Err(ScreenerError::SessionNotFound(id.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        info!(session = %id, "Session deleted");
        Ok(())
    }
}

/// Ids are generated as `YYYYMMDD_HHMMSS_xxxxxx`; anything that could leave
/// the base directory is rejected.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_session_dir(dir: &Path) -> bool {
    dir.is_dir()
        && dir.join(storage::CONVERSATION_FILE).is_file()
        && dir.join(storage::SCREENSHOT_FILE).is_file()
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_support::sample_image;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversation.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_check_id_rejects_paths() {
        assert!(SessionStore::check_id("20240101_101010_abcdef").is_ok());
        assert!(SessionStore::check_id("../etc").is_err());
        assert!(SessionStore::check_id("").is_err());
    }

    #[test]
    fn test_incomplete_dirs_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_dir(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        let half = dir.path().join("half");
        fs::create_dir_all(&half).unwrap();
        fs::write(half.join(storage::SCREENSHOT_FILE), sample_image(12, 12).png_bytes()).unwrap();

        assert!(store.list().unwrap().is_empty());
        assert!(store.load_latest().unwrap().is_none());
        assert!(matches!(store.load("half"), Err(ScreenerError::SessionNotFound(_))));
    }
}
