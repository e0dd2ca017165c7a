use crate::state::{CrawlState, StateError};
use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// JSON file holding the crawl state between runs
///
/// Writes go to a temporary file in the same directory which then replaces
/// the target, so an interrupted write never leaves a half-written state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file
    ///
    /// # Returns
    ///
    /// * `Ok(Some(state))` - The file exists and parsed
    /// * `Ok(None)` - No state file yet
    /// * `Err(StateError::Corrupt)` - The file exists but does not parse
    pub fn load(&self) -> Result<Option<CrawlState>, StateError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StateError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Reads the state file, starting over if it is corrupt
    ///
    /// A corrupt file is moved aside to `<path>.corrupt-<timestamp>` so the
    /// next checkpoint does not overwrite the evidence.
    pub fn load_or_default(&self) -> Result<CrawlState, StateError> {
        match self.load() {
            Ok(Some(state)) => {
                tracing::info!(
                    "Loaded crawl state: query '{}', page {}/{}, {} observed records",
                    state.query,
                    state.last_page_processed,
                    state.total_pages,
                    state.observed_records.len()
                );
                Ok(state)
            }
            Ok(None) => {
                tracing::info!("No crawl state at {}, starting fresh", self.path.display());
                Ok(CrawlState::default())
            }
            Err(StateError::Corrupt { path, message }) => {
                let moved_to = self.quarantine()?;
                tracing::warn!(
                    "Crawl state {} is corrupt ({}); moved to {} and starting fresh",
                    path,
                    message,
                    moved_to.display()
                );
                Ok(CrawlState::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Atomically replaces the state file
    pub fn save(&self, state: &CrawlState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(
            "Checkpoint: page {}/{}, {} observed records",
            state.last_page_processed,
            state.total_pages,
            state.observed_records.len()
        );
        Ok(())
    }

    fn quarantine(&self) -> Result<PathBuf, StateError> {
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{}", Local::now().format("%Y%m%d%H%M%S")));
        let target = PathBuf::from(target);
        std::fs::rename(&self.path, &target)?;
        Ok(target)
    }
}
