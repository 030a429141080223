use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use shared::domain::StagedScoreFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::object_url::{ObjectUrl, ObjectUrlRegistry};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("failed to read score file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A file handed over by the file picker or the scanner import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    /// Type declared by the source; empty when the source did not know it.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, IntakeError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| IntakeError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, "", bytes))
    }

    /// Declared type, else a guess from the extension, else
    /// `application/octet-stream`.
    pub fn resolved_mime_type(&self) -> String {
        let declared = self.mime_type.trim();
        if !declared.is_empty() {
            return declared.to_string();
        }
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

struct StagedEntry {
    file: StagedScoreFile,
    _url: ObjectUrl,
}

/// Ordered list of staged score files. Entries are only appended; their
/// object URLs live until [`IntakeController::dispose`] or drop.
pub struct IntakeController {
    registry: ObjectUrlRegistry,
    staged: Vec<StagedEntry>,
}

impl IntakeController {
    pub fn new(registry: ObjectUrlRegistry) -> Self {
        Self {
            registry,
            staged: Vec::new(),
        }
    }

    /// Stages every file of one selection in order and returns how many were
    /// added. A cancelled picker is an empty selection and stages nothing.
    pub fn add_files(&mut self, selection: impl IntoIterator<Item = RawFile>) -> usize {
        let before = self.staged.len();
        for raw in selection {
            let mime_type = raw.resolved_mime_type();
            let url = self.registry.create(raw.bytes);
            debug!(name = %raw.name, mime_type = %mime_type, url = url.as_str(), "intake: staged file");
            self.staged.push(StagedEntry {
                file: StagedScoreFile {
                    mime_type,
                    url: url.as_str().to_string(),
                },
                _url: url,
            });
        }
        let added = self.staged.len() - before;
        if added > 0 {
            info!(added, total = self.staged.len(), "intake: selection staged");
        }
        added
    }

    /// Reads all paths before staging any, so a bad path stages nothing.
    pub async fn add_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, IntakeError> {
        let mut selection = Vec::with_capacity(paths.len());
        for path in paths {
            selection.push(RawFile::from_path(path.as_ref()).await?);
        }
        Ok(self.add_files(selection))
    }

    pub fn list_files(&self) -> Vec<StagedScoreFile> {
        self.staged.iter().map(|entry| entry.file.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.registry.resolve(url)
    }

    pub fn registry(&self) -> ObjectUrlRegistry {
        self.registry.clone()
    }

    /// Ends the session: revokes every URL this controller created.
    pub fn dispose(&mut self) {
        let released = self.staged.len();
        self.staged.clear();
        if released > 0 {
            info!(released, "intake: released staged files");
        }
    }
}

#[cfg(test)]
#[path = "tests/intake_tests.rs"]
mod tests;
