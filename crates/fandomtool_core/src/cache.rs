use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{FandomError, FandomResult};
use crate::model::PageCollection;

/// Single-file JSON mirror of the harvested page collection.
#[derive(Debug, Clone)]
pub struct PageCache {
    path: PathBuf,
}

impl PageCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the file is absent or cannot be decoded.
    pub fn load(&self) -> Option<PageCollection> {
        match self.read() {
            Ok(pages) => pages,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable page cache");
                None
            }
        }
    }

    pub fn read(&self) -> FandomResult<Option<PageCollection>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(FandomError::CacheRead {
                    path: self.path.clone(),
                    message: err.to_string(),
                });
            }
        };
        let pages: PageCollection =
            serde_json::from_str(&content).map_err(|err| FandomError::CacheRead {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        debug!(path = %self.path.display(), pages = pages.len(), "loaded page cache");
        Ok(Some(pages))
    }

    /// Write errors are logged, never raised.
    pub fn save(&self, pages: &PageCollection) {
        if let Err(err) = self.write(pages) {
            error!(error = %err, "error saving cached pages");
        }
    }

    /// Replaces the cache file wholesale through a temporary sibling, so a
    /// reader never observes a partially-written document.
    pub fn write(&self, pages: &PageCollection) -> FandomResult<()> {
        let write_error = |message: String| FandomError::CacheWrite {
            path: self.path.clone(),
            message,
        };
        let rendered =
            serde_json::to_string(pages).map_err(|err| write_error(err.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                write_error(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        let temp_path = temporary_sibling(&self.path);
        fs::write(&temp_path, rendered).map_err(|err| write_error(err.to_string()))?;
        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(write_error(err.to_string()));
        }
        debug!(path = %self.path.display(), pages = pages.len(), "saved page cache");
        Ok(())
    }

    /// Removes the cache file; returns `true` if one existed.
    pub fn clear(&self) -> FandomResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FandomError::io(&self.path, err)),
        }
    }
}

pub(crate) fn temporary_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}
