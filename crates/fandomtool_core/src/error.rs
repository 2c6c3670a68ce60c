//! Error taxonomy shared by the harvester, cache, icon pipeline and search.

use std::path::PathBuf;

pub type FandomResult<T> = std::result::Result<T, FandomError>;

#[derive(Debug, thiserror::Error)]
pub enum FandomError {
    /// Transport failure: DNS, connect, timeout, non-success API status.
    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    /// Body was not JSON, or was missing a structurally required key.
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// The wiki answered with an `error` object.
    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },

    /// Image fetch returned a non-success status.
    #[error("failed to download {url}: HTTP {status}")]
    Download { url: String, status: u16 },

    #[error("failed to process image from {url}: {source}")]
    Image {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to read cache {}: {message}", path.display())]
    CacheRead { path: PathBuf, message: String },

    #[error("failed to write cache {}: {message}", path.display())]
    CacheWrite { path: PathBuf, message: String },

    #[error("search on {wiki} failed: {message}")]
    Search { wiki: String, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FandomError {
    pub fn decode(what: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
