use std::{fmt, io};
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagSyncError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a valid registry inventory: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("inventory {registry} lists tag `{tag}` under both {first} and {second}")]
    DuplicateTag {
        registry: String,
        tag: String,
        first: String,
        second: String,
    },
    #[error("tags point to different digests in source and destination: {}", tags.join(", "))]
    Conflicts { tags: Vec<String> },
    #[error("tag `{tag}` is not a valid image reference tag")]
    UnsafeTag { tag: String },
    #[error("failed to render transfer script")]
    Render(#[from] fmt::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T, E = TagSyncError> = std::result::Result<T, E>;
