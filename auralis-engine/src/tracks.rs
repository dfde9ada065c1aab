use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque track identifier handed to us by the library layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The library scanner owns track identity; the engine only needs a way
/// from a track id to an audio file.
pub trait TrackResolver: Send + Sync {
    fn resolve(&self, id: &TrackId) -> Option<PathBuf>;
}

/// Treats the track id as a path relative to a music root. Rejects ids
/// that try to escape the root.
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TrackResolver for PathResolver {
    fn resolve(&self, id: &TrackId) -> Option<PathBuf> {
        let rel = Path::new(id.as_str());
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return None;
        }
        let path = self.root.join(rel);
        path.is_file().then_some(path)
    }
}

/// Explicit id -> path mapping loaded from a JSON document.
pub struct MapResolver {
    map: HashMap<TrackId, PathBuf>,
}

impl MapResolver {
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let map: HashMap<TrackId, PathBuf> = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self { map })
    }

    pub fn from_map(map: HashMap<TrackId, PathBuf>) -> Self {
        Self { map }
    }
}

impl TrackResolver for MapResolver {
    fn resolve(&self, id: &TrackId) -> Option<PathBuf> {
        self.map.get(id).cloned()
    }
}
