//! On-disk copy of the last-known-good display data.
//!
//! Lets a kiosk that reboots while the backend is unreachable come up showing
//! its previous content instead of an empty screen.

use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use super::errors::CacheError;
use super::model::DisplayData;

#[derive(Clone, Debug)]
pub struct DisplayCache {
    path: PathBuf,
}

impl DisplayCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached data. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<DisplayData>, CacheError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No display cache at {:?}.", self.path);
                return Ok(None);
            }
            Err(e) => return Err(CacheError::Io(e)),
        };
        let data: DisplayData = serde_json::from_str(&contents)?;
        info!("Loaded cached display data from {:?} ({} media item(s)).", self.path, data.media.len());
        Ok(Some(data))
    }

    /// Like `load`, but a corrupt or unreadable cache is logged and treated as empty.
    pub fn load_or_discard(&self) -> Option<DisplayData> {
        self.load().unwrap_or_else(|e| {
            warn!("Ignoring unreadable display cache {:?}: {}", self.path, e);
            None
        })
    }

    /// Writes `data` atomically: a temp file in the same directory is renamed over the cache.
    pub fn store(&self, data: &DisplayData) -> Result<(), CacheError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut temp, data)?;
        temp.flush()?;
        temp.persist(&self.path)?;
        debug!("Display cache written to {:?}.", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaItem;

    fn sample() -> DisplayData {
        DisplayData {
            media: vec![MediaItem {
                id: "m1".into(),
                type_: "image/jpeg".into(),
                url: "https://cdn/m1.jpg".into(),
                local_path: "/static/media/m1.jpg".into(),
                duration: 8000,
                is_video: false,
                width: 1920,
                height: 1080,
                title: None,
                description: None,
            }],
            version: "1.4.0".into(),
            configured: true,
            ..DisplayData::default()
        }
    }

    #[test]
    fn test_missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisplayCache::new(dir.path().join("display.json"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_store_then_load_returns_same_data() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisplayCache::new(dir.path().join("nested").join("display.json"));
        cache.store(&sample()).unwrap();
        assert_eq!(cache.load().unwrap(), Some(sample()));
    }

    #[test]
    fn test_corrupt_cache_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");
        std::fs::write(&path, "{not json").unwrap();
        let cache = DisplayCache::new(&path);
        assert!(matches!(cache.load(), Err(CacheError::Serde(_))));
        assert!(cache.load_or_discard().is_none());
    }
}
