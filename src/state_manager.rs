//! Manages decoded media and in-flight media loads for the display app.
//!
//! Loads run on the tokio runtime and deliver their results through a shared
//! completion queue; the UI thread drains it once per frame.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use log::{debug, info, trace, warn};
use tempfile::NamedTempFile;

use super::errors::MediaError;

/// A finished media load.
#[derive(Debug)]
pub enum LoadedMedia {
    Image(Arc<RgbaImage>),
    /// A downloaded video, ready to hand to the player.
    VideoFile(NamedTempFile),
}

type Completed = Arc<Mutex<Vec<(String, Result<LoadedMedia, MediaError>)>>>;

/// Handle given to a load task to report its result.
#[derive(Debug)]
pub struct CompletionSink {
    media_id: String,
    completed: Completed,
}

impl CompletionSink {
    pub fn complete(self, result: Result<LoadedMedia, MediaError>) {
        match self.completed.lock() {
            Ok(mut guard) => guard.push((self.media_id, result)),
            Err(_) => warn!("Media completion queue poisoned; dropping result for '{}'.", self.media_id),
        }
    }
}

/// Caches decoded images by media id and tracks pending loads.
#[derive(Debug, Default)]
pub struct MediaCacheManager {
    images: HashMap<String, Arc<RgbaImage>>,
    in_flight: HashSet<String>,
    completed: Completed,
}

impl MediaCacheManager {
    pub fn new() -> Self {
        debug!("Initializing new MediaCacheManager.");
        Self::default()
    }

    /// Marks `media_id` as loading and returns the sink its task reports to.
    /// Returns `None` when the image is already cached or a load is pending.
    pub fn begin_load(&mut self, media_id: &str) -> Option<CompletionSink> {
        if self.images.contains_key(media_id) || !self.in_flight.insert(media_id.to_string()) {
            trace!("Skipping load for '{}': cached or already pending.", media_id);
            return None;
        }
        debug!("Beginning media load for '{}'.", media_id);
        Some(CompletionSink { media_id: media_id.to_string(), completed: self.completed.clone() })
    }

    /// Collects finished loads. Images are cached as a side effect. Results
    /// for ids pruned by `retain_only` while in flight are discarded.
    pub fn drain_completed(&mut self) -> Vec<(String, Result<LoadedMedia, MediaError>)> {
        let finished = match self.completed.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => {
                warn!("Media completion queue poisoned.");
                return Vec::new();
            }
        };
        let mut out = Vec::with_capacity(finished.len());
        for (id, result) in finished {
            if !self.in_flight.remove(&id) {
                trace!("Discarding load result for pruned media '{}'.", id);
                continue;
            }
            if let Ok(LoadedMedia::Image(img)) = &result {
                self.images.insert(id.clone(), img.clone());
            }
            out.push((id, result));
        }
        out
    }

    /// Drops cached images and pending loads for media no longer in the playlist.
    pub fn retain_only(&mut self, keep: &HashSet<&str>) {
        let before = self.images.len();
        self.images.retain(|id, _| keep.contains(id.as_str()));
        self.in_flight.retain(|id| keep.contains(id.as_str()));
        if self.images.len() != before {
            info!("Pruned {} cached image(s) no longer in the playlist.", before - self.images.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img() -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(2, 2))
    }

    impl MediaCacheManager {
        fn image(&self, media_id: &str) -> Option<Arc<RgbaImage>> {
            self.images.get(media_id).cloned()
        }

        fn is_loading(&self, media_id: &str) -> bool {
            self.in_flight.contains(media_id)
        }
    }

    #[test]
    fn test_begin_load_deduplicates_pending_and_cached() {
        let mut cache = MediaCacheManager::new();
        let sink = cache.begin_load("a").unwrap();
        assert!(cache.is_loading("a"));
        assert!(cache.begin_load("a").is_none());

        sink.complete(Ok(LoadedMedia::Image(img())));
        let done = cache.drain_completed();
        assert_eq!(done.len(), 1);
        assert!(!cache.is_loading("a"));
        assert!(cache.image("a").is_some());
        assert!(cache.begin_load("a").is_none());
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let mut cache = MediaCacheManager::new();
        cache.begin_load("v").unwrap().complete(Err(MediaError::MissingSource("v".into())));
        let done = cache.drain_completed();
        assert!(matches!(done[0].1, Err(MediaError::MissingSource(_))));
        assert!(cache.image("v").is_none());
        assert!(cache.begin_load("v").is_some());
    }

    #[test]
    fn test_retain_only_prunes_cache_and_stale_results() {
        let mut cache = MediaCacheManager::new();
        cache.begin_load("keep").unwrap().complete(Ok(LoadedMedia::Image(img())));
        cache.begin_load("gone").unwrap().complete(Ok(LoadedMedia::Image(img())));
        cache.drain_completed();

        let late = cache.begin_load("late").unwrap();
        cache.retain_only(&HashSet::from(["keep"]));
        late.complete(Ok(LoadedMedia::Image(img())));

        assert!(cache.drain_completed().is_empty());
        assert!(cache.image("keep").is_some());
        assert!(cache.image("gone").is_none());
        assert!(cache.image("late").is_none());
    }
}
