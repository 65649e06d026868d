//! Quality and storage preferences shared by the transformer and loader.
//!
//! Both values live in one atomic byte, so a reader never observes a storage
//! mode from one update paired with a quality from another. Reads are plain
//! atomic loads; a reader may see a slightly stale value, which is fine.
//!
//! A quality change notifies registered listeners and clears registered
//! operation caches, since the same request now produces different pixels.
//! Registrations live as long as the [`QualitySubscription`] they return.
//! Caches are held weakly and each distinct cache is cleared once per change,
//! however many transformers share it.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::image::StorageMode;

/// Resampling quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    /// Nearest-neighbor affine drawing.
    Low,
    /// Bilinear affine drawing.
    Medium,
    /// Windowed-filter resampling (Mitchell / Lanczos3).
    #[default]
    High,
}

/// User-facing preference values, as stored by the configuration system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceSettings {
    /// Prefer memory-mapped files for large images.
    pub prefer_memory_mapped: bool,
    /// Use high-quality (filtered) scaling.
    pub high_quality_scaling: bool,
}

impl Default for PreferenceSettings {
    fn default() -> Self {
        Self {
            prefer_memory_mapped: false,
            high_quality_scaling: true,
        }
    }
}

impl PreferenceSettings {
    pub fn storage_mode(&self) -> StorageMode {
        if self.prefer_memory_mapped {
            StorageMode::MemoryMapped
        } else {
            StorageMode::Heap
        }
    }

    pub fn quality(&self) -> Quality {
        if self.high_quality_scaling {
            Quality::High
        } else {
            Quality::Medium
        }
    }
}

/// A consistent view of both preference values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceSnapshot {
    pub storage_mode: StorageMode,
    pub quality: Quality,
}

impl PreferenceSnapshot {
    fn encode(self) -> u8 {
        let storage = match self.storage_mode {
            StorageMode::Heap => 0,
            StorageMode::MemoryMapped => 1,
        };
        let quality = match self.quality {
            Quality::Low => 0,
            Quality::Medium => 1,
            Quality::High => 2,
        };
        storage | quality << 1
    }

    fn decode(bits: u8) -> Self {
        let storage_mode = if bits & 1 == 1 {
            StorageMode::MemoryMapped
        } else {
            StorageMode::Heap
        };
        let quality = match bits >> 1 {
            0 => Quality::Low,
            1 => Quality::Medium,
            _ => Quality::High,
        };
        Self {
            storage_mode,
            quality,
        }
    }
}

/// External cache of transform results that must be cleared on quality change.
pub trait OpCache: Send + Sync {
    fn clear(&self);
}

type QualityListener = Arc<dyn Fn(Quality, Quality) + Send + Sync>;

#[derive(Clone)]
enum Watcher {
    Listener(QualityListener),
    Cache(Weak<dyn OpCache>),
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    watchers: Vec<(u64, Watcher)>,
}

impl Registry {
    fn insert(&mut self, watcher: Watcher) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.watchers.push((id, watcher));
        id
    }
}

/// Keeps a quality-change registration alive; dropping it unregisters.
#[must_use = "the registration is removed when the subscription is dropped"]
pub struct QualitySubscription {
    id: u64,
    registry: Weak<RwLock<Registry>>,
}

impl fmt::Debug for QualitySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualitySubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for QualitySubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .watchers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Atomically published preference state.
pub struct Preferences {
    state: AtomicU8,
    registry: Arc<RwLock<Registry>>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self::from_settings(&PreferenceSettings::default())
    }
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Preferences {
    pub fn new(storage_mode: StorageMode, quality: Quality) -> Self {
        let snapshot = PreferenceSnapshot {
            storage_mode,
            quality,
        };
        Self {
            state: AtomicU8::new(snapshot.encode()),
            registry: Arc::default(),
        }
    }

    pub fn from_settings(settings: &PreferenceSettings) -> Self {
        Self::new(settings.storage_mode(), settings.quality())
    }

    /// Both values from a single load.
    pub fn snapshot(&self) -> PreferenceSnapshot {
        PreferenceSnapshot::decode(self.state.load(Ordering::Acquire))
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.snapshot().storage_mode
    }

    pub fn quality(&self) -> Quality {
        self.snapshot().quality
    }

    pub fn set_storage_mode(&self, storage_mode: StorageMode) {
        self.publish(|s| PreferenceSnapshot { storage_mode, ..s });
    }

    /// Set the quality. Returns true if the value changed.
    pub fn set_quality(&self, quality: Quality) -> bool {
        self.publish(|s| PreferenceSnapshot { quality, ..s })
    }

    /// Apply settings delivered by the configuration system.
    pub fn apply(&self, settings: &PreferenceSettings) -> bool {
        let storage_mode = settings.storage_mode();
        let quality = settings.quality();
        self.publish(|_| PreferenceSnapshot {
            storage_mode,
            quality,
        })
    }

    /// Register a callback invoked with `(old, new)` after every quality change.
    pub fn on_quality_change<F>(&self, listener: F) -> QualitySubscription
    where
        F: Fn(Quality, Quality) + Send + Sync + 'static,
    {
        self.subscribe(Watcher::Listener(Arc::new(listener)))
    }

    /// Clear `cache` after every quality change while the subscription lives.
    ///
    /// Only a weak reference is kept. A cache registered several times is
    /// still cleared once per change.
    pub fn clear_on_quality_change(&self, cache: &Arc<dyn OpCache>) -> QualitySubscription {
        self.subscribe(Watcher::Cache(Arc::downgrade(cache)))
    }

    fn subscribe(&self, watcher: Watcher) -> QualitySubscription {
        let id = self
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(watcher);
        QualitySubscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .watchers
            .len()
    }

    /// Atomically replace the state; notify listeners if the quality changed.
    fn publish(&self, update: impl Fn(PreferenceSnapshot) -> PreferenceSnapshot) -> bool {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(update(PreferenceSnapshot::decode(bits)).encode())
            })
            .unwrap_or_else(|bits| bits);
        let old = PreferenceSnapshot::decode(previous);
        let new = update(old);

        if old.storage_mode != new.storage_mode {
            debug!(from = ?old.storage_mode, to = ?new.storage_mode, "Storage preference changed");
        }
        if old.quality == new.quality {
            return old != new;
        }

        debug!(from = ?old.quality, to = ?new.quality, "Quality preference changed");
        self.notify(old.quality, new.quality);
        true
    }

    /// Run watchers outside the lock so they may drop subscriptions.
    fn notify(&self, old: Quality, new: Quality) {
        let watchers: Vec<Watcher> = self
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .watchers
            .iter()
            .map(|(_, w)| w.clone())
            .collect();

        let mut cleared: Vec<*const ()> = Vec::new();
        for watcher in watchers {
            match watcher {
                Watcher::Listener(listener) => (*listener)(old, new),
                Watcher::Cache(cache) => {
                    let Some(cache) = cache.upgrade() else {
                        continue;
                    };
                    let key = Arc::as_ptr(&cache) as *const ();
                    if !cleared.contains(&key) {
                        cleared.push(key);
                        debug!(?old, ?new, "Clearing operation cache");
                        cache.clear();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_default_settings() {
        let prefs = Preferences::default();
        assert_eq!(prefs.storage_mode(), StorageMode::Heap);
        assert_eq!(prefs.quality(), Quality::High);
    }

    #[test]
    fn test_snapshot_encoding_round_trip() {
        for storage_mode in [StorageMode::Heap, StorageMode::MemoryMapped] {
            for quality in [Quality::Low, Quality::Medium, Quality::High] {
                let s = PreferenceSnapshot {
                    storage_mode,
                    quality,
                };
                assert_eq!(PreferenceSnapshot::decode(s.encode()), s);
            }
        }
    }

    #[test]
    fn test_setters_keep_other_field() {
        let prefs = Preferences::new(StorageMode::MemoryMapped, Quality::Low);
        prefs.set_quality(Quality::Medium);
        assert_eq!(prefs.storage_mode(), StorageMode::MemoryMapped);
        prefs.set_storage_mode(StorageMode::Heap);
        assert_eq!(prefs.quality(), Quality::Medium);
    }

    #[test]
    fn test_quality_change_notifies_once() {
        let prefs = Preferences::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _subscription = prefs.on_quality_change(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(prefs.set_quality(Quality::Medium));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Same value again: no notification.
        assert!(!prefs.set_quality(Quality::Medium));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Storage changes do not notify quality listeners.
        prefs.set_storage_mode(StorageMode::MemoryMapped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_apply_settings() {
        let prefs = Preferences::default();
        let settings = PreferenceSettings {
            prefer_memory_mapped: true,
            high_quality_scaling: false,
        };
        assert!(prefs.apply(&settings));
        assert_eq!(
            prefs.snapshot(),
            PreferenceSnapshot {
                storage_mode: StorageMode::MemoryMapped,
                quality: Quality::Medium,
            }
        );
        assert!(!prefs.apply(&settings));
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: PreferenceSettings =
            serde_json::from_str(r#"{"prefer_memory_mapped": true}"#).unwrap();
        assert!(settings.prefer_memory_mapped);
        assert!(settings.high_quality_scaling);

        let json = serde_json::to_string(&PreferenceSettings::default()).unwrap();
        let back: PreferenceSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PreferenceSettings::default());
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_state() {
        let prefs = Arc::new(Preferences::new(StorageMode::Heap, Quality::Low));
        let writer = {
            let prefs = Arc::clone(&prefs);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let settings = if i % 2 == 0 {
                        PreferenceSettings {
                            prefer_memory_mapped: true,
                            high_quality_scaling: true,
                        }
                    } else {
                        PreferenceSettings {
                            prefer_memory_mapped: false,
                            high_quality_scaling: false,
                        }
                    };
                    prefs.apply(&settings);
                }
            })
        };

        for _ in 0..2000 {
            let s = prefs.snapshot();
            let consistent = matches!(
                (s.storage_mode, s.quality),
                (StorageMode::MemoryMapped, Quality::High)
                    | (StorageMode::Heap, Quality::Medium)
                    | (StorageMode::Heap, Quality::Low)
            );
            assert!(consistent, "torn snapshot {:?}", s);
        }
        writer.join().unwrap();
    }

    #[derive(Default)]
    struct CountingCache(AtomicUsize);

    impl OpCache for CountingCache {
        fn clear(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_dropped_subscription_stops_notifying() {
        let prefs = Preferences::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = prefs.on_quality_change(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(prefs.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(prefs.subscriber_count(), 0);
        prefs.set_quality(Quality::Low);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shared_cache_cleared_once_per_change() {
        let prefs = Preferences::default();
        let cache = Arc::new(CountingCache::default());
        let shared: Arc<dyn OpCache> = cache.clone();
        let _first = prefs.clear_on_quality_change(&shared);
        let _second = prefs.clear_on_quality_change(&shared);

        prefs.set_quality(Quality::Medium);
        assert_eq!(cache.0.load(Ordering::SeqCst), 1);
        prefs.set_quality(Quality::High);
        assert_eq!(cache.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_is_held_weakly() {
        let prefs = Preferences::default();
        let cache: Arc<dyn OpCache> = Arc::new(CountingCache::default());
        let _subscription = prefs.clear_on_quality_change(&cache);
        assert_eq!(Arc::strong_count(&cache), 1);

        drop(cache);
        assert!(prefs.set_quality(Quality::Low));
    }
}
