/// Fingerprint resolution
///
/// Tiered lookup: in-memory LRU, then the store, then a sidecar file, then
/// on-demand extraction. Extraction is single-flight per track - concurrent
/// resolves coalesce onto one running job - and each caller applies its own
/// deadline. A deadline that expires downgrades that caller to Neutral
/// while the extraction keeps running and persists for next time.
///
/// This path never returns an error: every failure mode degrades to
/// Neutral and is logged.

use crate::decoder;
use crate::sidecar;
use crate::store::FingerprintStore;
use crate::tracks::TrackId;
use auralis_dsp::{extract, Fingerprint, StereoBuffer, MAX_ANALYSIS_SECS};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Fingerprint(Fingerprint),
    /// No fingerprint available in time; callers proceed unguided.
    Neutral,
}

pub struct FingerprintResolver {
    store: Arc<FingerprintStore>,
    memory: Mutex<LruCache<TrackId, Fingerprint>>,
    inflight: tokio::sync::Mutex<HashMap<TrackId, broadcast::Sender<Option<Fingerprint>>>>,
    canonical_rate: u32,
}

impl FingerprintResolver {
    pub fn new(store: Arc<FingerprintStore>, canonical_rate: u32, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap();
        Self {
            store,
            memory: Mutex::new(LruCache::new(capacity)),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
            canonical_rate,
        }
    }

    pub async fn resolve(
        self: &Arc<Self>,
        track_id: &TrackId,
        path: &Path,
        deadline: Duration,
    ) -> Resolution {
        // Tier 0: memory
        if let Some(fp) = self.memory.lock().get(track_id).copied() {
            return Resolution::Fingerprint(fp);
        }

        // Tier 1: store (read failures degrade to a miss)
        match self.store.get(track_id).await {
            Ok(Some(stored)) => {
                self.memory
                    .lock()
                    .put(track_id.clone(), stored.fingerprint);
                return Resolution::Fingerprint(stored.fingerprint);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(track_id = %track_id, error = %e, "store read failed, treating as miss");
            }
        }

        // Tier 2: sidecar next to the audio file
        let sidecar_result = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || sidecar::read_sidecar(&path)).await
        };
        match sidecar_result {
            Ok(Ok(Some(fp))) => {
                if let Err(e) = self.store.put(track_id, &fp).await {
                    tracing::warn!(track_id = %track_id, error = %e, "persisting sidecar fingerprint failed");
                }
                self.memory.lock().put(track_id.clone(), fp);
                tracing::debug!(track_id = %track_id, "fingerprint loaded from sidecar");
                return Resolution::Fingerprint(fp);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                tracing::warn!(track_id = %track_id, error = %e, "sidecar unreadable, will extract");
            }
            Err(e) => {
                tracing::warn!(track_id = %track_id, error = %e, "sidecar task failed");
            }
        }

        // Tier 3: extraction, coalesced per track
        let mut rx = self.subscribe_extraction(track_id, path).await;
        match tokio::time::timeout(deadline, rx.recv()).await {
            Ok(Ok(Some(fp))) => Resolution::Fingerprint(fp),
            Ok(_) => Resolution::Neutral,
            Err(_) => {
                tracing::info!(track_id = %track_id, "fingerprint deadline exceeded, continuing neutral");
                Resolution::Neutral
            }
        }
    }

    /// Join the in-flight extraction for this track, starting one if none
    /// is running.
    async fn subscribe_extraction(
        self: &Arc<Self>,
        track_id: &TrackId,
        path: &Path,
    ) -> broadcast::Receiver<Option<Fingerprint>> {
        let mut inflight = self.inflight.lock().await;
        if let Some(tx) = inflight.get(track_id) {
            return tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(1);
        inflight.insert(track_id.clone(), tx.clone());
        drop(inflight);

        let resolver = Arc::clone(self);
        let track_id = track_id.clone();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            let result = resolver.run_extraction(&track_id, &path).await;
            if result.is_none() {
                tracing::warn!(track_id = %track_id, "fingerprint extraction failed");
            }
            resolver.inflight.lock().await.remove(&track_id);
            // Receivers may all have timed out; that is fine
            let _ = tx.send(result);
        });

        rx
    }

    async fn run_extraction(&self, track_id: &TrackId, path: &Path) -> Option<Fingerprint> {
        let rate = self.canonical_rate;
        let decode_path = path.to_path_buf();

        let decoded: Result<StereoBuffer, _> = tokio::task::spawn_blocking(move || {
            let total = decoder::probe_duration(&decode_path)?;
            let dur = total.min(MAX_ANALYSIS_SECS as f64);
            decoder::decode_range(&decode_path, 0.0, dur, rate)
        })
        .await
        .ok()?;

        let buffer = match decoded {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(track_id = %track_id, error = %e, "decode for fingerprint failed");
                return None;
            }
        };

        let fp = match tokio::task::spawn_blocking(move || extract(&buffer)).await {
            Ok(Ok(fp)) => fp,
            Ok(Err(e)) => {
                tracing::info!(track_id = %track_id, error = %e, "fingerprint not extractable");
                return None;
            }
            Err(e) => {
                tracing::warn!(track_id = %track_id, error = %e, "extraction task failed");
                return None;
            }
        };

        if let Err(e) = self.store.put(track_id, &fp).await {
            tracing::warn!(track_id = %track_id, error = %e, "persisting fingerprint failed");
        }
        // Best effort; read-only music directories are normal
        if let Err(e) = sidecar::write_sidecar(path, &fp) {
            tracing::debug!(track_id = %track_id, error = %e, "sidecar not written");
        }
        self.memory.lock().put(track_id.clone(), fp);
        tracing::debug!(track_id = %track_id, "fingerprint extracted and persisted");
        Some(fp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn write_wav(path: &Path, secs: f32, sample_rate: u32) {
        let (l, r) = testing::tone_channels(secs, 0.4, sample_rate);
        testing::write_wav(path, &l, &r, sample_rate);
    }

    async fn resolver() -> Arc<FingerprintResolver> {
        let store = Arc::new(FingerprintStore::open_in_memory().await.unwrap());
        Arc::new(FingerprintResolver::new(store, 44100, 16))
    }

    #[tokio::test]
    async fn test_zero_deadline_on_cold_cache_is_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_wav(&path, 12.0, 44100);

        let r = resolver().await;
        let started = std::time::Instant::now();
        let result = r
            .resolve(&TrackId::from("t1"), &path, Duration::from_millis(0))
            .await;
        assert_eq!(result, Resolution::Neutral);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_extraction_then_store_hit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_wav(&path, 12.0, 44100);

        let r = resolver().await;
        let id = TrackId::from("t1");
        let first = r.resolve(&id, &path, Duration::from_secs(60)).await;
        let Resolution::Fingerprint(fp) = first else {
            panic!("expected a fingerprint");
        };
        assert!(fp.is_valid());
        assert!(r.store.exists(&id).await.unwrap());

        // Second resolve must be a cache hit with identical values
        let second = r.resolve(&id, &path, Duration::from_millis(1)).await;
        assert_eq!(second, Resolution::Fingerprint(fp));
    }

    #[tokio::test]
    async fn test_sidecar_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_wav(&path, 12.0, 44100);

        // Precompute a sidecar with distinctive values
        let mut values = [0.1f32; 25];
        values[7] = -14.0;
        let fp = Fingerprint::from_array(values);
        sidecar::write_sidecar(&path, &fp).unwrap();

        let r = resolver().await;
        let id = TrackId::from("t1");
        let result = r.resolve(&id, &path, Duration::from_millis(50)).await;
        assert_eq!(result, Resolution::Fingerprint(fp));
        // Sidecar hit must be persisted to the store
        assert!(r.store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_degrades_to_neutral() {
        let r = resolver().await;
        let result = r
            .resolve(
                &TrackId::from("gone"),
                Path::new("/nonexistent.wav"),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(result, Resolution::Neutral);
    }

    #[tokio::test]
    async fn test_short_track_is_neutral() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 3.0, 44100);

        let r = resolver().await;
        let result = r
            .resolve(&TrackId::from("short"), &path, Duration::from_secs(30))
            .await;
        assert_eq!(result, Resolution::Neutral);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_wav(&path, 12.0, 44100);

        let r = resolver().await;
        let id = TrackId::from("t1");

        let a = {
            let r = Arc::clone(&r);
            let id = id.clone();
            let path = path.clone();
            tokio::spawn(async move { r.resolve(&id, &path, Duration::from_secs(60)).await })
        };
        let b = {
            let r = Arc::clone(&r);
            let id = id.clone();
            let path = path.clone();
            tokio::spawn(async move { r.resolve(&id, &path, Duration::from_secs(60)).await })
        };

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        match (ra, rb) {
            (Resolution::Fingerprint(fa), Resolution::Fingerprint(fb)) => {
                assert_eq!(fa.to_array(), fb.to_array());
            }
            other => panic!("expected two fingerprints, got {other:?}"),
        }
    }
}
