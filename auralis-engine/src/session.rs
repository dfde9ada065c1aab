/// Stream controller
///
/// One controller task per play session. It resolves the fingerprint
/// (bounded by the deadline), classifies once, folds in preferences, then
/// drives a single blocking producer worker through the chunked processor.
/// Chunks flow through a small bounded channel, so a slow client
/// back-pressures the producer instead of ballooning memory.
///
/// State machine:
///   Preparing -> Streaming -> { Paused, Seeking, Streaming, Ended, Cancelled }
///
/// Seek tears the producer down, realigns to the containing chunk, resets
/// DSP state (a fresh pipeline), and keeps the emission counter running so
/// chunk indices stay strictly consecutive for the whole session.

use crate::chunker::{ChunkedProcessor, ChunkerConfig};
use crate::classifier::{self, Classification};
use crate::config::EngineConfig;
use crate::decoder;
use crate::models::{ProcessedChunk, Preset};
use crate::pipeline::SessionParams;
use crate::preferences::{FeedbackRecord, PreferencesService};
use crate::profiles::ProfileService;
use crate::resolver::{FingerprintResolver, Resolution};
use crate::store::FingerprintStore;
use crate::tracks::{TrackId, TrackResolver};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Pause,
    Resume,
    Seek { position_ms: u64 },
    SetPreset { preset: String },
    SetIntensity { intensity: f32 },
    Rate { rating: u8, comment: Option<String> },
    Stop,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StreamStart {
        sample_rate: u32,
        channels: u16,
        total_ms: u64,
        chunk_ms: u64,
    },
    Chunk(ProcessedChunk),
    Progress {
        ms_emitted: u64,
    },
    /// The producer fell behind real time for the tagged chunk.
    Stall {
        index: u64,
    },
    Error {
        kind: String,
        message: String,
    },
    StreamEnd,
}

/// Shared read-only services a session borrows.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub store: Arc<FingerprintStore>,
    pub resolver: Arc<FingerprintResolver>,
    pub preferences: Arc<PreferencesService>,
    pub profiles: Arc<ProfileService>,
    pub tracks: Arc<dyn TrackResolver>,
}

pub struct SessionHandle {
    pub commands: mpsc::Sender<SessionCommand>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// This many DSP invariant trips in a row end the session.
const MAX_DSP_FAULTS: u32 = 3;

enum ProducerMsg {
    Chunk {
        chunk: ProcessedChunk,
        elapsed: Duration,
    },
    Done,
}

struct Producer {
    handle: JoinHandle<()>,
    rx: mpsc::Receiver<ProducerMsg>,
    cancel: Arc<AtomicBool>,
}

impl Producer {
    fn spawn(
        cfg: ChunkerConfig,
        start_index: u64,
        start_sample: u64,
        params: Arc<RwLock<SessionParams>>,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(4);
        let cancel_flag = Arc::clone(&cancel);

        let handle = tokio::task::spawn_blocking(move || {
            let mut processor = ChunkedProcessor::new(cfg, start_index, start_sample);
            loop {
                if cancel_flag.load(Ordering::Relaxed) {
                    break;
                }
                let session = params.read().clone();
                let started = Instant::now();
                match processor.produce_next(&session) {
                    Some(chunk) => {
                        let elapsed = started.elapsed();
                        if tx.blocking_send(ProducerMsg::Chunk { chunk, elapsed }).is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = tx.blocking_send(ProducerMsg::Done);
                        break;
                    }
                }
            }
        });

        Self { handle, rx, cancel }
    }

    /// Cooperative teardown: flag, unblock, join.
    async fn cancel(self) {
        self.cancel.store(true, Ordering::Relaxed);
        drop(self.rx); // unblocks a producer stuck on a full channel
        let _ = self.handle.await;
    }
}

/// Spawn a session task; the handle carries the command/event channels.
pub fn spawn_session(
    ctx: EngineContext,
    track_id: TrackId,
    preset: Preset,
    intensity: f32,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(8);

    tokio::spawn(async move {
        run_session(ctx, track_id, preset, intensity, cmd_rx, event_tx).await;
    });

    SessionHandle {
        commands: cmd_tx,
        events: event_rx,
    }
}

async fn run_session(
    ctx: EngineContext,
    track_id: TrackId,
    preset: Preset,
    intensity: f32,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
) {
    // ---- Preparing ----
    let Some(path) = ctx.tracks.resolve(&track_id) else {
        let _ = events
            .send(SessionEvent::Error {
                kind: "track_missing".into(),
                message: format!("track not found: {track_id}"),
            })
            .await;
        let _ = events.send(SessionEvent::StreamEnd).await;
        return;
    };

    let probe_path = path.clone();
    let total_secs =
        match tokio::task::spawn_blocking(move || decoder::probe_duration(&probe_path)).await {
            Ok(Ok(secs)) => secs,
            Ok(Err(e)) => {
                let _ = events
                    .send(SessionEvent::Error {
                        kind: "decode_error".into(),
                        message: e.to_string(),
                    })
                    .await;
                let _ = events.send(SessionEvent::StreamEnd).await;
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "probe task failed");
                let _ = events.send(SessionEvent::StreamEnd).await;
                return;
            }
        };

    let deadline = Duration::from_secs(ctx.config.resolver_deadline_secs);
    let resolution = ctx.resolver.resolve(&track_id, &path, deadline).await;
    let (classification, fingerprint) = match resolution {
        Resolution::Fingerprint(fp) => {
            (classifier::classify(&fp, &ctx.profiles.current()), Some(fp))
        }
        Resolution::Neutral => (Classification::neutral(), None),
    };
    tracing::info!(
        track_id = %track_id,
        recording_type = classification.recording_type.as_str(),
        confidence = classification.confidence,
        "session classified"
    );

    let mut params = classification.params.clone();
    ctx.preferences.apply(&mut params, classification.recording_type);

    let rate = ctx.config.canonical_sample_rate;
    let total_samples = (total_secs * rate as f64).round() as u64;
    let chunk_ms = ctx.config.chunk_ms;
    let chunker_cfg = ChunkerConfig::from_engine(&ctx.config, path, total_samples);

    if events
        .send(SessionEvent::StreamStart {
            sample_rate: rate,
            channels: 2,
            total_ms: (total_secs * 1000.0) as u64,
            chunk_ms,
        })
        .await
        .is_err()
    {
        return;
    }

    // ---- Streaming ----
    let shared_params = Arc::new(RwLock::new(SessionParams::new(params, preset, intensity)));
    let mut producer = Producer::spawn(chunker_cfg.clone(), 0, 0, Arc::clone(&shared_params));
    let mut next_emit_index = 0u64;
    let mut ms_emitted = 0u64;
    let mut paused = false;
    let mut consecutive_dsp_faults = 0u32;

    loop {
        tokio::select! {
            biased;

            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    // Client side dropped the handle: Cancelled
                    producer.cancel().await;
                    return;
                };
                match cmd {
                    SessionCommand::Pause => paused = true,
                    SessionCommand::Resume => paused = false,
                    SessionCommand::SetIntensity { intensity } => {
                        shared_params.write().intensity = intensity.clamp(0.0, 1.0);
                        tracing::debug!(intensity, "intensity updated");
                    }
                    SessionCommand::SetPreset { preset } => match Preset::parse(&preset) {
                        Some(p) => {
                            shared_params.write().preset = p;
                            tracing::debug!(preset = ?p, "preset updated");
                        }
                        None => {
                            let _ = events.send(SessionEvent::Error {
                                kind: "protocol_error".into(),
                                message: format!("unknown preset: {preset}"),
                            }).await;
                        }
                    },
                    SessionCommand::Rate { rating, comment } => {
                        let record = FeedbackRecord {
                            track_id: track_id.clone(),
                            detected_type: classification.recording_type,
                            confidence: classification.confidence,
                            rating: rating.clamp(1, 5),
                            comment,
                            fingerprint,
                            parameters: shared_params.read().params.clone(),
                            timestamp: chrono::Utc::now(),
                        };
                        // Feedback never surfaces errors to the client
                        if let Err(e) = ctx.preferences.record_feedback(&record) {
                            tracing::warn!(error = %e, "feedback not recorded");
                        }
                    }
                    SessionCommand::Stop => {
                        producer.cancel().await;
                        let _ = events.send(SessionEvent::StreamEnd).await;
                        return;
                    }
                    SessionCommand::Seek { position_ms } => {
                        // ---- Seeking ----
                        producer.cancel().await;
                        let target = position_ms * rate as u64 / 1000;
                        if target >= total_samples {
                            let _ = events.send(SessionEvent::StreamEnd).await;
                            return; // Ended
                        }
                        let aligned = ChunkedProcessor::align_to_chunk(&chunker_cfg, target);
                        ms_emitted = position_ms;
                        producer = Producer::spawn(
                            chunker_cfg.clone(),
                            next_emit_index,
                            aligned,
                            Arc::clone(&shared_params),
                        );
                        tracing::debug!(position_ms, aligned, "seek complete");
                    }
                }
            }

            msg = producer.rx.recv(), if !paused => {
                match msg {
                    Some(ProducerMsg::Chunk { chunk, elapsed }) => {
                        let real_time = Duration::from_millis(chunk.duration_ms());
                        if elapsed > real_time {
                            tracing::warn!(index = chunk.index, ?elapsed, "producer behind real time");
                            let _ = events.send(SessionEvent::Stall { index: chunk.index }).await;
                        }
                        match &chunk.error {
                            Some(fault) => {
                                let _ = events.send(SessionEvent::Error {
                                    kind: fault.kind.as_str().into(),
                                    message: fault.message.clone(),
                                }).await;
                                if fault.kind == crate::models::ChunkFaultKind::Dsp {
                                    consecutive_dsp_faults += 1;
                                    if consecutive_dsp_faults >= MAX_DSP_FAULTS {
                                        tracing::error!("repeated dsp faults, cancelling session");
                                        producer.cancel().await;
                                        let _ = events.send(SessionEvent::StreamEnd).await;
                                        return;
                                    }
                                }
                            }
                            None => consecutive_dsp_faults = 0,
                        }
                        next_emit_index = chunk.index + 1;
                        ms_emitted += chunk.duration_ms();
                        if events.send(SessionEvent::Chunk(chunk)).await.is_err() {
                            producer.cancel().await;
                            return;
                        }
                        let _ = events.send(SessionEvent::Progress { ms_emitted }).await;
                    }
                    Some(ProducerMsg::Done) => {
                        let _ = events.send(SessionEvent::StreamEnd).await;
                        producer.cancel().await;
                        return; // Ended
                    }
                    None => {
                        // Producer died; nothing more will arrive
                        let _ = events.send(SessionEvent::StreamEnd).await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordingType;
    use crate::tracks::MapResolver;
    use std::collections::HashMap;

    async fn context(dir: &std::path::Path, tracks: HashMap<TrackId, std::path::PathBuf>) -> EngineContext {
        let store = Arc::new(FingerprintStore::open_in_memory().await.unwrap());
        let resolver = Arc::new(FingerprintResolver::new(Arc::clone(&store), 44100, 16));
        let config = EngineConfig {
            bind: ([127, 0, 0, 1], 0).into(),
            data_dir: dir.to_path_buf(),
            music_root: dir.to_path_buf(),
            track_map: None,
            canonical_sample_rate: 44100,
            chunk_ms: 1_000,
            crossfade_ms: 50,
            overlap_ms: 500,
            resolver_deadline_secs: 60,
            ceiling_db: -1.0,
            fingerprint_cache_size: 16,
        };
        EngineContext {
            config: Arc::new(config),
            store,
            resolver,
            preferences: Arc::new(PreferencesService::in_memory()),
            profiles: Arc::new(ProfileService::load(None)),
            tracks: Arc::new(MapResolver::from_map(tracks)),
        }
    }

    async fn collect_events(handle: &mut SessionHandle, limit: usize) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while events.len() < limit {
            match tokio::time::timeout(Duration::from_secs(30), handle.events.recv()).await {
                Ok(Some(e)) => {
                    let end = matches!(e, SessionEvent::StreamEnd);
                    events.push(e);
                    if end {
                        break;
                    }
                }
                _ => break,
            }
        }
        events
    }

    #[tokio::test]
    async fn test_full_stream_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::testing::tone_wav(dir.path(), "t.wav", 12.0, 0.05, 44100);
        let mut tracks = HashMap::new();
        tracks.insert(TrackId::from("t1"), path);
        let ctx = context(dir.path(), tracks).await;

        let mut handle = spawn_session(ctx, TrackId::from("t1"), Preset::Adaptive, 1.0);
        let events = collect_events(&mut handle, 100).await;

        assert!(matches!(events.first(), Some(SessionEvent::StreamStart { total_ms, .. }) if (*total_ms as i64 - 12_000).abs() < 50));
        assert!(matches!(events.last(), Some(SessionEvent::StreamEnd)));

        let indices: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Chunk(c) => Some(c.index),
                _ => None,
            })
            .collect();
        assert_eq!(indices.len(), 12); // 12 s at 1 s chunks
        for (i, idx) in indices.iter().enumerate() {
            assert_eq!(*idx, i as u64);
        }
    }

    #[tokio::test]
    async fn test_missing_track_errors_and_ends() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), HashMap::new()).await;

        let mut handle = spawn_session(ctx, TrackId::from("ghost"), Preset::Adaptive, 1.0);
        let events = collect_events(&mut handle, 10).await;

        assert!(matches!(
            events.first(),
            Some(SessionEvent::Error { kind, .. }) if kind == "track_missing"
        ));
        assert!(matches!(events.last(), Some(SessionEvent::StreamEnd)));
    }

    #[tokio::test]
    async fn test_stop_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::testing::tone_wav(dir.path(), "t.wav", 12.0, 0.05, 44100);
        let mut tracks = HashMap::new();
        tracks.insert(TrackId::from("t1"), path);
        let ctx = context(dir.path(), tracks).await;

        let mut handle = spawn_session(ctx, TrackId::from("t1"), Preset::Adaptive, 1.0);

        // Wait for the stream to actually start, then stop it
        let first = handle.events.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::StreamStart { .. }));
        handle.commands.send(SessionCommand::Stop).await.unwrap();

        let events = collect_events(&mut handle, 100).await;
        assert!(matches!(events.last(), Some(SessionEvent::StreamEnd)));
    }

    #[tokio::test]
    async fn test_seek_past_end_ends_without_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::testing::tone_wav(dir.path(), "t.wav", 12.0, 0.05, 44100);
        let mut tracks = HashMap::new();
        tracks.insert(TrackId::from("t1"), path);
        let ctx = context(dir.path(), tracks).await;

        let mut handle = spawn_session(ctx, TrackId::from("t1"), Preset::Adaptive, 1.0);
        let first = handle.events.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::StreamStart { .. }));

        handle
            .commands
            .send(SessionCommand::Seek { position_ms: 60_000 })
            .await
            .unwrap();

        let events = collect_events(&mut handle, 100).await;
        assert!(matches!(events.last(), Some(SessionEvent::StreamEnd)));
    }

    #[tokio::test]
    async fn test_neutral_fallback_with_zero_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::testing::tone_wav(dir.path(), "t.wav", 12.0, 0.05, 44100);
        let mut tracks = HashMap::new();
        tracks.insert(TrackId::from("t1"), path);
        let mut ctx = context(dir.path(), tracks).await;

        // Cold cache + zero deadline: the session must stream neutrally
        Arc::get_mut(&mut ctx.config).unwrap().resolver_deadline_secs = 0;
        let mut handle = spawn_session(ctx, TrackId::from("t1"), Preset::Adaptive, 1.0);
        let events = collect_events(&mut handle, 3).await;

        assert!(matches!(events.first(), Some(SessionEvent::StreamStart { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Chunk(_))));
    }

    #[tokio::test]
    async fn test_rate_track_appends_feedback() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::testing::tone_wav(dir.path(), "t.wav", 12.0, 0.05, 44100);
        let mut tracks = HashMap::new();
        tracks.insert(TrackId::from("t1"), path);

        let log_path = dir.path().join("feedback.jsonl");
        let mut ctx = context(dir.path(), tracks).await;
        ctx.preferences = Arc::new(PreferencesService::load(None, Some(log_path.clone())));

        let mut handle = spawn_session(ctx, TrackId::from("t1"), Preset::Adaptive, 1.0);
        let first = handle.events.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::StreamStart { .. }));

        handle
            .commands
            .send(SessionCommand::Rate {
                rating: 4,
                comment: Some("nice".into()),
            })
            .await
            .unwrap();
        handle.commands.send(SessionCommand::Stop).await.unwrap();
        let _ = collect_events(&mut handle, 100).await;

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let record: FeedbackRecord = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record.rating, 4);
        assert_eq!(record.track_id, TrackId::from("t1"));
        // Tone fixtures don't match any profile
        assert_eq!(record.detected_type, RecordingType::Unknown);
    }
}
