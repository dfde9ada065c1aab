/// Chunked stream processor
///
/// Walks a track in fixed-size chunks, runs each through the policy and the
/// mastering pipeline, and blends boundaries with an equal-power crossfade.
/// Each chunk is decoded with an overlap tail; the processed head of that
/// overlap becomes the fade-out partner for the next chunk's head, so the
/// emitted bodies concatenate without a discontinuity.
///
/// The processor is synchronous and deterministic; the session layer owns
/// threading, pacing, and stall detection.

use crate::config::EngineConfig;
use crate::decoder;
use crate::models::{ChunkFault, ChunkFaultKind, ProcessedChunk, QuickAnalysis};
use crate::pipeline::{MasteringPipeline, SessionParams};
use crate::policy;
use auralis_dsp::{
    compute_spectral_shape, crest_factor_db, fade, integrated_lufs, StereoBuffer,
};
use std::path::PathBuf;

/// Post-seek / session-start fade-in length.
const FADE_IN_MS: u64 = 20;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub path: PathBuf,
    pub canonical_rate: u32,
    pub chunk_samples: usize,
    pub overlap_samples: usize,
    pub crossfade_samples: usize,
    pub total_samples: u64,
    pub ceiling_db: f32,
}

impl ChunkerConfig {
    pub fn from_engine(config: &EngineConfig, path: PathBuf, total_samples: u64) -> Self {
        Self {
            path,
            canonical_rate: config.canonical_sample_rate,
            chunk_samples: config.chunk_samples(),
            overlap_samples: config.overlap_samples(),
            crossfade_samples: config.crossfade_samples(),
            total_samples,
            ceiling_db: config.ceiling_db,
        }
    }
}

pub struct ChunkedProcessor {
    cfg: ChunkerConfig,
    pipeline: MasteringPipeline,
    /// Next body start, in track samples.
    position: u64,
    /// Emission counter; survives seeks at the session layer.
    next_index: u64,
    /// Processed overlap head of the previous chunk.
    prev_tail: Option<(Vec<f32>, Vec<f32>)>,
    pending_fade_in: bool,
}

impl ChunkedProcessor {
    /// `start_index` continues the session's emission counter;
    /// `start_sample` is chunk-aligned by the caller.
    pub fn new(cfg: ChunkerConfig, start_index: u64, start_sample: u64) -> Self {
        let pipeline = MasteringPipeline::new(cfg.canonical_rate, cfg.ceiling_db);
        Self {
            cfg,
            pipeline,
            position: start_sample,
            next_index: start_index,
            prev_tail: None,
            pending_fade_in: true,
        }
    }

    /// The chunk-aligned start sample containing `sample`.
    pub fn align_to_chunk(cfg: &ChunkerConfig, sample: u64) -> u64 {
        (sample / cfg.chunk_samples as u64) * cfg.chunk_samples as u64
    }

    pub fn position_samples(&self) -> u64 {
        self.position
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn finished(&self) -> bool {
        self.position >= self.cfg.total_samples
    }

    /// Produce the next chunk, or None past the end of the track.
    ///
    /// Local failures (decode, DSP) never bubble up: the chunk body becomes
    /// silence and the error rides along on the chunk for the session to
    /// report.
    pub fn produce_next(&mut self, session: &SessionParams) -> Option<ProcessedChunk> {
        if self.finished() {
            return None;
        }

        let sr = self.cfg.canonical_rate;
        let body_len = self
            .cfg
            .chunk_samples
            .min((self.cfg.total_samples - self.position) as usize);
        let is_last = self.position + body_len as u64 >= self.cfg.total_samples;
        let decode_len = if is_last {
            body_len
        } else {
            body_len + self.cfg.overlap_samples
        };

        let start_secs = self.position as f64 / sr as f64;
        let dur_secs = decode_len as f64 / sr as f64;

        let mut error = None;
        let mut buf = match decoder::decode_range(&self.cfg.path, start_secs, dur_secs, sr) {
            Ok(buf) => buf,
            Err(e) => {
                tracing::error!(error = %e, start_secs, "chunk decode failed, substituting silence");
                error = Some(ChunkFault {
                    kind: ChunkFaultKind::Decode,
                    message: e.to_string(),
                });
                StereoBuffer::silence(decode_len, sr)
            }
        };

        let quick = quick_analysis(&buf, body_len);
        let decision = policy::decide(quick.lufs, quick.crest_db);
        tracing::debug!(
            index = self.next_index,
            lufs = quick.lufs,
            crest_db = quick.crest_db,
            ?decision,
            "chunk dynamics decision"
        );

        if error.is_none() {
            if let Err(e) = self.pipeline.process(&mut buf, session, &decision, &quick) {
                tracing::error!(error = %e, index = self.next_index, "dsp failure, substituting silence");
                self.pipeline.reset();
                error = Some(ChunkFault {
                    kind: ChunkFaultKind::Dsp,
                    message: e.to_string(),
                });
                buf = StereoBuffer::silence(decode_len, sr);
            }
        }

        // Boundary blending: previous tail wins the head of this body
        let mut fade_in_samples = 0;
        if let Some((tail_l, tail_r)) = self.prev_tail.take() {
            fade::crossfade_head(&mut buf.left, &tail_l, self.cfg.crossfade_samples);
            fade::crossfade_head(&mut buf.right, &tail_r, self.cfg.crossfade_samples);
            fade_in_samples = self.cfg.crossfade_samples.min(buf.len());
        } else if self.pending_fade_in {
            fade_in_samples = ((FADE_IN_MS * sr as u64) / 1000) as usize;
            fade::fade_in(&mut buf.left, &mut buf.right, fade_in_samples);
        }
        self.pending_fade_in = false;

        // Stash the processed overlap head for the next boundary
        if !is_last {
            let end = (body_len + self.cfg.crossfade_samples).min(buf.len());
            self.prev_tail = Some((
                buf.left[body_len..end].to_vec(),
                buf.right[body_len..end].to_vec(),
            ));
        }

        buf.left.truncate(body_len);
        buf.right.truncate(body_len);

        let mut fade_out_samples = 0;
        if is_last {
            fade_out_samples = (((FADE_IN_MS * sr as u64) / 1000) as usize).min(body_len);
            fade::fade_out(&mut buf.left, &mut buf.right, fade_out_samples);
        }

        let chunk = ProcessedChunk {
            index: self.next_index,
            start_sample: self.position,
            n_samples: body_len,
            channels: 2,
            sample_rate: sr,
            left: buf.left,
            right: buf.right,
            fade_in_samples,
            fade_out_samples,
            decision,
            lufs: quick.lufs,
            crest_db: quick.crest_db,
            error,
        };

        self.position += body_len as u64;
        self.next_index += 1;
        Some(chunk)
    }
}

fn quick_analysis(buf: &StereoBuffer, body_len: usize) -> QuickAnalysis {
    let body_len = body_len.min(buf.len());
    let left = &buf.left[..body_len];
    let right = &buf.right[..body_len];
    let mono: Vec<f32> = left
        .iter()
        .zip(right.iter())
        .map(|(l, r)| (l + r) * 0.5)
        .collect();
    QuickAnalysis {
        lufs: integrated_lufs(left, right, buf.sample_rate),
        crest_db: crest_factor_db(left, right),
        centroid_hz: compute_spectral_shape(&mono, buf.sample_rate).centroid_hz,
    }
}
