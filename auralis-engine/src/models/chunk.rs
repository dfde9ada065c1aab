use serde::{Deserialize, Serialize};

/// Per-chunk outcome of the loudness-war restraint policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DynamicsDecision {
    /// Loud and crushed: expand upward instead of processing further.
    CompressedLoud { expansion_factor: f32 },
    /// Loud but still dynamic: leave the signal alone.
    DynamicLoud,
    /// Quiet or moderate: run the full adaptive chain.
    QuietModerate,
}

impl DynamicsDecision {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::DynamicLoud)
    }
}

/// Lightweight per-chunk measurements driving the dynamics decision and
/// spectral nudges. Internal only; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuickAnalysis {
    pub lufs: f32,
    pub crest_db: f32,
    pub centroid_hz: f32,
}

/// A local failure that turned this chunk into silence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFault {
    pub kind: ChunkFaultKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFaultKind {
    Decode,
    Dsp,
}

impl ChunkFaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode_error",
            Self::Dsp => "dsp_error",
        }
    }
}

/// One processed slice of the output stream.
///
/// `index` is the emission counter (strictly previous + 1 for the life of
/// the session, across seeks); `start_sample` is the position in the track.
#[derive(Debug, Clone)]
pub struct ProcessedChunk {
    pub index: u64,
    pub start_sample: u64,
    pub n_samples: usize,
    pub channels: u16,
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub fade_in_samples: usize,
    pub fade_out_samples: usize,
    pub decision: DynamicsDecision,
    pub lufs: f32,
    pub crest_db: f32,
    /// Set when this chunk was replaced by silence after a local failure.
    pub error: Option<ChunkFault>,
}

impl ProcessedChunk {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.n_samples as u64 * 1000) / self.sample_rate as u64
    }

    /// Interleaved 16-bit little-endian PCM payload for the wire.
    pub fn to_pcm16(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.n_samples * 4);
        for (l, r) in self.left.iter().zip(self.right.iter()) {
            for sample in [l, r] {
                let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                out.extend_from_slice(&clamped.to_le_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(left: Vec<f32>, right: Vec<f32>) -> ProcessedChunk {
        let n = left.len();
        ProcessedChunk {
            index: 0,
            start_sample: 0,
            n_samples: n,
            channels: 2,
            sample_rate: 44100,
            left,
            right,
            fade_in_samples: 0,
            fade_out_samples: 0,
            decision: DynamicsDecision::QuietModerate,
            lufs: -20.0,
            crest_db: 10.0,
            error: None,
        }
    }

    #[test]
    fn test_pcm16_length_and_interleaving() {
        let c = chunk(vec![0.0, 1.0], vec![-1.0, 0.0]);
        let pcm = c.to_pcm16();
        assert_eq!(pcm.len(), 8);

        let l0 = i16::from_le_bytes([pcm[0], pcm[1]]);
        let r0 = i16::from_le_bytes([pcm[2], pcm[3]]);
        let l1 = i16::from_le_bytes([pcm[4], pcm[5]]);
        assert_eq!(l0, 0);
        assert_eq!(r0, -i16::MAX);
        assert_eq!(l1, i16::MAX);
    }

    #[test]
    fn test_pcm16_clamps_overs() {
        let c = chunk(vec![1.5], vec![-1.5]);
        let pcm = c.to_pcm16();
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([pcm[2], pcm[3]]), -i16::MAX);
    }

    #[test]
    fn test_duration_ms() {
        let c = chunk(vec![0.0; 44100], vec![0.0; 44100]);
        assert_eq!(c.duration_ms(), 1000);
    }

    #[test]
    fn test_decision_serde() {
        let d = DynamicsDecision::CompressedLoud {
            expansion_factor: 0.45,
        };
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("compressed_loud"));
        let back: DynamicsDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
