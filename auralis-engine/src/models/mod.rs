pub mod chunk;
pub mod params;

pub use chunk::{ChunkFault, ChunkFaultKind, DynamicsDecision, ProcessedChunk, QuickAnalysis};
pub use params::{
    AdaptiveParameters, Philosophy, Preset, RecordingType, SpectralStrategy, StereoStrategy,
};
