use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::EngineError;

#[derive(Debug, Parser)]
#[command(name = "auralis-engine", about = "Adaptive mastering engine core")]
pub struct Cli {
    /// Path to a TOML config file; CLI flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address for the control channel
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Directory for the fingerprint database and preferences
    #[arg(long, env = "AURALIS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Music library root (track ids resolve relative to it)
    #[arg(long, env = "AURALIS_MUSIC_ROOT")]
    pub music_root: Option<PathBuf>,

    /// Optional JSON file mapping track ids to absolute paths
    #[arg(long)]
    pub track_map: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<SocketAddr>,
    data_dir: Option<PathBuf>,
    music_root: Option<PathBuf>,
    track_map: Option<PathBuf>,
    canonical_sample_rate: Option<u32>,
    chunk_ms: Option<u64>,
    crossfade_ms: Option<u64>,
    overlap_ms: Option<u64>,
    resolver_deadline_secs: Option<u64>,
    ceiling_db: Option<f32>,
    fingerprint_cache_size: Option<usize>,
}

/// Fully resolved engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub music_root: PathBuf,
    pub track_map: Option<PathBuf>,
    pub canonical_sample_rate: u32,
    pub chunk_ms: u64,
    pub crossfade_ms: u64,
    pub overlap_ms: u64,
    pub resolver_deadline_secs: u64,
    pub ceiling_db: f32,
    pub fingerprint_cache_size: usize,
}

impl EngineConfig {
    pub fn load(cli: &Cli) -> Result<Self, EngineError> {
        let file: FileConfig = match &cli.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    EngineError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str(&raw)
                    .map_err(|e| EngineError::Config(format!("invalid config: {e}")))?
            }
            None => FileConfig::default(),
        };

        let data_dir = cli
            .data_dir
            .clone()
            .or(file.data_dir)
            .or_else(|| dirs::data_dir().map(|d| d.join("auralis")))
            .ok_or_else(|| EngineError::Config("no data directory available".into()))?;

        let music_root = cli
            .music_root
            .clone()
            .or(file.music_root)
            .or_else(|| dirs::audio_dir())
            .ok_or_else(|| EngineError::Config("no music root configured".into()))?;

        let config = Self {
            bind: cli
                .bind
                .or(file.bind)
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8766))),
            data_dir,
            music_root,
            track_map: cli.track_map.clone().or(file.track_map),
            canonical_sample_rate: file.canonical_sample_rate.unwrap_or(44100),
            chunk_ms: file.chunk_ms.unwrap_or(10_000),
            crossfade_ms: file.crossfade_ms.unwrap_or(50),
            overlap_ms: file.overlap_ms.unwrap_or(500),
            resolver_deadline_secs: file.resolver_deadline_secs.unwrap_or(60),
            ceiling_db: file.ceiling_db.unwrap_or(-1.0),
            fingerprint_cache_size: file.fingerprint_cache_size.unwrap_or(256),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if !matches!(self.canonical_sample_rate, 44_100 | 48_000) {
            return Err(EngineError::Config(format!(
                "canonical_sample_rate must be 44100 or 48000, got {}",
                self.canonical_sample_rate
            )));
        }
        if !(1_000..=30_000).contains(&self.chunk_ms) {
            return Err(EngineError::Config(format!(
                "chunk_ms must be within 1000..=30000, got {}",
                self.chunk_ms
            )));
        }
        if !(20..=500).contains(&self.crossfade_ms) {
            return Err(EngineError::Config(format!(
                "crossfade_ms must be within 20..=500, got {}",
                self.crossfade_ms
            )));
        }
        if self.overlap_ms < self.crossfade_ms {
            return Err(EngineError::Config(
                "overlap_ms must cover crossfade_ms".into(),
            ));
        }
        if !(-6.0..=0.0).contains(&self.ceiling_db) {
            return Err(EngineError::Config(format!(
                "ceiling_db must be within -6.0..=0.0, got {}",
                self.ceiling_db
            )));
        }
        Ok(())
    }

    pub fn chunk_samples(&self) -> usize {
        (self.chunk_ms * self.canonical_sample_rate as u64 / 1000) as usize
    }

    pub fn crossfade_samples(&self) -> usize {
        (self.crossfade_ms * self.canonical_sample_rate as u64 / 1000) as usize
    }

    pub fn overlap_samples(&self) -> usize {
        (self.overlap_ms * self.canonical_sample_rate as u64 / 1000) as usize
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("fingerprints.sqlite")
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }

    pub fn feedback_log_path(&self) -> PathBuf {
        self.data_dir.join("feedback.jsonl")
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EngineConfig {
        EngineConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 8766)),
            data_dir: PathBuf::from("/tmp/auralis"),
            music_root: PathBuf::from("/tmp/music"),
            track_map: None,
            canonical_sample_rate: 44100,
            chunk_ms: 10_000,
            crossfade_ms: 50,
            overlap_ms: 500,
            resolver_deadline_secs: 60,
            ceiling_db: -1.0,
            fingerprint_cache_size: 256,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_bad_sample_rate_rejected() {
        let mut c = base();
        c.canonical_sample_rate = 96_000;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_chunk_bounds() {
        let mut c = base();
        c.chunk_ms = 500;
        assert!(c.validate().is_err());
        c.chunk_ms = 31_000;
        assert!(c.validate().is_err());
        c.chunk_ms = 30_000;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_crossfade_bounds() {
        let mut c = base();
        c.crossfade_ms = 10;
        assert!(c.validate().is_err());
        c.crossfade_ms = 600;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_sample_conversions() {
        let c = base();
        assert_eq!(c.chunk_samples(), 441_000);
        assert_eq!(c.crossfade_samples(), 2_205);
        assert_eq!(c.overlap_samples(), 22_050);
    }
}
