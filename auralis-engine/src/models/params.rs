use serde::{Deserialize, Serialize};

/// What kind of master the classifier believes it is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingType {
    Studio,
    Bootleg,
    Metal,
    HdBrightTransparent,
    /// Best profile score fell below the classification threshold.
    Unknown,
}

impl RecordingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Studio => "studio",
            Self::Bootleg => "bootleg",
            Self::Metal => "metal",
            Self::HdBrightTransparent => "hd_bright_transparent",
            Self::Unknown => "unknown",
        }
    }
}

/// High-level processing intent; scales how hard the dynamics stage works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Philosophy {
    Enhance,
    Correct,
    Punch,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralStrategy {
    Brighten,
    Darken,
    Maintain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoStrategy {
    Narrow,
    Maintain,
    Expand,
}

/// Mastering targets derived from a fingerprint + profile match, further
/// shaped by preset, intensity, and personal preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParameters {
    pub bass_db: f32,
    pub mid_db: f32,
    pub treble_db: f32,

    pub spectral_strategy: SpectralStrategy,
    pub target_centroid_hz: f32,

    pub stereo_strategy: StereoStrategy,
    pub stereo_width_target: f32,

    pub crest_target_min: f32,
    pub crest_target_max: f32,
    pub dr_expansion_db: f32,

    pub rms_adjust_db: f32,
    pub peak_headroom_db: f32,

    pub philosophy: Philosophy,
    pub confidence: f32,

    /// Set once personal preferences have been folded in; a second apply
    /// is a no-op.
    #[serde(default)]
    pub adjusted: bool,
}

impl AdaptiveParameters {
    /// The do-nothing parameter set: used for Unknown classifications and
    /// every degraded path (timeout, too-short input, extraction failure).
    pub fn neutral() -> Self {
        Self {
            bass_db: 0.0,
            mid_db: 0.0,
            treble_db: 0.0,
            spectral_strategy: SpectralStrategy::Maintain,
            target_centroid_hz: 2000.0,
            stereo_strategy: StereoStrategy::Maintain,
            stereo_width_target: 0.3,
            crest_target_min: 6.0,
            crest_target_max: 12.0,
            dr_expansion_db: 0.0,
            rms_adjust_db: 0.0,
            peak_headroom_db: -1.0,
            philosophy: Philosophy::Neutral,
            confidence: 0.0,
            adjusted: false,
        }
    }
}

impl Default for AdaptiveParameters {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Named playback tilt requested by the client. `Adaptive` is the identity;
/// the others bias the adaptive result in a fixed direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Adaptive,
    Warm,
    Bright,
    Punchy,
    Neutral,
}

impl Preset {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "adaptive" => Some(Self::Adaptive),
            "warm" => Some(Self::Warm),
            "bright" => Some(Self::Bright),
            "punchy" => Some(Self::Punchy),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// (bass, mid, treble) dB tilt folded into the session parameters.
    pub fn eq_tilt(&self) -> (f32, f32, f32) {
        match self {
            Self::Adaptive => (0.0, 0.0, 0.0),
            Self::Warm => (1.5, 0.0, -1.0),
            Self::Bright => (-0.5, 0.0, 2.0),
            Self::Punchy => (1.0, -0.5, 0.5),
            Self::Neutral => (0.0, 0.0, 0.0),
        }
    }

    /// Neutral suppresses the adaptive blend entirely.
    pub fn blend_scale(&self) -> f32 {
        match self {
            Self::Neutral => 0.0,
            _ => 1.0,
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self::Adaptive
    }
}
