/// Recording-type profiles
///
/// A profile is a reference window per feature dimension (with tolerance
/// and weight) plus the base mastering parameters for material that matches
/// it. Profiles ship as compiled-in defaults and can be overridden by a
/// versioned JSON document; updates go through `ProfileService::update`,
/// which refuses any change that fails the built-in regression gate.

use crate::error::EngineError;
use crate::models::{
    AdaptiveParameters, Philosophy, RecordingType, SpectralStrategy, StereoStrategy,
};
use auralis_dsp::Fingerprint;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Reference range for one fingerprint dimension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionWindow {
    pub low: f32,
    pub high: f32,
    /// Gaussian falloff distance outside the window.
    pub tolerance: f32,
    pub weight: f32,
}

impl DimensionWindow {
    pub fn new(low: f32, high: f32, tolerance: f32, weight: f32) -> Self {
        Self {
            low,
            high,
            tolerance,
            weight,
        }
    }

    pub fn center(&self) -> f32 {
        (self.low + self.high) * 0.5
    }

    /// 1.0 inside the window, Gaussian decay outside it.
    pub fn score(&self, value: f32) -> f32 {
        let distance = if value < self.low {
            self.low - value
        } else if value > self.high {
            value - self.high
        } else {
            return 1.0;
        };
        let t = distance / self.tolerance.max(1e-6);
        (-t * t).exp()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingProfile {
    pub recording_type: RecordingType,
    pub centroid_hz: DimensionWindow,
    pub bass_mid_db: DimensionWindow,
    pub stereo_width: DimensionWindow,
    pub crest_db: DimensionWindow,
    pub base: AdaptiveParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSet {
    pub version: u32,
    pub profiles: Vec<RecordingProfile>,
}

impl ProfileSet {
    pub fn defaults() -> Self {
        Self {
            version: 1,
            profiles: vec![
                RecordingProfile {
                    recording_type: RecordingType::Studio,
                    centroid_hz: DimensionWindow::new(600.0, 800.0, 400.0, 1.0),
                    bass_mid_db: DimensionWindow::new(-2.0, 3.0, 4.0, 1.0),
                    stereo_width: DimensionWindow::new(0.30, 0.50, 0.15, 0.8),
                    crest_db: DimensionWindow::new(6.0, 6.5, 3.0, 1.0),
                    base: AdaptiveParameters {
                        bass_db: 1.0,
                        mid_db: 0.5,
                        treble_db: 1.0,
                        spectral_strategy: SpectralStrategy::Maintain,
                        target_centroid_hz: 700.0,
                        stereo_strategy: StereoStrategy::Maintain,
                        stereo_width_target: 0.40,
                        crest_target_min: 6.0,
                        crest_target_max: 6.5,
                        dr_expansion_db: 0.0,
                        rms_adjust_db: 2.0,
                        peak_headroom_db: -1.0,
                        philosophy: Philosophy::Enhance,
                        confidence: 0.0,
                        adjusted: false,
                    },
                },
                RecordingProfile {
                    recording_type: RecordingType::Bootleg,
                    centroid_hz: DimensionWindow::new(370.0, 570.0, 250.0, 1.0),
                    bass_mid_db: DimensionWindow::new(12.0, 17.0, 5.0, 1.2),
                    stereo_width: DimensionWindow::new(0.15, 0.25, 0.12, 0.8),
                    crest_db: DimensionWindow::new(4.5, 6.8, 3.0, 1.0),
                    base: AdaptiveParameters {
                        bass_db: -4.0,
                        mid_db: 2.0,
                        treble_db: 3.0,
                        spectral_strategy: SpectralStrategy::Brighten,
                        target_centroid_hz: 900.0,
                        stereo_strategy: StereoStrategy::Expand,
                        stereo_width_target: 0.35,
                        crest_target_min: 4.5,
                        crest_target_max: 6.8,
                        dr_expansion_db: 1.5,
                        rms_adjust_db: 3.0,
                        peak_headroom_db: -1.0,
                        philosophy: Philosophy::Correct,
                        confidence: 0.0,
                        adjusted: false,
                    },
                },
                RecordingProfile {
                    recording_type: RecordingType::Metal,
                    centroid_hz: DimensionWindow::new(1200.0, 1400.0, 500.0, 1.0),
                    bass_mid_db: DimensionWindow::new(8.0, 11.0, 4.0, 1.0),
                    stereo_width: DimensionWindow::new(0.35, 0.45, 0.15, 0.8),
                    crest_db: DimensionWindow::new(3.0, 4.5, 2.5, 1.2),
                    base: AdaptiveParameters {
                        bass_db: -2.0,
                        mid_db: -1.0,
                        treble_db: 1.5,
                        spectral_strategy: SpectralStrategy::Maintain,
                        target_centroid_hz: 1300.0,
                        stereo_strategy: StereoStrategy::Maintain,
                        stereo_width_target: 0.40,
                        crest_target_min: 3.0,
                        crest_target_max: 4.5,
                        dr_expansion_db: 1.0,
                        rms_adjust_db: 1.5,
                        peak_headroom_db: -0.8,
                        philosophy: Philosophy::Punch,
                        confidence: 0.0,
                        adjusted: false,
                    },
                },
                RecordingProfile {
                    recording_type: RecordingType::HdBrightTransparent,
                    centroid_hz: DimensionWindow::new(7500.0, 8000.0, 2000.0, 1.2),
                    bass_mid_db: DimensionWindow::new(-2.0, 3.0, 4.0, 1.0),
                    stereo_width: DimensionWindow::new(0.08, 0.16, 0.10, 0.8),
                    crest_db: DimensionWindow::new(10.0, 20.0, 5.0, 1.0),
                    base: AdaptiveParameters {
                        bass_db: 1.5,
                        mid_db: 0.0,
                        treble_db: -1.0,
                        spectral_strategy: SpectralStrategy::Darken,
                        target_centroid_hz: 5000.0,
                        stereo_strategy: StereoStrategy::Expand,
                        stereo_width_target: 0.25,
                        crest_target_min: 10.0,
                        crest_target_max: 20.0,
                        dr_expansion_db: 0.0,
                        rms_adjust_db: 1.0,
                        peak_headroom_db: -1.5,
                        philosophy: Philosophy::Enhance,
                        confidence: 0.0,
                        adjusted: false,
                    },
                },
            ],
        }
    }

    pub fn get(&self, recording_type: RecordingType) -> Option<&RecordingProfile> {
        self.profiles
            .iter()
            .find(|p| p.recording_type == recording_type)
    }

    /// A fingerprint sitting at the center of every window of `profile`,
    /// used by the regression gate.
    pub fn reference_fingerprint(profile: &RecordingProfile) -> Fingerprint {
        let mut values = [0.0f32; 25];
        // Plausible flat band split; the classifier only reads the four
        // scored dimensions plus what fine-tuning touches
        values[0] = 0.05;
        values[1] = 0.25;
        values[2] = 0.15;
        values[3] = 0.25;
        values[4] = 0.15;
        values[5] = 0.10;
        values[6] = 0.05;
        let mut fp = Fingerprint::from_array(values);
        fp.lufs = -14.0;
        fp.crest_db = profile.crest_db.center();
        fp.bass_mid_ratio_db = profile.bass_mid_db.center();
        fp.spectral_centroid_hz = profile.centroid_hz.center();
        fp.spectral_rolloff_hz = fp.spectral_centroid_hz * 2.5;
        fp.spectral_flatness = 0.3;
        fp.tempo_bpm = 120.0;
        fp.rhythm_stability = 0.6;
        fp.transient_density = 0.3;
        fp.silence_ratio = 0.02;
        fp.harmonic_ratio = 0.6;
        fp.pitch_stability = 0.6;
        fp.chroma_energy = 0.5;
        fp.dynamic_range_variation = 0.2;
        fp.loudness_variation = 0.2;
        fp.peak_consistency = 0.8;
        fp.stereo_width = profile.stereo_width.center();
        fp.phase_correlation = 1.0 - profile.stereo_width.center();
        fp
    }
}

/// Numeric deltas accepted by the profile update operation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProfileDeltas {
    #[serde(default)]
    pub bass_db: f32,
    #[serde(default)]
    pub mid_db: f32,
    #[serde(default)]
    pub treble_db: f32,
    #[serde(default)]
    pub rms_adjust_db: f32,
}

/// EQ offsets past this bound fail the regression gate.
pub const MAX_PROFILE_EQ_DB: f32 = 8.0;

/// Shared, atomically-replaceable profile state.
pub struct ProfileService {
    path: Option<PathBuf>,
    inner: RwLock<Arc<ProfileSet>>,
}

impl ProfileService {
    /// Load overrides from `path` when present, else defaults.
    pub fn load(path: Option<PathBuf>) -> Self {
        let set = match &path {
            Some(p) if p.exists() => match std::fs::read_to_string(p)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
            {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "unreadable profile document, using defaults");
                    ProfileSet::defaults()
                }
            },
            _ => ProfileSet::defaults(),
        };
        Self {
            path,
            inner: RwLock::new(Arc::new(set)),
        }
    }

    pub fn current(&self) -> Arc<ProfileSet> {
        self.inner.read().clone()
    }

    /// Apply named deltas to one profile, run the regression gate, and
    /// commit a new document version only on pass. The on-disk write is a
    /// temp-file rename, so a crash can never leave a half-written file.
    pub fn update(
        &self,
        profile_name: &str,
        deltas: ProfileDeltas,
    ) -> Result<u32, EngineError> {
        let current = self.current();
        let mut updated = (*current).clone();

        let profile = updated
            .profiles
            .iter_mut()
            .find(|p| p.recording_type.as_str() == profile_name)
            .ok_or_else(|| EngineError::Protocol(format!("unknown profile: {profile_name}")))?;

        profile.base.bass_db += deltas.bass_db;
        profile.base.mid_db += deltas.mid_db;
        profile.base.treble_db += deltas.treble_db;
        profile.base.rms_adjust_db += deltas.rms_adjust_db;
        updated.version = current.version + 1;

        regression_gate(&updated)?;

        if let Some(path) = &self.path {
            let raw = serde_json::to_string_pretty(&updated)
                .map_err(|e| EngineError::Config(format!("serialize profiles: {e}")))?;
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, raw).map_err(crate::error::StoreError::Io)?;
            std::fs::rename(&tmp, path).map_err(crate::error::StoreError::Io)?;
        }

        let version = updated.version;
        *self.inner.write() = Arc::new(updated);
        tracing::info!(profile = profile_name, version, "profile document updated");
        Ok(version)
    }
}

/// The regression gate: every profile must still classify its own
/// reference fingerprint as itself, and no derived EQ offset may leave the
/// safe range.
pub fn regression_gate(set: &ProfileSet) -> Result<(), EngineError> {
    for profile in &set.profiles {
        let fp = ProfileSet::reference_fingerprint(profile);
        let result = crate::classifier::classify(&fp, set);
        if result.recording_type != profile.recording_type {
            return Err(EngineError::Config(format!(
                "regression: {} reference now classifies as {}",
                profile.recording_type.as_str(),
                result.recording_type.as_str()
            )));
        }
        for (name, gain) in [
            ("bass", result.params.bass_db),
            ("mid", result.params.mid_db),
            ("treble", result.params.treble_db),
        ] {
            if gain.abs() > MAX_PROFILE_EQ_DB {
                return Err(EngineError::Config(format!(
                    "regression: {} {name} offset {gain:.1} dB exceeds ±{MAX_PROFILE_EQ_DB} dB",
                    profile.recording_type.as_str()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_score_inside_is_one() {
        let w = DimensionWindow::new(10.0, 20.0, 5.0, 1.0);
        assert_eq!(w.score(10.0), 1.0);
        assert_eq!(w.score(15.0), 1.0);
        assert_eq!(w.score(20.0), 1.0);
    }

    #[test]
    fn test_window_score_decays_outside() {
        let w = DimensionWindow::new(10.0, 20.0, 5.0, 1.0);
        let near = w.score(22.0);
        let far = w.score(35.0);
        assert!(near < 1.0 && near > far);
        assert!(far < 0.01);
    }

    #[test]
    fn test_defaults_cover_all_types() {
        let set = ProfileSet::defaults();
        for t in [
            RecordingType::Studio,
            RecordingType::Bootleg,
            RecordingType::Metal,
            RecordingType::HdBrightTransparent,
        ] {
            assert!(set.get(t).is_some(), "missing profile {t:?}");
        }
    }

    #[test]
    fn test_defaults_pass_regression_gate() {
        regression_gate(&ProfileSet::defaults()).unwrap();
    }

    #[test]
    fn test_update_unknown_profile_fails() {
        let service = ProfileService::load(None);
        let err = service.update("unknown", ProfileDeltas::default()).unwrap_err();
        assert_eq!(err.kind(), "protocol_error");
        assert_eq!(service.current().version, 1);
    }

    #[test]
    fn test_update_excessive_delta_rejected() {
        let service = ProfileService::load(None);
        let err = service
            .update(
                "studio",
                ProfileDeltas {
                    bass_db: 10.0,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "config_error");
        // State unchanged
        assert_eq!(service.current().version, 1);
        assert_eq!(
            service
                .current()
                .get(RecordingType::Studio)
                .unwrap()
                .base
                .bass_db,
            1.0
        );
    }

    #[test]
    fn test_update_small_delta_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let service = ProfileService::load(Some(path.clone()));

        let version = service
            .update(
                "studio",
                ProfileDeltas {
                    treble_db: 0.5,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(version, 2);
        assert!(path.exists());

        // Reloading picks up the committed document
        let reloaded = ProfileService::load(Some(path));
        assert_eq!(reloaded.current().version, 2);
        assert_eq!(
            reloaded
                .current()
                .get(RecordingType::Studio)
                .unwrap()
                .base
                .treble_db,
            1.5
        );
    }
}
