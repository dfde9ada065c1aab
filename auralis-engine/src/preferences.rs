/// Personal preferences layer
///
/// Per-recording-type offsets the listener has accumulated, applied on top
/// of the classifier's parameters, plus an append-only feedback log that
/// offline analysis mines later. Nothing here feeds back into the runtime
/// classifier; preference changes only land through `update`, which runs
/// the same regression gate as profile updates and commits atomically.

use crate::classifier;
use crate::error::EngineError;
use crate::models::{AdaptiveParameters, RecordingType};
use crate::profiles::{ProfileSet, MAX_PROFILE_EQ_DB};
use crate::tracks::TrackId;
use auralis_dsp::Fingerprint;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceOffsets {
    #[serde(default)]
    pub bass_db_delta: f32,
    #[serde(default)]
    pub mid_db_delta: f32,
    #[serde(default)]
    pub treble_db_delta: f32,
    #[serde(default)]
    pub stereo_delta: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalPreferences {
    pub version: u32,
    #[serde(default)]
    pub offsets: HashMap<RecordingType, PreferenceOffsets>,
}

impl Default for PersonalPreferences {
    fn default() -> Self {
        // A gentle warmth bump for tracks we know nothing about
        let mut offsets = HashMap::new();
        offsets.insert(
            RecordingType::Unknown,
            PreferenceOffsets {
                bass_db_delta: 0.3,
                ..Default::default()
            },
        );
        Self {
            version: 1,
            offsets,
        }
    }
}

impl PersonalPreferences {
    /// Fold the offsets for `detected` into `params`. Idempotent: the
    /// `adjusted` marker makes a second application a no-op.
    pub fn apply(&self, params: &mut AdaptiveParameters, detected: RecordingType) {
        if params.adjusted {
            return;
        }
        if let Some(offsets) = self.offsets.get(&detected) {
            params.bass_db += offsets.bass_db_delta;
            params.mid_db += offsets.mid_db_delta;
            params.treble_db += offsets.treble_db_delta;
            params.stereo_width_target =
                (params.stereo_width_target + offsets.stereo_delta).clamp(0.0, 1.0);
        }
        params.adjusted = true;
    }
}

/// One line of the feedback log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub track_id: TrackId,
    pub detected_type: RecordingType,
    pub confidence: f32,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub parameters: AdaptiveParameters,
    pub timestamp: DateTime<Utc>,
}

pub struct PreferencesService {
    prefs_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    inner: RwLock<Arc<PersonalPreferences>>,
}

impl PreferencesService {
    pub fn load(prefs_path: Option<PathBuf>, log_path: Option<PathBuf>) -> Self {
        let prefs = match &prefs_path {
            Some(p) if p.exists() => match std::fs::read_to_string(p)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
            {
                Ok(prefs) => prefs,
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "unreadable preferences, using defaults");
                    PersonalPreferences::default()
                }
            },
            _ => PersonalPreferences::default(),
        };
        Self {
            prefs_path,
            log_path,
            inner: RwLock::new(Arc::new(prefs)),
        }
    }

    pub fn in_memory() -> Self {
        Self::load(None, None)
    }

    pub fn current(&self) -> Arc<PersonalPreferences> {
        self.inner.read().clone()
    }

    pub fn apply(&self, params: &mut AdaptiveParameters, detected: RecordingType) {
        self.current().apply(params, detected);
    }

    /// Replace the preference document. The candidate must keep every
    /// profile's reference material classifying correctly with its offsets
    /// applied and every resulting EQ offset in range; only then is the new
    /// version written (temp file + rename) and swapped in.
    pub fn update(
        &self,
        mut candidate: PersonalPreferences,
        profiles: &ProfileSet,
    ) -> Result<u32, EngineError> {
        regression_gate(&candidate, profiles)?;

        candidate.version = self.current().version + 1;
        if let Some(path) = &self.prefs_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(crate::error::StoreError::Io)?;
            }
            let raw = serde_json::to_string_pretty(&candidate)
                .map_err(|e| EngineError::Config(format!("serialize preferences: {e}")))?;
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, raw).map_err(crate::error::StoreError::Io)?;
            std::fs::rename(&tmp, path).map_err(crate::error::StoreError::Io)?;
        }

        let version = candidate.version;
        *self.inner.write() = Arc::new(candidate);
        tracing::info!(version, "preferences updated");
        Ok(version)
    }

    /// Append one rating to the feedback log. Appends are a single write
    /// of one line, so records never interleave.
    pub fn record_feedback(&self, record: &FeedbackRecord) -> Result<(), EngineError> {
        let Some(path) = &self.log_path else {
            tracing::debug!("no feedback log configured, dropping record");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(crate::error::StoreError::Io)?;
        }

        let mut line = serde_json::to_string(record)
            .map_err(|e| EngineError::Config(format!("serialize feedback: {e}")))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(crate::error::StoreError::Io)?;
        file.write_all(line.as_bytes())
            .map_err(crate::error::StoreError::Io)?;
        Ok(())
    }
}

/// Offsets must neither flip any reference classification nor push EQ
/// outside the safe range.
fn regression_gate(
    prefs: &PersonalPreferences,
    profiles: &ProfileSet,
) -> Result<(), EngineError> {
    for (recording_type, offsets) in &prefs.offsets {
        for (name, delta) in [
            ("bass", offsets.bass_db_delta),
            ("mid", offsets.mid_db_delta),
            ("treble", offsets.treble_db_delta),
        ] {
            if delta.abs() > MAX_PROFILE_EQ_DB {
                return Err(EngineError::Config(format!(
                    "regression: {} {name} delta {delta:.1} dB exceeds ±{MAX_PROFILE_EQ_DB} dB",
                    recording_type.as_str()
                )));
            }
        }
    }

    for profile in &profiles.profiles {
        let fp = ProfileSet::reference_fingerprint(profile);
        let mut result = classifier::classify(&fp, profiles);
        prefs.apply(&mut result.params, result.recording_type);
        if result.recording_type != profile.recording_type {
            return Err(EngineError::Config(format!(
                "regression: {} reference no longer classifies as itself",
                profile.recording_type.as_str()
            )));
        }
        for (name, gain) in [
            ("bass", result.params.bass_db),
            ("mid", result.params.mid_db),
            ("treble", result.params.treble_db),
        ] {
            if gain.abs() > MAX_PROFILE_EQ_DB {
                return Err(EngineError::Config(format!(
                    "regression: {} {name} lands at {gain:.1} dB with offsets applied",
                    profile.recording_type.as_str()
                )));
            }
        }
    }
    Ok(())
}
