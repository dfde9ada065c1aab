/// The adaptive mastering chain
///
/// Stage order under the full chain: EQ, compressor, transient recovery,
/// soft clip, stereo width, loudness gain, limiter. The limiter runs
/// physically last so the output ceiling survives every upstream gain. The
/// restraint policy prunes the chain per chunk: loud-and-dynamic material
/// bypasses everything (bit-exact pass-through), loud-and-crushed material
/// gets only upward expansion plus the limiter.
///
/// Adaptive parameters are blended against the baseline with
/// `min(confidence, 0.7) * intensity`, so low-certainty classifications
/// lean on the baseline curve and user preset instead.
///
/// All stage state lives here and persists across chunks; `reset` is
/// called on seek.

use crate::error::DspError;
use crate::models::{
    AdaptiveParameters, DynamicsDecision, Philosophy, Preset, QuickAnalysis, SpectralStrategy,
    StereoStrategy,
};
use auralis_dsp::{
    soft_clip, AdaptiveEq, Compressor, CompressorConfig, Limiter, StereoBuffer, StereoWidthStage,
    TransientExpander,
};
use auralis_dsp::limiter::LimiterConfig;

/// Classifier certainty never drives more than this share of the blend.
pub const CONFIDENCE_CAP: f32 = 0.7;

/// Baseline EQ curve always present under the full chain (bass, mid,
/// treble dB): a gentle smile that the adaptive offsets build on.
const BASELINE_EQ_DB: (f32, f32, f32) = (0.5, 0.0, 0.5);

/// Everything the session can change mid-stream, read at chunk boundaries.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub params: AdaptiveParameters,
    pub preset: Preset,
    pub intensity: f32,
}

impl SessionParams {
    pub fn new(params: AdaptiveParameters, preset: Preset, intensity: f32) -> Self {
        Self {
            params,
            preset,
            intensity: intensity.clamp(0.0, 1.0),
        }
    }

    /// How much of the adaptive parameter set reaches the audio.
    pub fn blend(&self) -> f32 {
        self.params.confidence.min(CONFIDENCE_CAP) * self.intensity * self.preset.blend_scale()
    }
}

pub struct MasteringPipeline {
    sample_rate: u32,
    session_ceiling_db: f32,
    eq: AdaptiveEq,
    compressor: Compressor,
    expander: TransientExpander,
    width: StereoWidthStage,
    limiter: Limiter,
}

impl MasteringPipeline {
    pub fn new(sample_rate: u32, session_ceiling_db: f32) -> Self {
        Self {
            sample_rate,
            session_ceiling_db,
            eq: AdaptiveEq::new(sample_rate),
            compressor: Compressor::new(CompressorConfig {
                sample_rate,
                ..Default::default()
            }),
            expander: TransientExpander::new(sample_rate),
            width: StereoWidthStage::new(sample_rate),
            limiter: Limiter::new(LimiterConfig {
                sample_rate,
                ceiling_db: session_ceiling_db,
                ..Default::default()
            }),
        }
    }

    pub fn process(
        &mut self,
        buf: &mut StereoBuffer,
        session: &SessionParams,
        decision: &DynamicsDecision,
        quick: &QuickAnalysis,
    ) -> Result<(), DspError> {
        match decision {
            DynamicsDecision::DynamicLoud => {
                // Restraint in its purest form
                return Ok(());
            }
            DynamicsDecision::CompressedLoud { expansion_factor } => {
                self.expander.process(
                    &mut buf.left,
                    &mut buf.right,
                    *expansion_factor,
                    crate::policy::EXPANSION_MAKEUP_DB,
                );
                self.run_limiter(buf, &session.params);
            }
            DynamicsDecision::QuietModerate => {
                self.run_full_chain(buf, session, quick);
            }
        }

        if buf
            .left
            .iter()
            .chain(buf.right.iter())
            .any(|s| !s.is_finite())
        {
            return Err(DspError { stage: "pipeline" });
        }
        Ok(())
    }

    fn run_full_chain(
        &mut self,
        buf: &mut StereoBuffer,
        session: &SessionParams,
        quick: &QuickAnalysis,
    ) {
        let params = &session.params;
        let blend = session.blend();

        // EQ: baseline + blended adaptive offsets + full preset tilt +
        // spectral-strategy nudge against the measured chunk centroid
        let (tilt_bass, tilt_mid, tilt_treble) = session.preset.eq_tilt();
        let mut treble_nudge = 0.0;
        match params.spectral_strategy {
            SpectralStrategy::Brighten if quick.centroid_hz < params.target_centroid_hz => {
                treble_nudge = 1.5 * blend;
            }
            SpectralStrategy::Darken if quick.centroid_hz > params.target_centroid_hz => {
                treble_nudge = -1.5 * blend;
            }
            _ => {}
        }
        self.eq.set_gains(
            BASELINE_EQ_DB.0 + params.bass_db * blend + tilt_bass,
            BASELINE_EQ_DB.1 + params.mid_db * blend + tilt_mid,
            BASELINE_EQ_DB.2 + params.treble_db * blend + tilt_treble + treble_nudge,
        );
        self.eq.process(&mut buf.left, &mut buf.right);

        // Compression scaled by philosophy, eased when the chunk is
        // already near the crest target
        let (threshold_db, mut ratio, attack_ms, release_ms) = match params.philosophy {
            Philosophy::Correct => (-20.0, 4.0, 10.0, 150.0),
            Philosophy::Punch => (-18.0, 3.0, 20.0, 120.0),
            Philosophy::Enhance => (-16.0, 2.0, 15.0, 150.0),
            Philosophy::Neutral => (-16.0, 1.8, 15.0, 150.0),
        };
        if quick.crest_db < params.crest_target_min {
            ratio = 1.0 + (ratio - 1.0) * 0.6;
        } else if quick.crest_db > params.crest_target_max {
            ratio *= 1.2;
        }
        self.compressor.set_config(CompressorConfig {
            sample_rate: self.sample_rate,
            threshold_db,
            ratio,
            knee_db: 6.0,
            attack_ms,
            release_ms,
            makeup_gain_db: 0.0,
        });
        self.compressor.process(&mut buf.left, &mut buf.right);

        // Transient recovery after compression, when the profile asks
        if params.dr_expansion_db > 0.0 {
            let factor = (params.dr_expansion_db / 10.0).min(0.3) * blend;
            self.expander.process(&mut buf.left, &mut buf.right, factor, 0.0);
        }

        // Density push for the aggressive philosophies
        let drive = match params.philosophy {
            Philosophy::Correct => 0.4 * blend,
            Philosophy::Punch => 0.25 * blend,
            _ => 0.0,
        };
        soft_clip(&mut buf.left, &mut buf.right, drive);

        // Stereo width toward the profile target
        let side_gain = match params.stereo_strategy {
            StereoStrategy::Maintain => 1.0,
            StereoStrategy::Expand => 1.0 + 0.8 * blend * params.stereo_width_target,
            StereoStrategy::Narrow => 1.0 - 0.8 * blend * (1.0 - params.stereo_width_target),
        };
        self.width.process(&mut buf.left, &mut buf.right, side_gain);

        // Loudness normalization: a static gain toward the profile's RMS
        // target. Intensity-scaled but not confidence-scaled - this is a
        // level decision, not a tonal one.
        let norm_db =
            params.rms_adjust_db.clamp(-6.0, 6.0) * session.intensity * session.preset.blend_scale();
        if norm_db.abs() > 0.01 {
            let gain = 10.0f32.powf(norm_db / 20.0);
            for s in buf.left.iter_mut().chain(buf.right.iter_mut()) {
                *s *= gain;
            }
        }

        self.run_limiter(buf, params);
    }

    fn run_limiter(&mut self, buf: &mut StereoBuffer, params: &AdaptiveParameters) {
        let ceiling = params.peak_headroom_db.min(self.session_ceiling_db);
        self.limiter.set_ceiling_db(ceiling);
        self.limiter.process(&mut buf.left, &mut buf.right);
    }

    /// Drop all filter memory; the next chunk starts from silence-primed
    /// state. Called on seek and after a DSP invariant trip.
    pub fn reset(&mut self) {
        self.eq.reset();
        self.compressor.reset();
        self.expander.reset();
        self.width.reset();
        self.limiter.reset();
    }
}
