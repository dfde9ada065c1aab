/// Soft-knee downward compressor
///
/// Per-sample detection on the louder of the two channels, one shared gain
/// applied to both so the stereo image never tilts. Gain reduction is
/// computed in dB through a quadratic soft knee, then smoothed by an
/// attack/release follower. Envelope and gain state persist across chunks.

use crate::envelope::EnvelopeFollower;

#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub sample_rate: u32,
    pub threshold_db: f32,
    pub ratio: f32,
    pub knee_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_gain_db: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            threshold_db: -18.0,
            ratio: 3.0,
            knee_db: 6.0,
            attack_ms: 15.0,
            release_ms: 120.0,
            makeup_gain_db: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compressor {
    config: CompressorConfig,
    level_follower: EnvelopeFollower,
    gain_follower: EnvelopeFollower,
    last_reduction_db: f32,
}

impl Compressor {
    pub fn new(config: CompressorConfig) -> Self {
        // Fast level detection; the musical time constants live on the
        // gain smoother.
        let level_follower = EnvelopeFollower::new(config.sample_rate, 0.5, 30.0);
        let gain_follower = EnvelopeFollower::new(
            config.sample_rate,
            config.attack_ms,
            config.release_ms,
        );
        Self {
            config,
            level_follower,
            gain_follower,
            last_reduction_db: 0.0,
        }
    }

    pub fn set_config(&mut self, config: CompressorConfig) {
        if (config.attack_ms - self.config.attack_ms).abs() > 1e-3
            || (config.release_ms - self.config.release_ms).abs() > 1e-3
            || config.sample_rate != self.config.sample_rate
        {
            self.gain_follower = EnvelopeFollower::new(
                config.sample_rate,
                config.attack_ms,
                config.release_ms,
            );
        }
        self.config = config;
    }

    /// Gain reduction in dB (<= 0) for an input level in dB.
    fn reduction_db(&self, level_db: f32) -> f32 {
        let t = self.config.threshold_db;
        let r = self.config.ratio.max(1.0);
        let k = self.config.knee_db.max(0.0);

        if level_db <= t - k / 2.0 {
            0.0
        } else if level_db >= t + k / 2.0 {
            -(level_db - t) * (1.0 - 1.0 / r)
        } else {
            // Quadratic knee interpolation
            let x = level_db - t + k / 2.0;
            -(1.0 - 1.0 / r) * x * x / (2.0 * k)
        }
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let makeup = db_to_linear(self.config.makeup_gain_db);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let level = self.level_follower.process(l.abs().max(r.abs()));
            let level_db = 20.0 * level.max(1e-10).log10();
            let target = self.reduction_db(level_db);
            let smoothed = self.gain_follower.process(-target); // follower tracks positive
            self.last_reduction_db = -smoothed;
            let gain = db_to_linear(-smoothed) * makeup;
            *l *= gain;
            *r *= gain;
        }
    }

    /// Most recent gain reduction in dB (<= 0).
    pub fn gain_reduction_db(&self) -> f32 {
        self.last_reduction_db
    }

    pub fn reset(&mut self) {
        self.level_follower.reset();
        self.gain_follower.reset();
        self.last_reduction_db = 0.0;
    }
}

/// Symmetric tanh waveshaper. `drive` 0 is transparent; useful range is
/// roughly 0..1 where 1 pushes ~3 dB of extra density into the signal.
pub fn soft_clip(left: &mut [f32], right: &mut [f32], drive: f32) {
    if drive <= 0.0 {
        return;
    }
    let k = 1.0 + drive * 2.0;
    let norm = 1.0 / (k.tanh()).max(1e-6);
    for s in left.iter_mut().chain(right.iter_mut()) {
        *s = (*s * k).tanh() * norm;
    }
}

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}
