/// Attack/release envelope follower
///
/// Exponential one-pole smoother with separate rise and fall time constants.
/// The compressor, expander, and limiter all hang their gain smoothing off
/// this type, which is why its state must survive across chunk boundaries
/// within a session.

/// Smooths a level signal with independent attack/release coefficients.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: u32, attack_ms: f32, release_ms: f32) -> Self {
        Self {
            attack_coeff: coefficient(attack_ms, sample_rate),
            release_coeff: coefficient(release_ms, sample_rate),
            envelope: 0.0,
        }
    }

    /// Follower pre-charged to `value` instead of zero. Used where a zero
    /// start would cause an audible gain dip (limiter gain smoothing).
    pub fn with_initial(sample_rate: u32, attack_ms: f32, release_ms: f32, value: f32) -> Self {
        let mut f = Self::new(sample_rate, attack_ms, release_ms);
        f.envelope = value;
        f
    }

    /// Advance by one sample of input level and return the smoothed value.
    #[inline]
    pub fn process(&mut self, level: f32) -> f32 {
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = level + (self.envelope - level) * coeff;
        self.envelope
    }

    pub fn value(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    pub fn reset_to(&mut self, value: f32) {
        self.envelope = value;
    }
}

/// exp(-1 / (ms * sr / 1000)): the one-pole coefficient reaching ~63% of a
/// step in `time_ms`.
fn coefficient(time_ms: f32, sample_rate: u32) -> f32 {
    let time_samples = (time_ms * 0.001 * sample_rate as f32).max(1.0);
    (-1.0 / time_samples).exp()
}
