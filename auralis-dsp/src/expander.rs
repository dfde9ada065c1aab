/// Upward transient expander
///
/// The restoration stage for crushed masters: instead of compressing
/// further, it re-inflates transient contrast. Two envelope followers track
/// the program - a fast one that jumps on hits and a slow one that rides
/// the average - and the per-sample gain is their ratio raised to the
/// expansion factor. Averages pass at unity; moments where the fast
/// envelope exceeds the slow one get lifted, restoring the peaks the
/// original limiter shaved off.

use crate::envelope::EnvelopeFollower;

#[derive(Debug, Clone)]
pub struct TransientExpander {
    fast: EnvelopeFollower,
    slow: EnvelopeFollower,
}

const FAST_ATTACK_MS: f32 = 0.5;
const FAST_RELEASE_MS: f32 = 40.0;
const SLOW_ATTACK_MS: f32 = 25.0;
const SLOW_RELEASE_MS: f32 = 250.0;

/// Per-sample gain bounds; keeps pathological material from pumping.
const MIN_GAIN: f32 = 0.25;
const MAX_GAIN: f32 = 4.0;

impl TransientExpander {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            fast: EnvelopeFollower::new(sample_rate, FAST_ATTACK_MS, FAST_RELEASE_MS),
            slow: EnvelopeFollower::new(sample_rate, SLOW_ATTACK_MS, SLOW_RELEASE_MS),
        }
    }

    /// Expand with the given factor (0 = transparent, 0.5 = strong) and a
    /// makeup gain in dB applied on top.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], factor: f32, makeup_db: f32) {
        let factor = factor.max(0.0);
        let makeup = 10.0f32.powf(makeup_db / 20.0);

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let level = l.abs().max(r.abs());
            let fast = self.fast.process(level);
            let slow = self.slow.process(level).max(1e-6);

            let gain = if factor > 0.0 {
                (fast / slow).powf(factor).clamp(MIN_GAIN, MAX_GAIN)
            } else {
                1.0
            };
            *l *= gain * makeup;
            *r *= gain * makeup;
        }
    }

    pub fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Steady bed with a short burst in the middle.
    fn bed_with_burst() -> Vec<f32> {
        let mut out: Vec<f32> = (0..44100)
            .map(|i| 0.3 * (i as f32 * 0.08).sin())
            .collect();
        for i in 22050..22491 {
            out[i] *= 2.5; // 10 ms burst
        }
        out
    }

    fn crest_db(s: &[f32]) -> f32 {
        let peak = s.iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        let rms = (s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32).sqrt();
        20.0 * (peak / rms).log10()
    }

    #[test]
    fn test_zero_factor_is_unity() {
        let src = bed_with_burst();
        let mut l = src.clone();
        let mut r = src.clone();
        let mut exp = TransientExpander::new(44100);
        exp.process(&mut l, &mut r, 0.0, 0.0);
        for (a, b) in l.iter().zip(src.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_expansion_increases_crest() {
        let src = bed_with_burst();
        let before = crest_db(&src);

        let mut l = src.clone();
        let mut r = src.clone();
        let mut exp = TransientExpander::new(44100);
        exp.process(&mut l, &mut r, 0.45, 0.0);
        let after = crest_db(&l);

        assert!(after > before + 0.5, "crest {before} -> {after}");
    }

    #[test]
    fn test_makeup_gain_applied() {
        let src = vec![0.2f32; 44100];
        let mut l = src.clone();
        let mut r = src.clone();
        let mut exp = TransientExpander::new(44100);
        exp.process(&mut l, &mut r, 0.0, -0.5);
        let expected = 0.2 * 10.0f32.powf(-0.5 / 20.0);
        assert!((l[44099] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_gain_bounded() {
        // Impulse into silence: fast/slow ratio is extreme, gain must clamp
        let mut l = vec![0.0f32; 1000];
        l[500] = 1.0;
        let mut r = l.clone();
        let mut exp = TransientExpander::new(44100);
        exp.process(&mut l, &mut r, 0.5, 0.0);
        assert!(l.iter().all(|s| s.abs() <= MAX_GAIN));
    }
}
