/// Adaptive three-band EQ
///
/// Low shelf at 120 Hz, mid peaking at 1 kHz, high shelf at 7.5 kHz. Gains
/// are swapped at chunk boundaries without resetting filter state, so the
/// shelves keep ringing continuously across a parameter change.

use crate::biquad::{BiquadCoeffs, StereoBiquad};

const LOW_SHELF_HZ: f64 = 120.0;
const MID_PEAK_HZ: f64 = 1000.0;
const HIGH_SHELF_HZ: f64 = 7500.0;
const MID_Q: f64 = 0.8;
const SHELF_Q: f64 = 0.707;

/// Gains are clamped to this range before filter design.
pub const MAX_GAIN_DB: f32 = 12.0;

#[derive(Debug, Clone)]
pub struct AdaptiveEq {
    sample_rate: u32,
    low: StereoBiquad,
    mid: StereoBiquad,
    high: StereoBiquad,
    gains: (f32, f32, f32),
}

impl AdaptiveEq {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            low: StereoBiquad::new(BiquadCoeffs::identity()),
            mid: StereoBiquad::new(BiquadCoeffs::identity()),
            high: StereoBiquad::new(BiquadCoeffs::identity()),
            gains: (0.0, 0.0, 0.0),
        }
    }

    /// Retarget the band gains. Coefficients are only redesigned when a
    /// gain actually moved; state is preserved either way.
    pub fn set_gains(&mut self, bass_db: f32, mid_db: f32, treble_db: f32) {
        let bass_db = bass_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        let mid_db = mid_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        let treble_db = treble_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);

        let sr = self.sample_rate as f64;
        if (bass_db - self.gains.0).abs() > 1e-3 {
            self.low
                .set_coeffs(BiquadCoeffs::low_shelf(sr, LOW_SHELF_HZ, SHELF_Q, bass_db as f64));
        }
        if (mid_db - self.gains.1).abs() > 1e-3 {
            self.mid
                .set_coeffs(BiquadCoeffs::peaking(sr, MID_PEAK_HZ, MID_Q, mid_db as f64));
        }
        if (treble_db - self.gains.2).abs() > 1e-3 {
            self.high.set_coeffs(BiquadCoeffs::high_shelf(
                sr,
                HIGH_SHELF_HZ,
                SHELF_Q,
                treble_db as f64,
            ));
        }
        self.gains = (bass_db, mid_db, treble_db);
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.low.process(left, right);
        self.mid.process(left, right);
        self.high.process(left, right);
    }

    pub fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }

    pub fn is_poisoned(&self) -> bool {
        self.low.is_poisoned() || self.mid.is_poisoned() || self.high.is_poisoned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.2 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_flat_eq_is_transparent() {
        let mut eq = AdaptiveEq::new(44100);
        eq.set_gains(0.0, 0.0, 0.0);
        let src = tone(1000.0, 44100, 8192);
        let mut l = src.clone();
        let mut r = src.clone();
        eq.process(&mut l, &mut r);
        assert!((rms(&l[4096..]) - rms(&src[4096..])).abs() < 0.01);
    }

    #[test]
    fn test_bass_boost_boosts_bass_only() {
        let mut eq = AdaptiveEq::new(44100);
        eq.set_gains(6.0, 0.0, 0.0);

        let bass = tone(60.0, 44100, 16384);
        let mut bl = bass.clone();
        let mut br = bass.clone();
        eq.process(&mut bl, &mut br);
        let bass_gain = 20.0 * (rms(&bl[8192..]) / rms(&bass[8192..])).log10();
        assert!((bass_gain - 6.0).abs() < 1.0, "bass gain {bass_gain}");

        eq.reset();
        let mids = tone(1000.0, 44100, 16384);
        let mut ml = mids.clone();
        let mut mr = mids.clone();
        eq.process(&mut ml, &mut mr);
        let mid_gain = 20.0 * (rms(&ml[8192..]) / rms(&mids[8192..])).log10();
        assert!(mid_gain.abs() < 1.0, "mid gain {mid_gain}");
    }

    #[test]
    fn test_treble_cut() {
        let mut eq = AdaptiveEq::new(44100);
        eq.set_gains(0.0, 0.0, -6.0);
        let treble = tone(12000.0, 44100, 16384);
        let mut tl = treble.clone();
        let mut tr = treble.clone();
        eq.process(&mut tl, &mut tr);
        let gain = 20.0 * (rms(&tl[8192..]) / rms(&treble[8192..])).log10();
        assert!((gain + 6.0).abs() < 1.5, "treble gain {gain}");
    }

    #[test]
    fn test_gain_clamped() {
        let mut eq = AdaptiveEq::new(44100);
        eq.set_gains(40.0, -40.0, 0.0);
        assert_eq!(eq.gains.0, MAX_GAIN_DB);
        assert_eq!(eq.gains.1, -MAX_GAIN_DB);
    }
}
