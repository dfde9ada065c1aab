/// Lookahead brick-wall limiter
///
/// The last stage in the chain and the only one allowed to touch the
/// ceiling. A sliding-window maximum over the lookahead horizon computes
/// the gain that will be needed by the time each delayed sample leaves the
/// buffer: attack is therefore instantaneous relative to the audio, release
/// is exponential. An inter-sample estimate (linear midpoint) nudges the
/// detected peak up so oversampled DACs stay under the ceiling too.
///
/// The delay line persists across chunks within a session; reset on seek.

use crate::envelope::EnvelopeFollower;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub sample_rate: u32,
    pub ceiling_db: f32,
    pub release_ms: f32,
    pub lookahead_ms: f32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            ceiling_db: -1.0,
            release_ms: 60.0,
            lookahead_ms: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Limiter {
    config: LimiterConfig,
    ceiling: f32,
    lookahead_samples: usize,
    // Delayed samples per channel
    delay_l: VecDeque<f32>,
    delay_r: VecDeque<f32>,
    // Monotonically decreasing window maximum of |input|
    window_max: VecDeque<(u64, f32)>,
    sample_clock: u64,
    gain_smoother: EnvelopeFollower,
    last_reduction_db: f32,
}

impl Limiter {
    pub fn new(config: LimiterConfig) -> Self {
        let lookahead_samples =
            ((config.lookahead_ms * config.sample_rate as f32 / 1000.0) as usize).max(1);
        // Attack near-instant; release from config. Pre-charged to unity
        // so the first samples of a session aren't dipped.
        let gain_smoother = EnvelopeFollower::with_initial(
            config.sample_rate,
            config.release_ms, // rising gain = release
            0.05,              // falling gain = attack
            1.0,
        );
        Self {
            ceiling: db_to_linear(config.ceiling_db),
            lookahead_samples,
            delay_l: VecDeque::with_capacity(lookahead_samples + 1),
            delay_r: VecDeque::with_capacity(lookahead_samples + 1),
            window_max: VecDeque::new(),
            sample_clock: 0,
            gain_smoother,
            config,
            last_reduction_db: 0.0,
        }
    }

    pub fn set_ceiling_db(&mut self, ceiling_db: f32) {
        self.config.ceiling_db = ceiling_db;
        self.ceiling = db_to_linear(ceiling_db);
    }

    /// Peak estimate including a linear inter-sample midpoint.
    #[inline]
    fn detect_peak(&self, l: f32, r: f32, prev_l: f32, prev_r: f32) -> f32 {
        let sample_peak = l.abs().max(r.abs());
        let isp = ((l + prev_l) * 0.5).abs().max(((r + prev_r) * 0.5).abs());
        sample_peak.max(isp)
    }

    /// Process in place. Output lags input by the lookahead; the delay line
    /// is primed with silence so lengths stay equal.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let mut prev_l = *self.delay_l.back().unwrap_or(&0.0);
        let mut prev_r = *self.delay_r.back().unwrap_or(&0.0);

        for i in 0..left.len() {
            let (in_l, in_r) = (left[i], right[i]);
            let peak = self.detect_peak(in_l, in_r, prev_l, prev_r);
            prev_l = in_l;
            prev_r = in_r;

            // Maintain the sliding maximum over the lookahead window
            self.sample_clock += 1;
            while let Some(&(_, back)) = self.window_max.back() {
                if back <= peak {
                    self.window_max.pop_back();
                } else {
                    break;
                }
            }
            self.window_max.push_back((self.sample_clock, peak));
            let horizon = self.sample_clock.saturating_sub(self.lookahead_samples as u64);
            while let Some(&(stamp, _)) = self.window_max.front() {
                if stamp <= horizon {
                    self.window_max.pop_front();
                } else {
                    break;
                }
            }

            let window_peak = self.window_max.front().map(|&(_, p)| p).unwrap_or(0.0);
            let required = if window_peak > self.ceiling {
                self.ceiling / window_peak
            } else {
                1.0
            };

            // Smoother: instant drop (attack), exponential rise (release).
            // Clamp below `required` so the ceiling always wins.
            let gain = self.gain_smoother.process(required).min(required);
            self.last_reduction_db = 20.0 * gain.max(1e-10).log10();

            self.delay_l.push_back(in_l);
            self.delay_r.push_back(in_r);
            let (out_l, out_r) = if self.delay_l.len() > self.lookahead_samples {
                (
                    self.delay_l.pop_front().unwrap_or(0.0),
                    self.delay_r.pop_front().unwrap_or(0.0),
                )
            } else {
                (0.0, 0.0)
            };
            left[i] = out_l * gain;
            right[i] = out_r * gain;
        }
    }

    /// Most recent gain reduction in dB (<= 0).
    pub fn gain_reduction_db(&self) -> f32 {
        self.last_reduction_db
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.delay_l.clear();
        self.delay_r.clear();
        self.window_max.clear();
        self.sample_clock = 0;
        self.gain_smoother.reset_to(1.0);
        self.last_reduction_db = 0.0;
    }
}

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(s: &[f32]) -> f32 {
        s.iter().map(|x| x.abs()).fold(0.0f32, f32::max)
    }

    #[test]
    fn test_quiet_signal_untouched() {
        let mut lim = Limiter::new(LimiterConfig::default());
        let src: Vec<f32> = (0..44100).map(|i| 0.1 * (i as f32 * 0.05).sin()).collect();
        let mut l = src.clone();
        let mut r = src.clone();
        lim.process(&mut l, &mut r);
        // Modulo the lookahead delay, content passes at unity
        let delay = lim.lookahead_samples;
        for i in delay + 100..l.len() {
            assert!((l[i] - src[i - delay]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_hot_signal_held_at_ceiling() {
        let config = LimiterConfig {
            ceiling_db: -1.0,
            ..Default::default()
        };
        let ceiling = 10.0f32.powf(-1.0 / 20.0);
        let mut lim = Limiter::new(config);

        let src: Vec<f32> = (0..44100).map(|i| 1.4 * (i as f32 * 0.07).sin()).collect();
        let mut l = src.clone();
        let mut r = src;
        lim.process(&mut l, &mut r);

        // Allow 0.1 dB of transient overshoot
        let allowed = ceiling * 10.0f32.powf(0.1 / 20.0);
        assert!(peak(&l) <= allowed, "peak {} vs {}", peak(&l), allowed);
        assert!(lim.gain_reduction_db() < -1.0);
    }

    #[test]
    fn test_single_spike_caught_by_lookahead() {
        let mut lim = Limiter::new(LimiterConfig {
            ceiling_db: -3.0,
            ..Default::default()
        });
        let mut l = vec![0.0f32; 8820];
        l[4410] = 1.0;
        let mut r = l.clone();
        lim.process(&mut l, &mut r);
        let ceiling = 10.0f32.powf(-3.0 / 20.0) * 10.0f32.powf(0.1 / 20.0);
        assert!(peak(&l) <= ceiling, "peak {}", peak(&l));
    }

    #[test]
    fn test_output_length_equals_input() {
        let mut lim = Limiter::new(LimiterConfig::default());
        let mut l = vec![0.5f32; 1000];
        let mut r = vec![0.5f32; 1000];
        lim.process(&mut l, &mut r);
        assert_eq!(l.len(), 1000);
        assert_eq!(r.len(), 1000);
    }

    #[test]
    fn test_state_spans_calls() {
        // Processing one buffer in two halves must equal one call
        let src: Vec<f32> = (0..2000).map(|i| 1.2 * (i as f32 * 0.1).sin()).collect();

        let mut one = Limiter::new(LimiterConfig::default());
        let mut l1 = src.clone();
        let mut r1 = src.clone();
        one.process(&mut l1, &mut r1);

        let mut two = Limiter::new(LimiterConfig::default());
        let mut la = src[..1000].to_vec();
        let mut ra = src[..1000].to_vec();
        let mut lb = src[1000..].to_vec();
        let mut rb = src[1000..].to_vec();
        two.process(&mut la, &mut ra);
        two.process(&mut lb, &mut rb);

        la.extend(lb);
        for (a, b) in l1.iter().zip(la.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reset() {
        let mut lim = Limiter::new(LimiterConfig::default());
        let mut l = vec![1.5f32; 4410];
        let mut r = l.clone();
        lim.process(&mut l, &mut r);
        lim.reset();
        assert_eq!(lim.gain_reduction_db(), 0.0);
    }
}
