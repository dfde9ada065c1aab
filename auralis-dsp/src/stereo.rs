/// Stereo image: measurement and width processing
///
/// Measurement side feeds the fingerprint (width, phase correlation).
/// Processing side is the mid/side width stage of the mastering pipeline;
/// its side gain is smoothed per sample so width changes between chunks
/// never step audibly.

use crate::envelope::EnvelopeFollower;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoImage {
    /// 0 = mono, 1 = fully decorrelated channels.
    pub width: f32,
    /// Normalized correlation of L and R: -1 (inverted) .. +1 (identical).
    pub correlation: f32,
}

/// Width is defined as `1 - |corr(L, R)|`: identical or inverted channels
/// are both "narrow" in the mastering sense, uncorrelated channels are wide.
pub fn measure_stereo_image(left: &[f32], right: &[f32]) -> StereoImage {
    if left.is_empty() || left.len() != right.len() {
        return StereoImage {
            width: 0.0,
            correlation: 1.0,
        };
    }

    let correlation = normalized_correlation(left, right);
    StereoImage {
        width: (1.0 - correlation.abs()).clamp(0.0, 1.0),
        correlation,
    }
}

/// Zero-mean normalized cross-correlation at lag 0.
fn normalized_correlation(left: &[f32], right: &[f32]) -> f32 {
    let n = left.len() as f32;
    let mean_l: f32 = left.iter().sum::<f32>() / n;
    let mean_r: f32 = right.iter().sum::<f32>() / n;

    let mut cross = 0.0f32;
    let mut energy_l = 0.0f32;
    let mut energy_r = 0.0f32;
    for (l, r) in left.iter().zip(right.iter()) {
        let dl = l - mean_l;
        let dr = r - mean_r;
        cross += dl * dr;
        energy_l += dl * dl;
        energy_r += dr * dr;
    }

    let denom = (energy_l * energy_r).sqrt();
    if denom < 1e-12 {
        // Both channels flat: indistinguishable from mono
        return 1.0;
    }
    (cross / denom).clamp(-1.0, 1.0)
}

/// Mid/side width stage.
///
/// side_gain 1.0 is transparent; < 1 narrows, > 1 widens. The gain is
/// capped at 2.0, which bounds the worst-case mono-sum cancellation on
/// correlated material.
#[derive(Debug, Clone)]
pub struct StereoWidthStage {
    smoother: EnvelopeFollower,
}

const MAX_SIDE_GAIN: f32 = 2.0;

impl StereoWidthStage {
    pub fn new(sample_rate: u32) -> Self {
        // ~30 ms both ways: fast enough to land within a chunk, slow
        // enough to be inaudible as a level ramp
        Self {
            smoother: EnvelopeFollower::with_initial(sample_rate, 30.0, 30.0, 1.0),
        }
    }

    /// Rescale the side signal toward `side_gain`.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], side_gain: f32) {
        let target = side_gain.clamp(0.0, MAX_SIDE_GAIN);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let gain = self.smoother.process(target);
            let mid = (*l + *r) * 0.5;
            let side = (*l - *r) * 0.5 * gain;
            *l = mid + side;
            *r = mid - side;
        }
    }

    pub fn reset(&mut self) {
        self.smoother.reset_to(1.0);
    }
}
