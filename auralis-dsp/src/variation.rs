/// Temporal variation: how much the dynamics move over the track
///
/// Crest factor, short-term loudness, and peak level are measured over 5 s
/// windows; the standard deviation of each sequence is normalized into
/// [0, 1]. Peak consistency is reported directly (1 = steady peaks), the
/// other two as variation (0 = static).

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariationProfile {
    /// Spread of per-window crest factor, 0 (static) .. 1 (wildly varying).
    pub dynamic_range_variation: f32,
    /// Spread of per-window loudness, 0 .. 1.
    pub loudness_variation: f32,
    /// Steadiness of per-window peaks, 1 = identical peaks every window.
    pub peak_consistency: f32,
}

const WINDOW_SECS: f32 = 5.0;
/// A 12 dB std-dev maps to full-scale variation.
const DB_VARIATION_SCALE: f32 = 12.0;

pub fn compute_variation_profile(samples: &[f32], sample_rate: u32) -> VariationProfile {
    if samples.is_empty() || sample_rate == 0 {
        return VariationProfile {
            dynamic_range_variation: 0.0,
            loudness_variation: 0.0,
            peak_consistency: 1.0,
        };
    }

    let window_len = ((WINDOW_SECS * sample_rate as f32) as usize).max(1);

    let mut crests = Vec::new();
    let mut loudnesses = Vec::new();
    let mut peaks = Vec::new();
    for window in samples.chunks(window_len) {
        let peak = window.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let rms = (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt();
        peaks.push(peak);
        if rms > 1e-10 && peak > 1e-10 {
            crests.push(20.0 * (peak / rms).log10());
            loudnesses.push(20.0 * rms.log10());
        }
    }

    VariationProfile {
        dynamic_range_variation: (std_dev(&crests) / DB_VARIATION_SCALE).clamp(0.0, 1.0),
        loudness_variation: (std_dev(&loudnesses) / DB_VARIATION_SCALE).clamp(0.0, 1.0),
        peak_consistency: (1.0 - coefficient_of_variation(&peaks)).clamp(0.0, 1.0),
    }
}

fn std_dev(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

fn coefficient_of_variation(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    if mean.abs() < 1e-10 {
        return 0.0;
    }
    std_dev(values) / mean.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_signal_is_static() {
        let audio: Vec<f32> = (0..44100 * 15)
            .map(|i| 0.5 * (i as f32 * 0.05).sin())
            .collect();
        let profile = compute_variation_profile(&audio, 44100);
        assert!(profile.dynamic_range_variation < 0.1);
        assert!(profile.loudness_variation < 0.1);
        assert!(profile.peak_consistency > 0.9);
    }

    #[test]
    fn test_alternating_loud_quiet_varies() {
        // 5 s loud / 5 s quiet blocks, three of each
        let sr = 44100usize;
        let mut audio = Vec::new();
        for block in 0..6 {
            let amp = if block % 2 == 0 { 0.9 } else { 0.02 };
            audio.extend((0..sr * 5).map(|i| amp * (i as f32 * 0.05).sin()));
        }
        let profile = compute_variation_profile(&audio, 44100);
        assert!(profile.loudness_variation > 0.5, "loudness var {}", profile.loudness_variation);
        assert!(profile.peak_consistency < 0.6, "consistency {}", profile.peak_consistency);
    }

    #[test]
    fn test_empty_input() {
        let profile = compute_variation_profile(&[], 44100);
        assert_eq!(profile.dynamic_range_variation, 0.0);
        assert_eq!(profile.peak_consistency, 1.0);
    }

    #[test]
    fn test_outputs_in_range() {
        let audio: Vec<f32> = (0..44100 * 12).map(|i| ((i / 44100) as f32 * 0.1) * (i as f32).sin()).collect();
        let p = compute_variation_profile(&audio, 44100);
        assert!((0.0..=1.0).contains(&p.dynamic_range_variation));
        assert!((0.0..=1.0).contains(&p.loudness_variation));
        assert!((0.0..=1.0).contains(&p.peak_consistency));
    }
}
