/// Spectral shape: centroid, rolloff, flatness
///
/// Each feature is computed per STFT frame and aggregated with the median,
/// which keeps a few silent or transient frames from dragging the summary
/// around the way a mean would.

use crate::spectrum::{magnitudes_to_psd, median, SpectrumAnalyzer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralShape {
    /// Center of spectral mass in Hz. Higher = brighter.
    pub centroid_hz: f32,
    /// Frequency below which 85% of the energy sits, in Hz.
    pub rolloff_hz: f32,
    /// Wiener entropy: 0 = pure tone, 1 = white noise.
    pub flatness: f32,
}

const ROLLOFF_FRACTION: f32 = 0.85;

pub fn compute_spectral_shape(samples: &[f32], sample_rate: u32) -> SpectralShape {
    let analyzer = SpectrumAnalyzer::default();
    if analyzer.num_frames(samples.len()) == 0 {
        // Degenerate input: report a mid-band centroid so downstream
        // profile matching sees "no information" rather than an extreme.
        return SpectralShape {
            centroid_hz: sample_rate as f32 / 8.0,
            rolloff_hz: sample_rate as f32 / 4.0,
            flatness: 0.5,
        };
    }

    let per_frame: Vec<(f32, f32, f32)> = analyzer.par_frame_map(samples, |_, mags| {
        let psd = magnitudes_to_psd(mags);
        (
            frame_centroid(&psd, &analyzer, sample_rate),
            frame_rolloff(&psd, &analyzer, sample_rate),
            frame_flatness(&psd),
        )
    });

    let centroids: Vec<f32> = per_frame.iter().map(|f| f.0).collect();
    let rolloffs: Vec<f32> = per_frame.iter().map(|f| f.1).collect();
    let flatnesses: Vec<f32> = per_frame.iter().map(|f| f.2).collect();

    let nyquist = sample_rate as f32 / 2.0;
    SpectralShape {
        centroid_hz: median(&centroids).clamp(1.0, nyquist),
        rolloff_hz: median(&rolloffs).clamp(1.0, nyquist),
        flatness: median(&flatnesses).clamp(0.0, 1.0),
    }
}

fn frame_centroid(psd: &[f32], analyzer: &SpectrumAnalyzer, sample_rate: u32) -> f32 {
    let total: f32 = psd.iter().sum();
    if total < 1e-15 {
        return 0.0;
    }
    let weighted: f32 = psd
        .iter()
        .enumerate()
        .map(|(bin, p)| p * analyzer.bin_frequency(bin, sample_rate))
        .sum();
    weighted / total
}

fn frame_rolloff(psd: &[f32], analyzer: &SpectrumAnalyzer, sample_rate: u32) -> f32 {
    let total: f32 = psd.iter().sum();
    if total < 1e-15 {
        return 0.0;
    }
    let threshold = ROLLOFF_FRACTION * total;
    let mut cumulative = 0.0;
    for (bin, p) in psd.iter().enumerate() {
        cumulative += p;
        if cumulative >= threshold {
            return analyzer.bin_frequency(bin, sample_rate);
        }
    }
    analyzer.bin_frequency(psd.len() - 1, sample_rate)
}

/// Geometric mean over arithmetic mean of the PSD.
fn frame_flatness(psd: &[f32]) -> f32 {
    if psd.is_empty() {
        return 0.0;
    }
    let log_mean: f32 = psd.iter().map(|p| p.max(1e-20).ln()).sum::<f32>() / psd.len() as f32;
    let arith_mean: f32 = psd.iter().sum::<f32>() / psd.len() as f32;
    if arith_mean < 1e-20 {
        return 0.0;
    }
    (log_mean.exp() / arith_mean).clamp(0.0, 1.0)
}
