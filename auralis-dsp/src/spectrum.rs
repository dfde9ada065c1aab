/// Shared STFT machinery for the analysis modules
///
/// All spectral features run on the same framing: Hann window of 2048
/// samples with a hop of 512 (75% overlap). Frames are never stored as a
/// whole spectrogram; callers either stream frame-by-frame or map frames in
/// parallel and aggregate, which keeps memory flat for long inputs.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use rayon::prelude::*;
use std::f32::consts::PI;
use std::sync::Arc;

pub const FFT_SIZE: usize = 2048;
pub const HOP_LENGTH: usize = 512;

/// Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - ((2.0 * PI * i as f32) / n as f32).cos()))
        .collect()
}

/// STFT frame iterator over a mono signal.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_size: usize,
    hop: usize,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            window: hann_window(fft_size),
            fft_size,
            hop,
        }
    }

    /// Number of complete frames available in `len` samples.
    pub fn num_frames(&self, len: usize) -> usize {
        if len < self.fft_size {
            return 0;
        }
        (len - self.fft_size) / self.hop + 1
    }

    /// Center frequency of a bin in Hz.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.fft_size as f32
    }

    /// Half-spectrum magnitudes of one frame.
    pub fn magnitudes(&self, signal: &[f32], frame_idx: usize) -> Vec<f32> {
        let start = frame_idx * self.hop;
        let frame = &signal[start..start + self.fft_size];

        let mut buf: Vec<Complex<f32>> = frame
            .iter()
            .zip(self.window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buf);

        let half = self.fft_size / 2 + 1;
        buf[..half]
            .iter()
            .map(|c| c.norm() / self.fft_size as f32)
            .collect()
    }

    /// Map every frame through `f` in parallel, preserving frame order.
    ///
    /// Aggregation over the returned Vec stays sequential in the caller, so
    /// results are reproducible bit-for-bit on any thread count.
    pub fn par_frame_map<T, F>(&self, signal: &[f32], f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize, &[f32]) -> T + Sync,
    {
        let n = self.num_frames(signal.len());
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mags = self.magnitudes(signal, i);
                f(i, &mags)
            })
            .collect()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(FFT_SIZE, HOP_LENGTH)
    }
}

/// Power spectral density from half-spectrum magnitudes.
pub fn magnitudes_to_psd(mags: &[f32]) -> Vec<f32> {
    mags.iter().map(|m| (m * m).max(1e-20)).collect()
}

/// Median of a sequence; 0.0 when empty.
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}
