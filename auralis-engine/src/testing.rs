//! Test fixtures shared by unit and integration tests.

use std::io::Write;
use std::path::Path;

/// Write a 16-bit stereo PCM WAV from planar channels.
pub fn write_wav(path: &Path, left: &[f32], right: &[f32], sample_rate: u32) {
    let n = left.len() as u32;
    let data_len = n * 4;
    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(b"RIFF").unwrap();
    f.write_all(&(36 + data_len).to_le_bytes()).unwrap();
    f.write_all(b"WAVE").unwrap();
    f.write_all(b"fmt ").unwrap();
    f.write_all(&16u32.to_le_bytes()).unwrap();
    f.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
    f.write_all(&2u16.to_le_bytes()).unwrap(); // stereo
    f.write_all(&sample_rate.to_le_bytes()).unwrap();
    f.write_all(&(sample_rate * 4).to_le_bytes()).unwrap();
    f.write_all(&4u16.to_le_bytes()).unwrap();
    f.write_all(&16u16.to_le_bytes()).unwrap();
    f.write_all(b"data").unwrap();
    f.write_all(&data_len.to_le_bytes()).unwrap();
    for (l, r) in left.iter().zip(right.iter()) {
        f.write_all(&((l.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
            .unwrap();
        f.write_all(&((r.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
            .unwrap();
    }
}

/// Two-tone stereo test signal.
pub fn tone_channels(secs: f32, amp: f32, sample_rate: u32) -> (Vec<f32>, Vec<f32>) {
    let n = (secs * sample_rate as f32) as usize;
    let left = (0..n)
        .map(|i| amp * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sample_rate as f32).sin())
        .collect();
    let right = (0..n)
        .map(|i| amp * (2.0 * std::f32::consts::PI * 330.0 * i as f32 / sample_rate as f32).sin())
        .collect();
    (left, right)
}

/// Write a tone fixture and return its path.
pub fn tone_wav(dir: &Path, name: &str, secs: f32, amp: f32, sample_rate: u32) -> std::path::PathBuf {
    let (l, r) = tone_channels(secs, amp, sample_rate);
    let path = dir.join(name);
    write_wav(&path, &l, &r, sample_rate);
    path
}
