/// Decoder frontend
///
/// Turns `(path, start, duration)` into planar stereo at the canonical
/// rate. Symphonia handles container/codec work; rubato resamples when the
/// source rate differs. The output length is always exactly
/// `round(duration * canonical_rate)` samples per channel - short reads at
/// end of track are zero-padded - so chunk geometry never depends on codec
/// framing.

use crate::error::DecodeError;
use auralis_dsp::StereoBuffer;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

const RESAMPLE_CHUNK: usize = 1024;

/// Decode `[start_secs, start_secs + dur_secs)` of the file into stereo at
/// `target_rate`. Mono sources are promoted to dual mono; multichannel
/// sources use their first two channels.
pub fn decode_range(
    path: &Path,
    start_secs: f64,
    dur_secs: f64,
    target_rate: u32,
) -> Result<StereoBuffer, DecodeError> {
    let (mut format, track) = open_format(path)?;
    let track_id = track.id;
    let src_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Unsupported("missing sample rate".into()))?;
    let src_channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| DecodeError::Unsupported("missing channel layout".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(format!("no decoder: {e}")))?;

    // Accurate seek lands at or before the requested time; the distance to
    // the exact sample gets skipped below.
    let mut skip_frames = 0u64;
    if start_secs > 0.0 {
        let time = Time::from(start_secs);
        let required_ts = track
            .codec_params
            .time_base
            .map(|tb| tb.calc_timestamp(time))
            .unwrap_or_else(|| (start_secs * src_rate as f64) as u64);
        match format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(track_id),
            },
        ) {
            Ok(seeked) => {
                decoder.reset();
                skip_frames = required_ts.saturating_sub(seeked.actual_ts);
            }
            Err(SymphoniaError::SeekError(_)) => {
                // Past end of stream; produce silence of the right length
                let n = (dur_secs * target_rate as f64).round() as usize;
                return Ok(StereoBuffer::silence(n, target_rate));
            }
            Err(e) => return Err(map_symphonia_error(e)),
        }
    }

    // Decode a little past the request so the resampler has tail context
    let needed_src = ((dur_secs + 0.05) * src_rate as f64).ceil() as usize;
    let mut left: Vec<f32> = Vec::with_capacity(needed_src);
    let mut right: Vec<f32> = Vec::with_capacity(needed_src);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    'decode: loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break 'decode;
            }
            Err(SymphoniaError::ResetRequired) => break 'decode,
            Err(e) => return Err(map_symphonia_error(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip undecodable frames the way the probe layer does;
            // a fully corrupt stream surfaces as an empty result below
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(map_symphonia_error(e)),
        };

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
        });
        buf.copy_interleaved_ref(decoded);
        let samples = buf.samples();

        let frames = samples.len() / src_channels;
        for frame in 0..frames {
            if skip_frames > 0 {
                skip_frames -= 1;
                continue;
            }
            let base = frame * src_channels;
            let l = samples[base];
            let r = if src_channels > 1 {
                samples[base + 1]
            } else {
                l
            };
            left.push(l);
            right.push(r);
            if left.len() >= needed_src {
                break 'decode;
            }
        }
    }

    if left.is_empty() && start_secs == 0.0 {
        return Err(DecodeError::Corrupt("no samples decoded".into()));
    }

    let (mut left, mut right) = if src_rate != target_rate {
        resample_stereo(left, right, src_rate, target_rate)?
    } else {
        (left, right)
    };

    // Deterministic output geometry: truncate or zero-pad
    let n_out = (dur_secs * target_rate as f64).round() as usize;
    left.resize(n_out, 0.0);
    right.resize(n_out, 0.0);

    Ok(StereoBuffer::new(left, right, target_rate))
}

/// Total duration of the file in seconds, from container metadata.
pub fn probe_duration(path: &Path) -> Result<f64, DecodeError> {
    let (_, track) = open_format(path)?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Unsupported("missing sample rate".into()))?;
    let n_frames = track
        .codec_params
        .n_frames
        .ok_or_else(|| DecodeError::Unsupported("container reports no length".into()))?;
    Ok(n_frames as f64 / sample_rate as f64)
}

fn open_format(path: &Path) -> Result<(Box<dyn FormatReader>, Track), DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(format!("probe failed: {e}")))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or_else(|| DecodeError::Unsupported("no audio track".into()))?;

    Ok((format, track))
}

fn map_symphonia_error(e: SymphoniaError) -> DecodeError {
    match e {
        SymphoniaError::IoError(io) => DecodeError::Io(io),
        SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
        other => DecodeError::Corrupt(other.to_string()),
    }
}

fn resample_stereo(
    left: Vec<f32>,
    right: Vec<f32>,
    src_rate: u32,
    target_rate: u32,
) -> Result<(Vec<f32>, Vec<f32>), DecodeError> {
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::Blackman2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / src_rate as f64,
        2.0,
        params,
        RESAMPLE_CHUNK,
        2,
    )
    .map_err(|e| DecodeError::Corrupt(format!("resampler init: {e}")))?;

    let delay = resampler.output_delay();
    let mut out_left = Vec::with_capacity(left.len());
    let mut out_right = Vec::with_capacity(right.len());

    let mut pos = 0usize;
    while pos + RESAMPLE_CHUNK <= left.len() {
        let frames = resampler
            .process(
                &[&left[pos..pos + RESAMPLE_CHUNK], &right[pos..pos + RESAMPLE_CHUNK]],
                None,
            )
            .map_err(|e| DecodeError::Corrupt(format!("resample: {e}")))?;
        out_left.extend_from_slice(&frames[0]);
        out_right.extend_from_slice(&frames[1]);
        pos += RESAMPLE_CHUNK;
    }
    if pos < left.len() {
        let frames = resampler
            .process_partial(Some(&[&left[pos..], &right[pos..]]), None)
            .map_err(|e| DecodeError::Corrupt(format!("resample: {e}")))?;
        out_left.extend_from_slice(&frames[0]);
        out_right.extend_from_slice(&frames[1]);
    }
    // Flush the sinc tail
    let frames = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|e| DecodeError::Corrupt(format!("resample: {e}")))?;
    out_left.extend_from_slice(&frames[0]);
    out_right.extend_from_slice(&frames[1]);

    // Drop the filter's group delay so content stays time-aligned
    let out_left = out_left.split_off(delay.min(out_left.len()));
    let out_right = out_right.split_off(delay.min(out_right.len()));
    Ok((out_left, out_right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn fixture(dir: &Path, secs: f32, sample_rate: u32) -> std::path::PathBuf {
        testing::tone_wav(dir, "fixture.wav", secs, 0.5, sample_rate)
    }

    #[test]
    fn test_decode_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), 3.0, 44100);

        let buf = decode_range(&path, 0.0, 2.0, 44100).unwrap();
        assert_eq!(buf.len(), 88_200);
        assert_eq!(buf.sample_rate, 44100);
        assert!(buf.peak() > 0.4);
    }

    #[test]
    fn test_decode_past_end_pads_with_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), 1.0, 44100);

        let buf = decode_range(&path, 0.0, 2.0, 44100).unwrap();
        assert_eq!(buf.len(), 88_200);
        // Second half is padding
        let tail_peak = buf.left[66_150..]
            .iter()
            .map(|s| s.abs())
            .fold(0.0f32, f32::max);
        assert_eq!(tail_peak, 0.0);
    }

    #[test]
    fn test_decode_with_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), 3.0, 44100);

        let buf = decode_range(&path, 1.0, 1.0, 44100).unwrap();
        assert_eq!(buf.len(), 44_100);
        assert!(buf.peak() > 0.4);
    }

    #[test]
    fn test_resampled_output_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), 2.0, 48000);

        let buf = decode_range(&path, 0.0, 1.0, 44100).unwrap();
        assert_eq!(buf.len(), 44_100);
        assert!(buf.peak() > 0.3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = decode_range(Path::new("/nonexistent/x.wav"), 0.0, 1.0, 44100).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, vec![0xAB; 4096]).unwrap();
        let err = decode_range(&path, 0.0, 1.0, 44100).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
    }

    #[test]
    fn test_probe_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), 3.0, 44100);
        let secs = probe_duration(&path).unwrap();
        assert!((secs - 3.0).abs() < 0.05, "duration {secs}");
    }
}
