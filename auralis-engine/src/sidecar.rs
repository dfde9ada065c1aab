/// Fingerprint sidecar files
///
/// A small binary file next to the audio file, so a library can ship
/// precomputed fingerprints with the music itself. Layout, little-endian:
///
/// ```text
/// offset  size  field
/// 0       4     magic "AFP1"
/// 4       2     schema version (u16)
/// 6       2     reserved, zero
/// 8       100   fingerprint, 25 x f32 in canonical order
/// ```
///
/// 108 bytes total. Unknown versions are reported, not guessed at; the
/// resolver treats them as a miss and re-extracts.

use crate::error::StoreError;
use auralis_dsp::{Fingerprint, SCHEMA_VERSION};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const SIDECAR_MAGIC: [u8; 4] = *b"AFP1";
pub const SIDECAR_EXTENSION: &str = "afp";
pub const SIDECAR_LEN: usize = 8 + 25 * 4;

/// `song.flac` -> `song.flac.afp`; keeps the audio extension visible.
pub fn sidecar_path(audio_path: &Path) -> PathBuf {
    let mut os = audio_path.as_os_str().to_owned();
    os.push(".");
    os.push(SIDECAR_EXTENSION);
    PathBuf::from(os)
}

/// Read the sidecar adjacent to `audio_path`.
///
/// `Ok(None)` when no sidecar exists or its schema version does not match;
/// `Err` only for real I/O or format problems.
pub fn read_sidecar(audio_path: &Path) -> Result<Option<Fingerprint>, StoreError> {
    let path = sidecar_path(audio_path);
    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Io(e)),
    };

    let mut buf = [0u8; SIDECAR_LEN];
    file.read_exact(&mut buf).map_err(|e| {
        StoreError::SidecarFormat(format!("{}: truncated sidecar: {e}", path.display()))
    })?;

    if buf[0..4] != SIDECAR_MAGIC {
        return Err(StoreError::SidecarFormat(format!(
            "{}: bad magic",
            path.display()
        )));
    }

    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != SCHEMA_VERSION {
        tracing::debug!(
            path = %path.display(),
            version,
            expected = SCHEMA_VERSION,
            "sidecar schema mismatch, ignoring"
        );
        return Ok(None);
    }

    let mut values = [0.0f32; 25];
    for (i, v) in values.iter_mut().enumerate() {
        let off = 8 + i * 4;
        *v = f32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::SidecarFormat(format!(
            "{}: non-finite values",
            path.display()
        )));
    }

    Ok(Some(Fingerprint::from_array(values)))
}

/// Write a sidecar next to `audio_path`. Best-effort by callers: a
/// read-only music directory is not an error worth surfacing.
pub fn write_sidecar(audio_path: &Path, fingerprint: &Fingerprint) -> Result<(), StoreError> {
    let path = sidecar_path(audio_path);
    let mut buf = Vec::with_capacity(SIDECAR_LEN);
    buf.extend_from_slice(&SIDECAR_MAGIC);
    buf.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    for v in fingerprint.to_array() {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    let mut file = std::fs::File::create(&path)?;
    file.write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fingerprint() -> Fingerprint {
        let mut values = [0.0f32; 25];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as f32 * 0.5 - 3.0;
        }
        Fingerprint::from_array(values)
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.flac");
        std::fs::write(&audio, b"fake").unwrap();

        let fp = sample_fingerprint();
        write_sidecar(&audio, &fp).unwrap();

        let loaded = read_sidecar(&audio).unwrap().expect("sidecar present");
        assert_eq!(loaded.to_array(), fp.to_array());
    }

    #[test]
    fn test_missing_sidecar_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("nothing.flac");
        assert!(read_sidecar(&audio).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.flac");
        let mut junk = vec![0u8; SIDECAR_LEN];
        junk[0..4].copy_from_slice(b"NOPE");
        std::fs::write(sidecar_path(&audio), &junk).unwrap();

        assert!(matches!(
            read_sidecar(&audio),
            Err(StoreError::SidecarFormat(_))
        ));
    }

    #[test]
    fn test_version_mismatch_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.flac");
        let fp = sample_fingerprint();
        write_sidecar(&audio, &fp).unwrap();

        // Flip the version bytes
        let side = sidecar_path(&audio);
        let mut bytes = std::fs::read(&side).unwrap();
        bytes[4] = 0xFF;
        bytes[5] = 0xFF;
        std::fs::write(&side, &bytes).unwrap();

        assert!(read_sidecar(&audio).unwrap().is_none());
    }

    #[test]
    fn test_truncated_sidecar_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.flac");
        std::fs::write(sidecar_path(&audio), b"AFP1\x01\x00").unwrap();
        assert!(matches!(
            read_sidecar(&audio),
            Err(StoreError::SidecarFormat(_))
        ));
    }

    #[test]
    fn test_sidecar_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.flac");
        write_sidecar(&audio, &sample_fingerprint()).unwrap();
        let meta = std::fs::metadata(sidecar_path(&audio)).unwrap();
        assert_eq!(meta.len() as usize, SIDECAR_LEN);
    }
}
