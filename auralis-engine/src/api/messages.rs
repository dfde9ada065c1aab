/// Control-channel message types
///
/// JSON text frames both ways. Audio rides out-of-band: every
/// `chunk_header` text frame is immediately followed by one binary frame
/// carrying interleaved 16-bit little-endian PCM for that chunk.

use crate::models::DynamicsDecision;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Play {
        track_id: String,
        #[serde(default)]
        preset: Option<String>,
        #[serde(default)]
        intensity: Option<f32>,
    },
    Pause,
    Resume,
    Seek {
        position_ms: u64,
    },
    SetPreset {
        preset: String,
    },
    SetIntensity {
        intensity: f32,
    },
    Stop,
    RateTrack {
        track_id: String,
        rating: u8,
        #[serde(default)]
        comment: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StreamStart {
        sample_rate: u32,
        channels: u16,
        total_ms: u64,
        chunk_ms: u64,
    },
    /// Followed by one binary frame with the PCM payload.
    ChunkHeader {
        index: u64,
        n_samples: usize,
        decision: DynamicsDecision,
        lufs: f32,
        crest_db: f32,
    },
    Progress {
        ms_emitted: u64,
    },
    Stall {
        index: u64,
    },
    StreamEnd,
    Error {
        kind: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_round_trip() {
        let json = r#"{"type":"play","track_id":"t1","preset":"warm","intensity":0.8}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Play {
                track_id,
                preset,
                intensity,
            } => {
                assert_eq!(track_id, "t1");
                assert_eq!(preset.as_deref(), Some("warm"));
                assert_eq!(intensity, Some(0.8));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_play_defaults_optional_fields() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"play","track_id":"t1"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Play {
                preset: None,
                intensity: None,
                ..
            }
        ));
    }

    #[test]
    fn test_unit_commands() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"pause"}"#).unwrap(),
            ClientMessage::Pause
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"stop"}"#).unwrap(),
            ClientMessage::Stop
        ));
    }

    #[test]
    fn test_chunk_header_serializes_decision() {
        let msg = ServerMessage::ChunkHeader {
            index: 3,
            n_samples: 441_000,
            decision: DynamicsDecision::DynamicLoud,
            lufs: -11.0,
            crest_db: 15.0,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("chunk_header"));
        assert!(json.contains("dynamic_loud"));
    }

    #[test]
    fn test_malformed_message_is_error() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"warp_ten"}"#).is_err());
    }
}
