/// WebSocket control channel
///
/// One socket, at most one active play session. Text frames carry the JSON
/// control messages; processed audio leaves as a `chunk_header` text frame
/// followed by a binary PCM frame. Malformed messages are answered with an
/// error event and the connection survives.

use crate::api::messages::{ClientMessage, ServerMessage};
use crate::models::Preset;
use crate::preferences::FeedbackRecord;
use crate::session::{spawn_session, EngineContext, SessionCommand, SessionEvent, SessionHandle};
use crate::tracks::TrackId;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;

pub async fn ws_handler(State(ctx): State<EngineContext>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, ctx))
}

async fn handle_socket(mut socket: WebSocket, ctx: EngineContext) {
    let mut session: Option<SessionHandle> = None;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else {
                    // Dropping the handle closes the command channel and
                    // cancels the session task
                    break;
                };
                let Message::Text(text) = msg else {
                    continue;
                };
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(cmd) => {
                        if handle_client_message(cmd, &ctx, &mut session, &mut socket).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed control message");
                        let reply = ServerMessage::Error {
                            kind: "protocol_error".into(),
                            message: format!("malformed message: {e}"),
                        };
                        if send_json(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                }
            }

            event = async { session.as_mut().expect("guarded").events.recv().await }, if session.is_some() => {
                match event {
                    Some(event) => {
                        if forward_event(&mut socket, event).await.is_err() {
                            break;
                        }
                    }
                    None => session = None,
                }
            }
        }
    }
}

async fn handle_client_message(
    cmd: ClientMessage,
    ctx: &EngineContext,
    session: &mut Option<SessionHandle>,
    socket: &mut WebSocket,
) -> Result<(), axum::Error> {
    match cmd {
        ClientMessage::Play {
            track_id,
            preset,
            intensity,
        } => {
            let preset = match preset.as_deref() {
                None => Preset::default(),
                Some(name) => match Preset::parse(name) {
                    Some(p) => p,
                    None => {
                        let reply = ServerMessage::Error {
                            kind: "protocol_error".into(),
                            message: format!("unknown preset: {name}"),
                        };
                        return send_json(socket, &reply).await;
                    }
                },
            };
            // Replacing the session drops the old command channel, which
            // cancels the previous stream
            *session = Some(spawn_session(
                ctx.clone(),
                TrackId::from(track_id),
                preset,
                intensity.unwrap_or(1.0),
            ));
        }
        ClientMessage::RateTrack {
            track_id,
            rating,
            comment,
        } => {
            if let Some(handle) = session {
                let _ = handle
                    .commands
                    .send(SessionCommand::Rate { rating, comment })
                    .await;
            } else {
                // No session context: record the rating bare
                let record = FeedbackRecord {
                    track_id: TrackId::from(track_id),
                    detected_type: crate::models::RecordingType::Unknown,
                    confidence: 0.0,
                    rating: rating.clamp(1, 5),
                    comment,
                    fingerprint: None,
                    parameters: crate::models::AdaptiveParameters::neutral(),
                    timestamp: chrono::Utc::now(),
                };
                if let Err(e) = ctx.preferences.record_feedback(&record) {
                    tracing::warn!(error = %e, "feedback not recorded");
                }
            }
        }
        other => {
            let command = match other {
                ClientMessage::Pause => Some(SessionCommand::Pause),
                ClientMessage::Resume => Some(SessionCommand::Resume),
                ClientMessage::Seek { position_ms } => Some(SessionCommand::Seek { position_ms }),
                ClientMessage::SetPreset { preset } => Some(SessionCommand::SetPreset { preset }),
                ClientMessage::SetIntensity { intensity } => {
                    Some(SessionCommand::SetIntensity { intensity })
                }
                ClientMessage::Stop => Some(SessionCommand::Stop),
                _ => None,
            };
            match (command, session.as_ref()) {
                (Some(command), Some(handle)) => {
                    let _ = handle.commands.send(command).await;
                }
                (Some(_), None) => {
                    let reply = ServerMessage::Error {
                        kind: "protocol_error".into(),
                        message: "no active session".into(),
                    };
                    return send_json(socket, &reply).await;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

async fn forward_event(socket: &mut WebSocket, event: SessionEvent) -> Result<(), axum::Error> {
    match event {
        SessionEvent::Chunk(chunk) => {
            let header = ServerMessage::ChunkHeader {
                index: chunk.index,
                n_samples: chunk.n_samples,
                decision: chunk.decision,
                lufs: chunk.lufs,
                crest_db: chunk.crest_db,
            };
            send_json(socket, &header).await?;
            socket.send(Message::Binary(chunk.to_pcm16())).await
        }
        SessionEvent::StreamStart {
            sample_rate,
            channels,
            total_ms,
            chunk_ms,
        } => {
            send_json(
                socket,
                &ServerMessage::StreamStart {
                    sample_rate,
                    channels,
                    total_ms,
                    chunk_ms,
                },
            )
            .await
        }
        SessionEvent::Progress { ms_emitted } => {
            send_json(socket, &ServerMessage::Progress { ms_emitted }).await
        }
        SessionEvent::Stall { index } => send_json(socket, &ServerMessage::Stall { index }).await,
        SessionEvent::Error { kind, message } => {
            send_json(socket, &ServerMessage::Error { kind, message }).await
        }
        SessionEvent::StreamEnd => send_json(socket, &ServerMessage::StreamEnd).await,
    }
}

async fn send_json(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_else(|_| "{}".into());
    socket.send(Message::Text(text)).await
}
