//! Capture commands
//!
//! The user-facing command set over a running `CaptureSession`. Handlers
//! return serializable errors so the caller can print or forward them.

use crate::photo::{CaptureOutcome, PhotoArtifact};
use crate::recorder::RecordingState;
use crate::session::{CaptureSession, SessionStatus};
use crate::utils::error::{AppError, ErrorResponse};
use serde::Serialize;
use std::str::FromStr;

/// A parsed user command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleRecording,
    CapturePhoto,
    Status,
    Quit,
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" | "record" | "toggle" => Ok(Command::ToggleRecording),
            "p" | "photo" => Ok(Command::CapturePhoto),
            "s" | "status" => Ok(Command::Status),
            "q" | "quit" | "exit" => Ok(Command::Quit),
            other => Err(AppError::InvalidRequest(format!("unknown command '{other}'"))),
        }
    }
}

/// What a handled command printed back
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reply {
    Recording { state: RecordingState },
    Photo { photo: Option<PhotoArtifact> },
    Status(SessionStatus),
    Error(ErrorResponse),
}

/// Flip between idle and recording
pub async fn toggle_recording(session: &CaptureSession) -> Result<RecordingState, ErrorResponse> {
    session.toggle_recording().await.map_err(ErrorResponse::from)
}

/// Take a still; `None` when a newer photo already replaced it
pub async fn capture_photo(
    session: &CaptureSession,
) -> Result<Option<PhotoArtifact>, ErrorResponse> {
    match session.capture_photo().await? {
        CaptureOutcome::Committed(photo) => Ok(Some(photo)),
        CaptureOutcome::Superseded { .. } => Ok(None),
    }
}

pub async fn get_status(session: &CaptureSession) -> Result<SessionStatus, ErrorResponse> {
    Ok(session.status().await)
}

/// Run one command and fold its result into a reply
///
/// `Quit` is handled by the caller and replies with the current status.
pub async fn dispatch(session: &CaptureSession, command: Command) -> Reply {
    let result = match command {
        Command::ToggleRecording => toggle_recording(session)
            .await
            .map(|state| Reply::Recording { state }),
        Command::CapturePhoto => capture_photo(session)
            .await
            .map(|photo| Reply::Photo { photo }),
        Command::Status | Command::Quit => get_status(session).await.map(Reply::Status),
    };

    result.unwrap_or_else(Reply::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticBackend;
    use crate::config::AppConfig;
    use std::sync::Arc;

    async fn session() -> CaptureSession {
        let mut config = AppConfig::default();
        config.synthetic.width = 8;
        config.synthetic.height = 8;
        config.recording.timeslice_ms = 10;
        let backend = Arc::new(SyntheticBackend::new(config.synthetic.clone()));
        CaptureSession::start(config, backend).await.unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("r".parse::<Command>().unwrap(), Command::ToggleRecording);
        assert_eq!(" Photo ".parse::<Command>().unwrap(), Command::CapturePhoto);
        assert_eq!("status".parse::<Command>().unwrap(), Command::Status);
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
        assert!(matches!(
            "zoom".parse::<Command>(),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_replies() {
        let session = session().await;

        match dispatch(&session, Command::ToggleRecording).await {
            Reply::Recording { state } => assert_eq!(state, RecordingState::Recording),
            other => panic!("unexpected reply: {other:?}"),
        }
        match dispatch(&session, Command::ToggleRecording).await {
            Reply::Recording { state } => assert_eq!(state, RecordingState::Idle),
            other => panic!("unexpected reply: {other:?}"),
        }
        match dispatch(&session, Command::CapturePhoto).await {
            Reply::Photo { photo } => assert_eq!(photo.unwrap().mime_type, "image/png"),
            other => panic!("unexpected reply: {other:?}"),
        }

        let reply = dispatch(&session, Command::Status).await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["recordingState"], "idle");
        assert_eq!(json["recordings"], 1);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_photo_error_becomes_response() {
        let session = session().await;
        session.shutdown().await;

        match dispatch(&session, Command::CapturePhoto).await {
            Reply::Error(response) => assert_eq!(response.code, "NO_FRAME_AVAILABLE"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
