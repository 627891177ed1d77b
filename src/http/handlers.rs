use super::state::{AppState, VoiceSlot};
use crate::error::BridgeError;
use crate::session::{SessionState, SessionStats, VoiceSession};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct VoiceStatusResponse {
    /// True only while audio is streaming
    pub connected: bool,
    pub state: Option<SessionState>,
    pub session: Option<SessionStats>,
    pub last_session: Option<SessionStats>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Status code the UI sees for each failure kind
pub(crate) fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
        BridgeError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        BridgeError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::Transport(_) | BridgeError::Timeout(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/connect
/// Open the voice session
pub async fn connect_voice(State(state): State<AppState>) -> impl IntoResponse {
    // Claim the slot first so concurrent connects conflict instead of racing
    {
        let mut slot = state.voice.write().await;
        let busy = match &*slot {
            VoiceSlot::Idle => false,
            VoiceSlot::Connecting => true,
            VoiceSlot::Live(session) => session.is_streaming(),
        };
        if busy {
            return error_response(
                StatusCode::CONFLICT,
                "A voice session is already active".to_string(),
            );
        }
        *slot = VoiceSlot::Connecting;
    }

    // Runs detached so a dropped request cannot leave the slot claimed
    match tokio::spawn(establish(state.clone())).await {
        Ok(response) => response,
        Err(e) => {
            error!("Voice connect task failed: {}", e);
            *state.voice.write().await = VoiceSlot::Idle;
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Voice connect task failed".to_string(),
            )
        }
    }
}

/// Connect a session for a claimed slot and publish it (or release the slot)
async fn establish(state: AppState) -> Response {
    let parts = match state.factory.parts() {
        Ok(parts) => parts,
        Err(e) => {
            error!("Failed to prepare voice session: {}", e);
            *state.voice.write().await = VoiceSlot::Idle;
            return error_response(status_for(&e), e.to_string());
        }
    };

    let on_close = state.clone();
    let result = VoiceSession::connect(state.factory.session_config(), parts, move || {
        tokio::spawn(async move { on_close.reap_closed().await });
    })
    .await;

    let session = match result {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!("Failed to connect voice session: {}", e);
            *state.voice.write().await = VoiceSlot::Idle;
            return error_response(status_for(&e), e.to_string());
        }
    };

    let session_id = session.session_id().to_string();
    {
        let mut slot = state.voice.write().await;
        if session.is_streaming() {
            *slot = VoiceSlot::Live(Arc::clone(&session));
        } else {
            // Closed before we could publish it; the reaper saw Connecting
            *slot = VoiceSlot::Idle;
            drop(slot);
            warn!("Voice session {} closed during connect", session_id);
            *state.last_session.write().await = Some(session.stats().await);
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Voice session {} closed during connect", session_id),
            );
        }
    }

    info!("Voice session {} connected", session_id);

    (
        StatusCode::OK,
        Json(ConnectResponse {
            session_id: session_id.clone(),
            status: "streaming".to_string(),
            message: format!("Voice session {} connected", session_id),
        }),
    )
        .into_response()
}

/// POST /voice/disconnect
/// Close the active voice session
pub async fn disconnect_voice(State(state): State<AppState>) -> impl IntoResponse {
    let session = {
        let mut slot = state.voice.write().await;
        match std::mem::replace(&mut *slot, VoiceSlot::Idle) {
            VoiceSlot::Live(session) => Some(session),
            other => {
                *slot = other;
                None
            }
        }
    };

    let Some(session) = session else {
        return error_response(
            StatusCode::NOT_FOUND,
            "No active voice session".to_string(),
        );
    };

    session.disconnect().await;
    let stats = session.stats().await;
    *state.last_session.write().await = Some(stats.clone());

    info!("Voice session {} disconnected", stats.session_id);

    (
        StatusCode::OK,
        Json(DisconnectResponse {
            session_id: stats.session_id.clone(),
            status: "disconnected".to_string(),
            message: "Voice session closed".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// GET /voice/status
/// Connection state and statistics
pub async fn voice_status(State(state): State<AppState>) -> impl IntoResponse {
    let (state_now, session) = {
        let slot = state.voice.read().await;
        match &*slot {
            VoiceSlot::Idle => (None, None),
            VoiceSlot::Connecting => (Some(SessionState::Connecting), None),
            VoiceSlot::Live(session) => (Some(session.state()), Some(Arc::clone(session))),
        }
    };

    let stats = match &session {
        Some(session) => Some(session.stats().await),
        None => None,
    };
    let last_session = state.last_session.read().await.clone();

    (
        StatusCode::OK,
        Json(VoiceStatusResponse {
            connected: state_now == Some(SessionState::Streaming),
            state: state_now,
            session: stats,
            last_session,
        }),
    )
        .into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_for(&BridgeError::MissingCredential("API_KEY".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&BridgeError::PermissionDenied("mic".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&BridgeError::DeviceUnavailable("none".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&BridgeError::Timeout(Duration::from_secs(10))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&BridgeError::Decode("odd".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
