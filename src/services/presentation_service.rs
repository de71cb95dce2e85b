//! Buzzer, overlay and media toggles living on the session record.

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{MediaAction, MediaChannel, MediaCommand, OverlayKind},
    dto::common::SessionView,
    error::ServiceError,
    services::live::running_session,
    state::{SharedState, now_ms},
};

/// Open or close the buzzer.
pub async fn toggle_buzzer(
    state: &SharedState,
    match_id: Uuid,
    enabled: bool,
) -> Result<SessionView, ServiceError> {
    running_session(state, match_id).await?;

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            session.buzzer_enabled = enabled;
            Ok(())
        })
        .await?;

    info!(%match_id, enabled, "buzzer toggled");
    Ok(SessionView::from(&session))
}

/// Show or hide one guest display overlay.
pub async fn toggle_overlay(
    state: &SharedState,
    match_id: Uuid,
    kind: OverlayKind,
    enabled: bool,
) -> Result<SessionView, ServiceError> {
    running_session(state, match_id).await?;

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            session.overlays.set(kind, enabled);
            Ok(())
        })
        .await?;

    info!(%match_id, ?kind, enabled, "overlay toggled");
    Ok(SessionView::from(&session))
}

/// Issue a playback command; the per-channel id lets displays ignore replays.
pub async fn send_media_command(
    state: &SharedState,
    match_id: Uuid,
    channel: MediaChannel,
    action: MediaAction,
) -> Result<SessionView, ServiceError> {
    running_session(state, match_id).await?;

    let (session, command_id) = state
        .mutate_session(match_id, |session| {
            let slot = session.guest_media_control.channel_mut(channel);
            let command_id = slot.as_ref().map_or(1, |previous| previous.command_id + 1);
            *slot = Some(MediaCommand {
                command_id,
                action,
                issued_at: now_ms(),
            });
            Ok(command_id)
        })
        .await?;

    info!(%match_id, ?channel, ?action, command_id, "media command sent");
    Ok(SessionView::from(&session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Fixture;

    #[tokio::test]
    async fn media_command_ids_increase_per_channel() {
        let fixture = Fixture::running().await;

        send_media_command(&fixture.state, fixture.match_id, MediaChannel::Audio, MediaAction::Play)
            .await
            .unwrap();
        let view = send_media_command(
            &fixture.state,
            fixture.match_id,
            MediaChannel::Audio,
            MediaAction::Pause,
        )
        .await
        .unwrap();
        let audio = view.guest_media_control.audio.unwrap();
        assert_eq!(audio.command_id, 2);
        assert_eq!(audio.action, MediaAction::Pause);
        assert!(view.guest_media_control.video.is_none());
    }

    #[tokio::test]
    async fn toggles_require_a_running_session() {
        let fixture = Fixture::registered().await;
        let err = toggle_buzzer(&fixture.state, fixture.match_id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let fixture = Fixture::running().await;
        let view = toggle_overlay(&fixture.state, fixture.match_id, OverlayKind::Scoreboard, true)
            .await
            .unwrap();
        assert!(view.overlays.scoreboard);
    }
}
