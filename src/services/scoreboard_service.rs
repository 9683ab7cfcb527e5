//! Turns client operations into scoreboard events and applies them to a room.

use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dto::{
        now_rfc3339,
        ws::{ClientOperation, EventEnvelope, OperationDecodeError, RoundConfigInput},
    },
    state::{
        SharedState,
        room::{Applied, Room},
        rounds::{
            NewPlaylist, PlaylistUpdate, Rejection, RoundConfig, RoundEvent, RoundResults,
            RoundTemplate, TemplateConfig, TemplateUpdate,
        },
        scoreboard::{ScoreStep, ScoreboardEvent},
    },
};

/// Why an inbound operation left the room untouched.
///
/// None of these are reported back to the client; the next snapshot simply shows no change.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] OperationDecodeError),
    /// The payload failed validation.
    #[error("invalid payload: {0}")]
    Invalid(#[from] ValidationErrors),
    /// The current state does not allow the operation.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The payload asks for nothing (e.g. a zero score action).
    #[error("`{0}` ignored: nothing to do")]
    Noop(&'static str),
}

/// Decode a text frame and apply it to `room`.
pub async fn apply_frame(
    state: &SharedState,
    room: &Room,
    text: &str,
) -> Result<Applied, OperationError> {
    let envelope = EventEnvelope::from_json_str(text)?;
    let operation = ClientOperation::from_envelope(envelope)?;
    apply_operation(state, room, operation).await
}

/// Validate `operation`, apply it, and schedule the room for persistence when it changed.
pub async fn apply_operation(
    state: &SharedState,
    room: &Room,
    operation: ClientOperation,
) -> Result<Applied, OperationError> {
    operation.validate()?;
    let event = into_event(operation)?;
    let name = event.name();

    let applied = room.apply(event).await?;
    if let Applied::Changed(version) = applied {
        info!(room = %room.id(), event = name, version, "operation applied");
        state.mark_dirty(room.id());
    }
    Ok(applied)
}

fn round_config(input: RoundConfigInput) -> RoundConfig {
    RoundConfig {
        number: input.number.unwrap_or_default(),
        round_type: input.round_type.trim().to_string(),
        theme: input.theme.filter(|theme| !theme.trim().is_empty()),
        is_mixed: input.is_mixed,
        min_players: input.min_players,
        max_players: input.max_players,
        time_limit: input.time_limit,
    }
}

fn template_config(input: RoundConfigInput) -> TemplateConfig {
    TemplateConfig::from(&round_config(input))
}

/// Map a wire operation onto the state-level event. Identifiers and timestamps are
/// allocated here so the state transitions stay pure.
fn into_event(operation: ClientOperation) -> Result<ScoreboardEvent, OperationError> {
    let event = match operation {
        ClientOperation::UpdateTeam(payload) => {
            let updates = payload.updates.retain_valid();
            ScoreboardEvent::UpdateTeam {
                team: payload.team_id,
                name: updates.name,
                color: updates.color,
            }
        }
        ClientOperation::UpdateScore(payload) => ScoreboardEvent::AdjustScore {
            team: payload.team_id,
            step: ScoreStep::from_action(payload.action).ok_or(OperationError::Noop("updateScore"))?,
        },
        ClientOperation::UpdatePenalty(payload) => {
            if payload.action.is_some_and(|action| action <= 0) {
                return Err(OperationError::Noop("updatePenalty"));
            }
            ScoreboardEvent::AddPenalty {
                team: payload.team_id,
                kind: payload.kind,
            }
        }
        ClientOperation::ResetPenalties(payload) => ScoreboardEvent::ResetPenalties(payload.team_id),
        ClientOperation::ResetAll(_) => ScoreboardEvent::ResetAll,
        ClientOperation::UpdateLogo(logo) => ScoreboardEvent::SetLogo(logo),
        ClientOperation::UpdateLogoSize(payload) => ScoreboardEvent::SetLogoSize(payload.size),
        ClientOperation::UpdateText(payload) => ScoreboardEvent::SetText {
            target: payload.field,
            text: payload.text,
        },
        ClientOperation::UpdateTextStyle(payload) => {
            let payload = payload.retain_valid();
            ScoreboardEvent::SetTextStyle {
                target: payload.target,
                color: payload.color,
                size: payload.size,
            }
        }
        ClientOperation::UpdateVisibility(payload) => ScoreboardEvent::SetVisibility {
            target: payload.target,
            visible: payload.visible,
        },
        ClientOperation::UpdateRoundSetting(payload) => {
            ScoreboardEvent::Round(RoundEvent::SetSetting {
                target: payload.target,
                visible: payload.visible,
            })
        }
        ClientOperation::SwitchTeamEmojis(_) => ScoreboardEvent::SwitchTeamEmojis,
        ClientOperation::UpdateTeamEmoji(payload) => ScoreboardEvent::SetTeamEmoji {
            team: payload.team_id,
            emoji: payload.emoji,
        },
        ClientOperation::UpdateScoringMode(payload) => {
            ScoreboardEvent::SetScoringMode(payload.mode)
        }
        ClientOperation::StartGame(_) => ScoreboardEvent::Round(RoundEvent::StartGame),
        ClientOperation::FinishGame(_) => ScoreboardEvent::Round(RoundEvent::FinishGame),
        ClientOperation::StartRound(payload) => {
            ScoreboardEvent::Round(RoundEvent::StartRound(round_config(payload.config)))
        }
        ClientOperation::EndRound(payload) => {
            ScoreboardEvent::Round(RoundEvent::EndRound(RoundResults {
                points: payload.results.points,
                penalties: payload.results.penalties,
                notes: payload.results.notes.filter(|notes| !notes.trim().is_empty()),
                completed_at: now_rfc3339(),
            }))
        }
        ClientOperation::SaveTemplate(payload) => {
            ScoreboardEvent::Round(RoundEvent::SaveTemplate(RoundTemplate {
                id: Uuid::new_v4(),
                name: payload.name.trim().to_string(),
                description: payload.description,
                tags: payload.tags,
                config: template_config(payload.config),
            }))
        }
        ClientOperation::UpdateTemplate(payload) => {
            let updates = payload.updates.retain_valid();
            ScoreboardEvent::Round(RoundEvent::UpdateTemplate {
                id: payload.id,
                updates: TemplateUpdate {
                    name: updates.name.map(|name| name.trim().to_string()),
                    description: updates.description,
                    tags: updates.tags,
                    config: updates.config.map(template_config),
                },
            })
        }
        ClientOperation::DeleteTemplate(payload) => {
            ScoreboardEvent::Round(RoundEvent::DeleteTemplate(payload.id))
        }
        ClientOperation::CreatePlaylist(payload) => {
            ScoreboardEvent::Round(RoundEvent::CreatePlaylist(NewPlaylist {
                id: Uuid::new_v4(),
                name: payload.name,
                description: payload.description,
                template_ids: payload.template_ids,
            }))
        }
        ClientOperation::UpdatePlaylist(payload) => {
            let updates = payload.updates.retain_valid();
            ScoreboardEvent::Round(RoundEvent::UpdatePlaylist {
                id: payload.id,
                updates: PlaylistUpdate {
                    name: updates.name,
                    description: updates.description,
                    template_ids: updates.template_ids,
                },
            })
        }
        ClientOperation::DeletePlaylist(payload) => {
            ScoreboardEvent::Round(RoundEvent::DeletePlaylist(payload.id))
        }
        ClientOperation::StartPlaylist(payload) => {
            ScoreboardEvent::Round(RoundEvent::StartPlaylist(payload.id))
        }
        ClientOperation::NextInPlaylist(_) => ScoreboardEvent::Round(RoundEvent::NextInPlaylist),
        ClientOperation::PreviousInPlaylist(_) => {
            ScoreboardEvent::Round(RoundEvent::PreviousInPlaylist)
        }
        ClientOperation::StopPlaylist(_) => ScoreboardEvent::Round(RoundEvent::StopPlaylist),
        ClientOperation::SetNextRoundDraft(payload) => ScoreboardEvent::Round(
            RoundEvent::SetNextRoundDraft(payload.config.map(round_config)),
        ),
        ClientOperation::EnqueueUpcoming(payload) => {
            ScoreboardEvent::Round(RoundEvent::EnqueueUpcoming(round_config(payload.config)))
        }
        ClientOperation::DequeueUpcoming(payload) => {
            ScoreboardEvent::Round(RoundEvent::DequeueUpcoming(payload.index))
        }
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::normalize,
        config::AppConfig,
        state::{AppState, rounds::GameStatus, scoreboard::TeamKey},
    };

    async fn send(state: &SharedState, room: &Room, frame: &str) -> Result<Applied, OperationError> {
        apply_frame(state, room, frame).await
    }

    #[tokio::test]
    async fn frames_drive_a_full_round() {
        let state = AppState::new(AppConfig::default());
        let room = state.room("default").await;

        send(&state, &room, r#"{"event":"startGame","payload":{}}"#).await.unwrap();
        send(
            &state,
            &room,
            r#"{"event":"startRound","payload":{"config":{"number":42,"type":"comparée","theme":"Le cirque","minPlayers":1,"maxPlayers":3,"timeLimit":120}}}"#,
        )
        .await
        .unwrap();
        let snapshot = room.snapshot().await;
        assert_eq!(snapshot.current_round.as_ref().map(|c| c.number), Some(1));
        assert_eq!(snapshot.game_status, GameStatus::Live);

        send(
            &state,
            &room,
            r#"{"event":"endRound","payload":{"results":{"points":{"team1":3,"team2":1},"notes":"belle impro"}}}"#,
        )
        .await
        .unwrap();
        let snapshot = room.snapshot().await;
        assert!(snapshot.current_round.is_none());
        assert_eq!(snapshot.round_history.len(), 1);
        assert_eq!(snapshot.team1.score, 3);
        assert!(!snapshot.round_history[0].completed_at.is_empty());
        assert_eq!(state.take_dirty_rooms(), vec!["default".to_string()]);
    }

    #[tokio::test]
    async fn invalid_frames_are_ignored_without_touching_state() {
        let state = AppState::new(AppConfig::default());
        let room = state.room("default").await;

        let frames = [
            r#"{"event":"updateScore","payload":{"teamId":"team9","action":1}}"#,
            r#"{"event":"updateScore","payload":{"teamId":"team1","action":0}}"#,
            r#"{"event":"endRound","payload":{"results":{}}}"#,
            r#"{"event":"unknownThing"}"#,
            "garbage",
        ];
        for frame in frames {
            assert!(send(&state, &room, frame).await.is_err(), "{frame} should be ignored");
        }
        assert_eq!(room.snapshot().await.version, 0);
        assert!(state.take_dirty_rooms().is_empty());
    }

    #[tokio::test]
    async fn bad_fields_are_dropped_while_their_siblings_apply() {
        let state = AppState::new(AppConfig::default());
        let room = state.room("default").await;
        let default_size = room.snapshot().await.title_style.size;

        send(
            &state,
            &room,
            r#"{"event":"updateTeam","payload":{"teamId":"team1","updates":{"name":"Blue","color":"red"}}}"#,
        )
        .await
        .unwrap();
        send(
            &state,
            &room,
            r##"{"event":"updateTextStyle","payload":{"target":"title","color":"#00FF00","size":"huge"}}"##,
        )
        .await
        .unwrap();

        let snapshot = room.snapshot().await;
        assert_eq!(snapshot.team1.name, "Blue");
        assert_eq!(snapshot.team1.color, "red");
        assert_eq!(snapshot.title_style.color, "#00FF00");
        assert_eq!(snapshot.title_style.size, default_size);

        let rendered = normalize(&serde_json::to_value(&snapshot).unwrap());
        assert_eq!(rendered.team(TeamKey::Team1).name, "Blue");
        assert_eq!(rendered.team(TeamKey::Team1).color, "#FFFFFF");
    }

    #[tokio::test]
    async fn templates_and_playlists_get_server_ids() {
        let state = AppState::new(AppConfig::default());
        let room = state.room("default").await;

        send(
            &state,
            &room,
            r#"{"event":"saveTemplate","payload":{"name":"Chantée","tags":["musique"],"config":{"type":"chantée","maxPlayers":2}}}"#,
        )
        .await
        .unwrap();
        let template_id = room.snapshot().await.templates[0].id;

        let create = format!(
            r#"{{"event":"createPlaylist","payload":{{"name":"Soirée","templateIds":["{template_id}"]}}}}"#
        );
        send(&state, &room, &create).await.unwrap();
        let playlist_id = room.snapshot().await.playlists[0].id;

        let start = format!(r#"{{"event":"startPlaylist","payload":{{"id":"{playlist_id}"}}}}"#);
        send(&state, &room, &start).await.unwrap();
        let active = room.snapshot().await.active_playlist.unwrap();
        assert_eq!(active.cursor, 0);
        assert_eq!(active.templates[0].name, "Chantée");
    }
}
