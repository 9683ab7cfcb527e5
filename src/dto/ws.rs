//! Event-channel messages exchanged over the `/ws` socket.
//!
//! Every frame is a JSON object `{"event": <name>, "payload": <json>}`. Clients send
//! [`ClientOperation`]s; the server only ever answers with `updateState` carrying the
//! full snapshot of the room.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnError, serde_as, skip_serializing_none};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    state::{
        rounds::{RoundSettingTarget, TeamPenaltyDeltas, TeamPoints},
        scoreboard::{PenaltyKind, ScoringMode, TeamKey, TextTarget, VisibilityTarget},
    },
};

/// Name of the only event the server emits.
pub const EVENT_UPDATE_STATE: &str = "updateState";

/// Raw frame as it travels on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    /// Event name.
    pub event: String,
    /// Event payload; absent payloads decode as `null`.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

impl EventEnvelope {
    /// Parse a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, OperationDecodeError> {
        serde_json::from_str(text).map_err(OperationDecodeError::Envelope)
    }
}

/// Pre-serialized server frame shared by every subscriber of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    /// Event name, kept for logging.
    pub event: &'static str,
    /// Room version the frame describes.
    pub version: u64,
    /// Complete frame text.
    pub frame: Arc<str>,
}

impl ServerEvent {
    /// Serialize `payload` once into a frame for `event`.
    pub fn json<T>(event: &'static str, version: u64, payload: &T) -> Result<Self, serde_json::Error>
    where
        T: ?Sized + Serialize,
    {
        #[derive(Serialize)]
        struct Frame<'a, T: ?Sized> {
            event: &'a str,
            payload: &'a T,
        }

        let text = serde_json::to_string(&Frame { event, payload })?;
        Ok(Self {
            event,
            version,
            frame: Arc::from(text),
        })
    }
}

/// Failures while turning a text frame into a [`ClientOperation`].
#[derive(Debug, Error)]
pub enum OperationDecodeError {
    /// The frame is not a JSON envelope.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    /// The event name is unknown or the payload does not match it.
    #[error("invalid `{event}` payload: {source}")]
    Payload {
        /// Event name carried by the envelope.
        event: String,
        /// Underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Empty payload (`{}`); extra fields are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Operations a client can request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ClientOperation {
    /// Rename or recolor a team.
    UpdateTeam(UpdateTeamPayload),
    /// Move a score by one point in the direction of `action`.
    UpdateScore(UpdateScorePayload),
    /// Add a penalty.
    UpdatePenalty(UpdatePenaltyPayload),
    /// Clear a team's penalties.
    ResetPenalties(TeamPayload),
    /// Restart the match.
    ResetAll(Empty),
    /// Replace (string) or clear (`null`) the logo.
    UpdateLogo(Option<String>),
    /// Change the logo height.
    UpdateLogoSize(LogoSizePayload),
    /// Replace the title or footer text.
    UpdateText(UpdateTextPayload),
    /// Change the title or footer style.
    UpdateTextStyle(UpdateTextStylePayload),
    /// Show or hide scores, penalties or emojis.
    UpdateVisibility(UpdateVisibilityPayload),
    /// Show or hide a round information block.
    UpdateRoundSetting(UpdateRoundSettingPayload),
    /// Swap emojis between teams.
    SwitchTeamEmojis(Empty),
    /// Set or clear one team's emoji.
    UpdateTeamEmoji(UpdateTeamEmojiPayload),
    /// Switch between round-driven and manual scoring.
    UpdateScoringMode(ScoringModePayload),
    /// Open the match.
    StartGame(Empty),
    /// Close the match.
    FinishGame(Empty),
    /// Start a round.
    StartRound(StartRoundPayload),
    /// End the current round.
    EndRound(EndRoundPayload),
    /// Store a template.
    SaveTemplate(SaveTemplatePayload),
    /// Edit a template.
    UpdateTemplate(UpdateTemplatePayload),
    /// Remove a template.
    DeleteTemplate(IdPayload),
    /// Create a playlist.
    CreatePlaylist(CreatePlaylistPayload),
    /// Edit a playlist.
    UpdatePlaylist(UpdatePlaylistPayload),
    /// Remove a playlist.
    DeletePlaylist(IdPayload),
    /// Activate a playlist.
    StartPlaylist(IdPayload),
    /// Move the playlist cursor forward.
    NextInPlaylist(Empty),
    /// Move the playlist cursor backward.
    PreviousInPlaylist(Empty),
    /// Deactivate the playlist.
    StopPlaylist(Empty),
    /// Replace or clear the next-round preview.
    SetNextRoundDraft(NextRoundDraftPayload),
    /// Queue an upcoming round.
    EnqueueUpcoming(RoundConfigPayload),
    /// Drop an upcoming round.
    DequeueUpcoming(DequeuePayload),
}

impl ClientOperation {
    /// Decode an envelope into a typed operation.
    ///
    /// A missing or `null` payload stands for `{}`, except for `updateLogo` where `null`
    /// clears the logo.
    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self, OperationDecodeError> {
        let EventEnvelope { event, payload } = envelope;
        let payload = match payload {
            Value::Null if event != "updateLogo" => Value::Object(Default::default()),
            other => other,
        };
        let tagged = serde_json::json!({ "event": event, "payload": payload });
        serde_json::from_value(tagged).map_err(|source| OperationDecodeError::Payload {
            event,
            source,
        })
    }

    /// Split the operation into its event name and JSON payload.
    pub fn into_envelope(self) -> Result<EventEnvelope, serde_json::Error> {
        serde_json::to_value(&self).and_then(serde_json::from_value)
    }

    /// Run the payload's field validation.
    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            ClientOperation::UpdateText(payload) => payload.validate(),
            ClientOperation::StartRound(payload) => payload.validate(),
            ClientOperation::EndRound(payload) => payload.validate(),
            ClientOperation::SaveTemplate(payload) => payload.validate(),
            ClientOperation::CreatePlaylist(payload) => payload.validate(),
            ClientOperation::SetNextRoundDraft(payload) => payload.validate(),
            ClientOperation::EnqueueUpcoming(payload) => payload.validate(),
            ClientOperation::UpdateTeamEmoji(payload) => payload.validate(),
            _ => Ok(()),
        }
    }
}

/// `{teamId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPayload {
    /// Targeted team.
    pub team_id: TeamKey,
}

/// `{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdPayload {
    /// Targeted template or playlist.
    pub id: Uuid,
}

/// Longest team name kept by `updateTeam`.
pub const MAX_TEAM_NAME_LEN: usize = 60;
/// Text style sizes kept by `updateTextStyle`.
pub const TEXT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 1..=400;
/// Longest template or playlist name kept by partial updates.
pub const MAX_COLLECTION_NAME_LEN: usize = 80;
/// Longest template or playlist description kept by partial updates.
pub const MAX_DESCRIPTION_LEN: usize = 500;

fn within_chars(value: &str, max: usize) -> bool {
    value.chars().count() <= max
}

/// Payload of `updateTeam`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamPayload {
    /// Targeted team.
    pub team_id: TeamKey,
    /// Fields to change.
    #[serde(default)]
    pub updates: TeamUpdates,
}

/// Fields `updateTeam` may change.
///
/// Each field stands alone: one that fails to decode or is out of bounds is dropped
/// and the others still apply. Colors are stored as given; displays fall back to
/// white when they are not hex.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamUpdates {
    /// New name.
    #[serde_as(as = "DefaultOnError")]
    pub name: Option<String>,
    /// New color.
    #[serde_as(as = "DefaultOnError")]
    pub color: Option<String>,
}

impl TeamUpdates {
    /// Drop the fields that break their bounds.
    pub fn retain_valid(self) -> Self {
        Self {
            name: self.name.filter(|name| within_chars(name, MAX_TEAM_NAME_LEN)),
            color: self.color,
        }
    }
}

/// Payload of `updateScore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScorePayload {
    /// Targeted team.
    pub team_id: TeamKey,
    /// Only the sign matters: positive adds a point, negative removes one.
    pub action: i64,
}

/// Payload of `updatePenalty`.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePenaltyPayload {
    /// Targeted team.
    pub team_id: TeamKey,
    /// Counter to increment.
    #[serde(rename = "type")]
    pub kind: PenaltyKind,
    /// Must be positive when present.
    #[serde(default)]
    pub action: Option<i64>,
}

/// Payload of `updateLogoSize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoSizePayload {
    /// New height in pixels.
    pub size: u32,
}

/// Payload of `updateText`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateTextPayload {
    /// Block to change.
    pub field: TextTarget,
    /// New content.
    #[validate(length(max = 200))]
    pub text: String,
}

/// Payload of `updateTextStyle`. `color` and `size` are independent of each other.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTextStylePayload {
    /// Block to change.
    pub target: TextTarget,
    /// New color, stored as given.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub color: Option<String>,
    /// New size.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub size: Option<u32>,
}

impl UpdateTextStylePayload {
    /// Drop a size outside [`TEXT_SIZE_RANGE`].
    pub fn retain_valid(self) -> Self {
        Self {
            size: self.size.filter(|size| TEXT_SIZE_RANGE.contains(size)),
            ..self
        }
    }
}

/// Payload of `updateVisibility`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateVisibilityPayload {
    /// Element to toggle.
    pub target: VisibilityTarget,
    /// New value.
    pub visible: bool,
}

/// Payload of `updateRoundSetting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRoundSettingPayload {
    /// Toggle to change.
    pub target: RoundSettingTarget,
    /// New value.
    pub visible: bool,
}

/// Payload of `updateTeamEmoji`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamEmojiPayload {
    /// Targeted team.
    pub team_id: TeamKey,
    /// New emoji, `null` to clear.
    #[serde(default)]
    #[validate(length(max = 16))]
    pub emoji: Option<String>,
}

/// Payload of `updateScoringMode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringModePayload {
    /// New mode.
    pub mode: ScoringMode,
}

fn default_min_players() -> u32 {
    1
}

fn default_max_players() -> u32 {
    4
}

/// Round configuration as sent by the control panel.
///
/// `number` is accepted for compatibility but the server numbers rounds itself.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_player_bounds"))]
pub struct RoundConfigInput {
    /// Ignored by the server.
    #[serde(default)]
    pub number: Option<u32>,
    /// Kind of round.
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 80))]
    pub round_type: String,
    /// Optional theme.
    #[serde(default)]
    #[validate(length(max = 200))]
    pub theme: Option<String>,
    /// Whether both teams play together.
    #[serde(default)]
    pub is_mixed: bool,
    /// Minimum players per team.
    #[serde(default = "default_min_players")]
    #[validate(range(max = 30))]
    pub min_players: u32,
    /// Maximum players per team.
    #[serde(default = "default_max_players")]
    #[validate(range(min = 1, max = 30))]
    pub max_players: u32,
    /// Optional time limit in seconds.
    #[serde(default)]
    #[validate(range(min = 1, max = 7200))]
    pub time_limit: Option<u32>,
}

fn validate_player_bounds(config: &RoundConfigInput) -> Result<(), ValidationError> {
    if config.min_players > config.max_players {
        let mut err = ValidationError::new("player_bounds");
        err.message = Some(
            format!(
                "minPlayers ({}) cannot exceed maxPlayers ({})",
                config.min_players, config.max_players
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// `{config}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoundConfigPayload {
    /// Round configuration.
    #[validate(nested)]
    pub config: RoundConfigInput,
}

/// Payload of `startRound`.
pub type StartRoundPayload = RoundConfigPayload;

/// Payload of `setNextRoundDraft`; a `null` config clears the draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NextRoundDraftPayload {
    /// Draft configuration.
    #[serde(default)]
    #[validate(nested)]
    pub config: Option<RoundConfigInput>,
}

/// Payload of `endRound`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EndRoundPayload {
    /// Outcome of the round.
    #[validate(nested)]
    pub results: RoundResultsInput,
}

/// Outcome of a round as sent by the control panel.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RoundResultsInput {
    /// Points per team for this round.
    pub points: TeamPoints,
    /// Penalties per team for this round.
    pub penalties: TeamPenaltyDeltas,
    /// Referee notes.
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Payload of `saveTemplate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SaveTemplatePayload {
    /// Display name.
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    /// Description.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Configuration; its `number` is dropped.
    #[validate(nested)]
    pub config: RoundConfigInput,
}

/// Payload of `updateTemplate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTemplatePayload {
    /// Template to edit.
    pub id: Uuid,
    /// Fields to change.
    #[serde(default)]
    pub updates: TemplateUpdates,
}

/// Fields `updateTemplate` may change; a malformed field is dropped on its own.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateUpdates {
    /// New name.
    #[serde_as(as = "DefaultOnError")]
    pub name: Option<String>,
    /// New description.
    #[serde_as(as = "DefaultOnError")]
    pub description: Option<String>,
    /// New tags.
    #[serde_as(as = "DefaultOnError")]
    pub tags: Option<Vec<String>>,
    /// New configuration.
    #[serde_as(as = "DefaultOnError")]
    pub config: Option<RoundConfigInput>,
}

impl TemplateUpdates {
    /// Drop the fields that break their bounds.
    pub fn retain_valid(self) -> Self {
        Self {
            name: self
                .name
                .filter(|name| !name.trim().is_empty() && within_chars(name, MAX_COLLECTION_NAME_LEN)),
            description: self
                .description
                .filter(|description| within_chars(description, MAX_DESCRIPTION_LEN)),
            tags: self.tags,
            config: self.config.filter(|config| config.validate().is_ok()),
        }
    }
}

/// Payload of `createPlaylist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaylistPayload {
    /// Display name.
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    /// Description.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    /// Templates to copy, in order.
    #[serde(default)]
    pub template_ids: Vec<Uuid>,
}

/// Payload of `updatePlaylist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlaylistPayload {
    /// Playlist to edit.
    pub id: Uuid,
    /// Fields to change.
    #[serde(default)]
    pub updates: PlaylistUpdates,
}

/// Fields `updatePlaylist` may change; a malformed field is dropped on its own.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaylistUpdates {
    /// New name.
    #[serde_as(as = "DefaultOnError")]
    pub name: Option<String>,
    /// New description.
    #[serde_as(as = "DefaultOnError")]
    pub description: Option<String>,
    /// New template order.
    #[serde_as(as = "DefaultOnError")]
    pub template_ids: Option<Vec<Uuid>>,
}

impl PlaylistUpdates {
    /// Drop the fields that break their bounds.
    pub fn retain_valid(self) -> Self {
        Self {
            name: self
                .name
                .filter(|name| !name.trim().is_empty() && within_chars(name, MAX_COLLECTION_NAME_LEN)),
            description: self
                .description
                .filter(|description| within_chars(description, MAX_DESCRIPTION_LEN)),
            template_ids: self.template_ids,
        }
    }
}

/// Payload of `dequeueUpcoming`; the front entry is removed when `index` is absent.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DequeuePayload {
    /// Position to remove.
    pub index: Option<usize>,
}
