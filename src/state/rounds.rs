//! Round lifecycle engine: game status, the round in progress, the match
//! history, reusable templates and playlists.
//!
//! Every transition is a pure function of the current [`RoundState`] and a
//! [`RoundEvent`]. A transition whose precondition does not hold returns a
//! [`Rejection`] and leaves the state untouched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::scoreboard::{Penalties, TeamKey};

/// Overall status of the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    /// The match has not been started; rounds can only be drafted.
    #[default]
    NotStarted,
    /// The match is running and rounds can be played.
    Live,
    /// The match is over; the history is the final record.
    Finished,
}

/// Configuration of a single round.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundConfig {
    /// 1-based position of the round in the match.
    pub number: u32,
    /// Kind of round (e.g. "comparée", "mixte", "chantée").
    #[serde(rename = "type")]
    pub round_type: String,
    /// Optional theme announced to the players.
    pub theme: Option<String>,
    /// Whether both teams play together.
    pub is_mixed: bool,
    /// Minimum number of players per team.
    pub min_players: u32,
    /// Maximum number of players per team.
    pub max_players: u32,
    /// Optional time limit in seconds.
    pub time_limit: Option<u32>,
}

/// Round configuration without a round number, as stored in templates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateConfig {
    /// Kind of round.
    #[serde(rename = "type")]
    pub round_type: String,
    /// Optional theme.
    pub theme: Option<String>,
    /// Whether both teams play together.
    pub is_mixed: bool,
    /// Minimum number of players per team.
    pub min_players: u32,
    /// Maximum number of players per team.
    pub max_players: u32,
    /// Optional time limit in seconds.
    pub time_limit: Option<u32>,
}

impl TemplateConfig {
    /// Attach a round number, producing a playable configuration.
    pub fn numbered(&self, number: u32) -> RoundConfig {
        RoundConfig {
            number,
            round_type: self.round_type.clone(),
            theme: self.theme.clone(),
            is_mixed: self.is_mixed,
            min_players: self.min_players,
            max_players: self.max_players,
            time_limit: self.time_limit,
        }
    }
}

impl From<&RoundConfig> for TemplateConfig {
    fn from(value: &RoundConfig) -> Self {
        Self {
            round_type: value.round_type.clone(),
            theme: value.theme.clone(),
            is_mixed: value.is_mixed,
            min_players: value.min_players,
            max_players: value.max_players,
            time_limit: value.time_limit,
        }
    }
}

/// Points awarded to each team during one round (deltas, not totals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TeamPoints {
    /// Points for the first team.
    pub team1: i32,
    /// Points for the second team.
    pub team2: i32,
}

impl TeamPoints {
    /// Points scored by `team`.
    pub fn get(&self, team: TeamKey) -> i32 {
        match team {
            TeamKey::Team1 => self.team1,
            TeamKey::Team2 => self.team2,
        }
    }
}

/// Penalties handed out to each team during one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TeamPenaltyDeltas {
    /// Penalties for the first team.
    pub team1: Penalties,
    /// Penalties for the second team.
    pub team2: Penalties,
}

/// Immutable record of a finished round.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletedRound {
    /// Configuration the round was played with.
    pub config: RoundConfig,
    /// Points scored during the round.
    pub points: TeamPoints,
    /// Penalties given during the round.
    pub penalties: TeamPenaltyDeltas,
    /// Free-form notes from the referee.
    pub notes: Option<String>,
    /// RFC 3339 timestamp of the moment the round ended.
    pub completed_at: String,
}

/// Outcome of a round as reported by the control panel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoundResults {
    /// Points scored during the round.
    pub points: TeamPoints,
    /// Penalties given during the round.
    pub penalties: TeamPenaltyDeltas,
    /// Free-form notes.
    pub notes: Option<String>,
    /// RFC 3339 timestamp stamped when the results were received.
    pub completed_at: String,
}

/// Reusable, numberless round configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundTemplate {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Free-form tags used for filtering.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Configuration applied when the template is played.
    #[serde(default)]
    pub config: TemplateConfig,
}

/// Partial update of a template; absent fields keep their value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateUpdate {
    /// New name (blank names are rejected).
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New tags.
    pub tags: Option<Vec<String>>,
    /// New configuration.
    pub config: Option<TemplateConfig>,
}

/// Ordered sequence of templates that drives successive rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundPlaylist {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Templates in play order (copied at creation time).
    #[serde(default)]
    pub templates: Vec<RoundTemplate>,
}

/// Request to create a playlist out of existing templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlaylist {
    /// Identifier allocated for the playlist.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Longer description.
    pub description: String,
    /// Templates to copy, in order.
    pub template_ids: Vec<Uuid>,
}

/// Partial update of a playlist; absent fields keep their value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaylistUpdate {
    /// New name (blank names are rejected).
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New template order.
    pub template_ids: Option<Vec<Uuid>>,
}

/// Playlist currently being stepped through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivePlaylist {
    /// Identifier of the source playlist.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Templates in play order.
    pub templates: Vec<RoundTemplate>,
    /// Index of the template the cursor points to.
    pub cursor: usize,
}

impl ActivePlaylist {
    fn start(playlist: &RoundPlaylist) -> Self {
        Self {
            id: playlist.id,
            name: playlist.name.clone(),
            description: playlist.description.clone(),
            templates: playlist.templates.clone(),
            cursor: 0,
        }
    }

    /// Template the cursor points to.
    pub fn current_template(&self) -> Option<&RoundTemplate> {
        self.templates.get(self.cursor)
    }

    /// Template right after the cursor, if any.
    pub fn next_template(&self) -> Option<&RoundTemplate> {
        self.templates.get(self.cursor + 1)
    }

    /// Template right before the cursor, if any.
    pub fn previous_template(&self) -> Option<&RoundTemplate> {
        self.cursor
            .checked_sub(1)
            .and_then(|index| self.templates.get(index))
    }
}

/// Display toggles for round information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundSettings {
    /// Show the round number and type.
    pub show_round_info: bool,
    /// Show the round theme.
    pub show_theme: bool,
    /// Show the allowed player count.
    pub show_player_count: bool,
    /// Show the time limit.
    pub show_time_limit: bool,
    /// Show the list of completed rounds.
    pub show_history: bool,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            show_round_info: true,
            show_theme: true,
            show_player_count: true,
            show_time_limit: true,
            show_history: false,
        }
    }
}

/// Toggle addressed by `updateRoundSetting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundSettingTarget {
    /// [`RoundSettings::show_round_info`].
    RoundInfo,
    /// [`RoundSettings::show_theme`].
    Theme,
    /// [`RoundSettings::show_player_count`].
    PlayerCount,
    /// [`RoundSettings::show_time_limit`].
    TimeLimit,
    /// [`RoundSettings::show_history`].
    History,
}

impl RoundSettings {
    fn set(&mut self, target: RoundSettingTarget, visible: bool) {
        let slot = match target {
            RoundSettingTarget::RoundInfo => &mut self.show_round_info,
            RoundSettingTarget::Theme => &mut self.show_theme,
            RoundSettingTarget::PlayerCount => &mut self.show_player_count,
            RoundSettingTarget::TimeLimit => &mut self.show_time_limit,
            RoundSettingTarget::History => &mut self.show_history,
        };
        *slot = visible;
    }
}

/// Events accepted by the round lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// Move the match from not started to live.
    StartGame,
    /// Close the match.
    FinishGame,
    /// Start a round (or draft it while the match is not started).
    StartRound(RoundConfig),
    /// End the round in progress and record it.
    EndRound(RoundResults),
    /// Store a new template.
    SaveTemplate(RoundTemplate),
    /// Modify an existing template.
    UpdateTemplate {
        /// Template to modify.
        id: Uuid,
        /// Changes to apply.
        updates: TemplateUpdate,
    },
    /// Remove a template.
    DeleteTemplate(Uuid),
    /// Create a playlist from existing templates.
    CreatePlaylist(NewPlaylist),
    /// Modify an existing playlist.
    UpdatePlaylist {
        /// Playlist to modify.
        id: Uuid,
        /// Changes to apply.
        updates: PlaylistUpdate,
    },
    /// Remove a playlist.
    DeletePlaylist(Uuid),
    /// Activate a playlist with its cursor on the first template.
    StartPlaylist(Uuid),
    /// Move the playlist cursor forward.
    NextInPlaylist,
    /// Move the playlist cursor backward.
    PreviousInPlaylist,
    /// Deactivate the playlist.
    StopPlaylist,
    /// Replace (or clear) the preview of the next round.
    SetNextRoundDraft(Option<RoundConfig>),
    /// Append a configuration to the upcoming queue.
    EnqueueUpcoming(RoundConfig),
    /// Remove an entry from the upcoming queue (front when no index is given).
    DequeueUpcoming(Option<usize>),
    /// Flip a display toggle.
    SetSetting {
        /// Toggle to change.
        target: RoundSettingTarget,
        /// New value.
        visible: bool,
    },
}

impl RoundEvent {
    /// Wire-level name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RoundEvent::StartGame => "startGame",
            RoundEvent::FinishGame => "finishGame",
            RoundEvent::StartRound(_) => "startRound",
            RoundEvent::EndRound(_) => "endRound",
            RoundEvent::SaveTemplate(_) => "saveTemplate",
            RoundEvent::UpdateTemplate { .. } => "updateTemplate",
            RoundEvent::DeleteTemplate(_) => "deleteTemplate",
            RoundEvent::CreatePlaylist(_) => "createPlaylist",
            RoundEvent::UpdatePlaylist { .. } => "updatePlaylist",
            RoundEvent::DeletePlaylist(_) => "deletePlaylist",
            RoundEvent::StartPlaylist(_) => "startPlaylist",
            RoundEvent::NextInPlaylist => "nextInPlaylist",
            RoundEvent::PreviousInPlaylist => "previousInPlaylist",
            RoundEvent::StopPlaylist => "stopPlaylist",
            RoundEvent::SetNextRoundDraft(_) => "setNextRoundDraft",
            RoundEvent::EnqueueUpcoming(_) => "enqueueUpcoming",
            RoundEvent::DequeueUpcoming(_) => "dequeueUpcoming",
            RoundEvent::SetSetting { .. } => "updateRoundSetting",
        }
    }
}

/// Returned when an event cannot be applied in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{event} rejected while {status:?}: {reason}")]
pub struct Rejection {
    /// Name of the rejected event.
    pub event: &'static str,
    /// Game status at the time of the rejection.
    pub status: GameStatus,
    /// Precondition that did not hold.
    pub reason: &'static str,
}

/// Round-related part of the scoreboard state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundState {
    /// Round in progress, if any.
    pub current: Option<RoundConfig>,
    /// True whenever no round is in progress.
    pub is_between_rounds: bool,
    /// Status of the match.
    pub game_status: GameStatus,
    /// Completed rounds, oldest first.
    pub history: Vec<CompletedRound>,
    /// Templates keyed by id, in creation order.
    pub templates: IndexMap<Uuid, RoundTemplate>,
    /// Playlists keyed by id, in creation order.
    pub playlists: IndexMap<Uuid, RoundPlaylist>,
    /// Playlist being stepped through.
    pub active_playlist: Option<ActivePlaylist>,
    /// Preview of the next round.
    pub next_round_draft: Option<RoundConfig>,
    /// Queue of upcoming round configurations.
    pub upcoming: Vec<RoundConfig>,
    /// Display toggles.
    pub settings: RoundSettings,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            current: None,
            is_between_rounds: true,
            game_status: GameStatus::NotStarted,
            history: Vec::new(),
            templates: IndexMap::new(),
            playlists: IndexMap::new(),
            active_playlist: None,
            next_round_draft: None,
            upcoming: Vec::new(),
            settings: RoundSettings::default(),
        }
    }
}

impl RoundState {
    /// Number the next started round will receive.
    pub fn next_round_number(&self) -> u32 {
        u32::try_from(self.history.len())
            .unwrap_or(u32::MAX - 1)
            .saturating_add(1)
    }

    /// True when a round is being played.
    pub fn round_in_progress(&self) -> bool {
        self.current.is_some() && !self.is_between_rounds
    }

    /// Sum of the points recorded in the history for `team`.
    pub fn history_total(&self, team: TeamKey) -> i64 {
        self.history
            .iter()
            .map(|round| i64::from(round.points.get(team)))
            .sum()
    }

    /// Apply `event`, returning the next state or the reason it was refused.
    pub fn apply(&self, event: RoundEvent) -> Result<RoundState, Rejection> {
        let mut next = self.clone();
        next.apply_in_place(event)?;
        Ok(next)
    }

    /// Back to a fresh match: history, current round and playlist progress
    /// are cleared; templates, playlists, the upcoming queue and the display
    /// toggles survive.
    pub(crate) fn restart(&mut self) {
        self.current = None;
        self.is_between_rounds = true;
        self.game_status = GameStatus::NotStarted;
        self.history.clear();
        self.active_playlist = None;
        self.next_round_draft = None;
    }

    pub(crate) fn apply_in_place(&mut self, event: RoundEvent) -> Result<(), Rejection> {
        let event_name = event.name();
        let status = self.game_status;
        let reject = move |reason: &'static str| Rejection {
            event: event_name,
            status,
            reason,
        };

        match event {
            RoundEvent::StartGame => {
                if status != GameStatus::NotStarted {
                    return Err(reject("match already started"));
                }
                if !self.is_between_rounds {
                    return Err(reject("a round is in progress"));
                }
                self.game_status = GameStatus::Live;
            }
            RoundEvent::FinishGame => {
                if status != GameStatus::Live {
                    return Err(reject("match is not live"));
                }
                self.game_status = GameStatus::Finished;
                // A round still running when the match closes is abandoned.
                self.current = None;
                self.is_between_rounds = true;
            }
            RoundEvent::StartRound(config) => {
                let numbered = RoundConfig {
                    number: self.next_round_number(),
                    ..config
                };
                match status {
                    GameStatus::NotStarted => {
                        self.next_round_draft = Some(numbered);
                    }
                    GameStatus::Live => {
                        if self.round_in_progress() {
                            return Err(reject("a round is already in progress"));
                        }
                        self.current = Some(numbered);
                        self.is_between_rounds = false;
                        self.next_round_draft = None;
                    }
                    GameStatus::Finished => return Err(reject("match is finished")),
                }
            }
            RoundEvent::EndRound(results) => {
                let Some(config) = self.current.take() else {
                    return Err(reject("no round in progress"));
                };
                self.history.push(CompletedRound {
                    config,
                    points: results.points,
                    penalties: results.penalties,
                    notes: results.notes,
                    completed_at: results.completed_at,
                });
                self.is_between_rounds = true;
            }
            RoundEvent::SaveTemplate(template) => {
                if template.name.trim().is_empty() {
                    return Err(reject("template name is blank"));
                }
                if self.templates.contains_key(&template.id) {
                    return Err(reject("template id already exists"));
                }
                self.templates.insert(template.id, template);
            }
            RoundEvent::UpdateTemplate { id, updates } => {
                if updates.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
                    return Err(reject("template name is blank"));
                }
                let Some(template) = self.templates.get_mut(&id) else {
                    return Err(reject("unknown template"));
                };
                if let Some(name) = updates.name {
                    template.name = name.trim().to_string();
                }
                if let Some(description) = updates.description {
                    template.description = description;
                }
                if let Some(tags) = updates.tags {
                    template.tags = tags;
                }
                if let Some(config) = updates.config {
                    template.config = config;
                }
            }
            RoundEvent::DeleteTemplate(id) => {
                if self.templates.shift_remove(&id).is_none() {
                    return Err(reject("unknown template"));
                }
            }
            RoundEvent::CreatePlaylist(request) => {
                if request.name.trim().is_empty() {
                    return Err(reject("playlist name is blank"));
                }
                if self.playlists.contains_key(&request.id) {
                    return Err(reject("playlist id already exists"));
                }
                let templates = self
                    .resolve_templates(&request.template_ids)
                    .ok_or_else(|| reject("unknown template in playlist"))?;
                self.playlists.insert(
                    request.id,
                    RoundPlaylist {
                        id: request.id,
                        name: request.name.trim().to_string(),
                        description: request.description,
                        templates,
                    },
                );
            }
            RoundEvent::UpdatePlaylist { id, updates } => {
                if updates.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
                    return Err(reject("playlist name is blank"));
                }
                let templates = match &updates.template_ids {
                    Some(ids) => Some(
                        self.resolve_templates(ids)
                            .ok_or_else(|| reject("unknown template in playlist"))?,
                    ),
                    None => None,
                };
                let Some(playlist) = self.playlists.get_mut(&id) else {
                    return Err(reject("unknown playlist"));
                };
                if let Some(name) = updates.name {
                    playlist.name = name.trim().to_string();
                }
                if let Some(description) = updates.description {
                    playlist.description = description;
                }
                if let Some(templates) = templates {
                    playlist.templates = templates;
                }
                let refreshed = playlist.clone();
                if let Some(active) = self.active_playlist.as_mut().filter(|a| a.id == id) {
                    let cursor = active.cursor;
                    *active = ActivePlaylist::start(&refreshed);
                    active.cursor = cursor.min(refreshed.templates.len().saturating_sub(1));
                }
            }
            RoundEvent::DeletePlaylist(id) => {
                if self.playlists.shift_remove(&id).is_none() {
                    return Err(reject("unknown playlist"));
                }
                if self.active_playlist.as_ref().is_some_and(|a| a.id == id) {
                    self.active_playlist = None;
                }
            }
            RoundEvent::StartPlaylist(id) => {
                let Some(playlist) = self.playlists.get(&id) else {
                    return Err(reject("unknown playlist"));
                };
                if playlist.templates.is_empty() {
                    return Err(reject("playlist is empty"));
                }
                self.active_playlist = Some(ActivePlaylist::start(playlist));
            }
            RoundEvent::NextInPlaylist => {
                let Some(active) = self.active_playlist.as_mut() else {
                    return Err(reject("no active playlist"));
                };
                if active.next_template().is_none() {
                    return Err(reject("playlist cursor at the end"));
                }
                active.cursor += 1;
            }
            RoundEvent::PreviousInPlaylist => {
                let Some(active) = self.active_playlist.as_mut() else {
                    return Err(reject("no active playlist"));
                };
                if active.cursor == 0 {
                    return Err(reject("playlist cursor at the start"));
                }
                active.cursor -= 1;
            }
            RoundEvent::StopPlaylist => {
                if self.active_playlist.take().is_none() {
                    return Err(reject("no active playlist"));
                }
            }
            RoundEvent::SetNextRoundDraft(draft) => {
                let number = self.next_round_number();
                self.next_round_draft = draft.map(|config| RoundConfig { number, ..config });
            }
            RoundEvent::EnqueueUpcoming(config) => {
                self.upcoming.push(config);
            }
            RoundEvent::DequeueUpcoming(index) => {
                let index = index.unwrap_or(0);
                if index >= self.upcoming.len() {
                    return Err(reject("upcoming index out of range"));
                }
                self.upcoming.remove(index);
            }
            RoundEvent::SetSetting { target, visible } => {
                self.settings.set(target, visible);
            }
        }

        Ok(())
    }

    fn resolve_templates(&self, ids: &[Uuid]) -> Option<Vec<RoundTemplate>> {
        ids.iter()
            .map(|id| self.templates.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(round_type: &str) -> RoundConfig {
        RoundConfig {
            number: 99,
            round_type: round_type.into(),
            theme: Some("Au musée".into()),
            is_mixed: false,
            min_players: 1,
            max_players: 4,
            time_limit: Some(180),
        }
    }

    fn results(team1: i32, team2: i32) -> RoundResults {
        RoundResults {
            points: TeamPoints { team1, team2 },
            penalties: TeamPenaltyDeltas::default(),
            notes: None,
            completed_at: "2026-01-01T20:00:00Z".into(),
        }
    }

    fn apply(state: &RoundState, event: RoundEvent) -> RoundState {
        state.apply(event).unwrap()
    }

    fn template(name: &str) -> RoundTemplate {
        RoundTemplate {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            tags: vec!["classic".into()],
            config: TemplateConfig::from(&config("comparée")),
        }
    }

    fn live() -> RoundState {
        apply(&RoundState::default(), RoundEvent::StartGame)
    }

    #[test]
    fn initial_state_is_between_rounds_and_not_started() {
        let state = RoundState::default();
        assert_eq!(state.game_status, GameStatus::NotStarted);
        assert!(state.is_between_rounds);
        assert!(state.current.is_none());
    }

    #[test]
    fn full_match_happy_path() {
        let state = live();
        assert_eq!(state.game_status, GameStatus::Live);

        let state = apply(&state, RoundEvent::StartRound(config("comparée")));
        assert!(state.round_in_progress());
        assert_eq!(state.current.as_ref().map(|c| c.number), Some(1));

        let state = apply(&state, RoundEvent::EndRound(results(3, 1)));
        assert!(state.is_between_rounds);
        assert!(state.current.is_none());
        assert_eq!(state.history.len(), 1);

        let state = apply(&state, RoundEvent::StartRound(config("mixte")));
        assert_eq!(state.current.as_ref().map(|c| c.number), Some(2));
        let state = apply(&state, RoundEvent::EndRound(results(2, 0)));

        assert_eq!(state.history_total(TeamKey::Team1), 5);
        assert_eq!(state.history_total(TeamKey::Team2), 1);

        let state = apply(&state, RoundEvent::FinishGame);
        assert_eq!(state.game_status, GameStatus::Finished);
        assert_eq!(state.history.len(), 2);
    }

    #[test]
    fn round_numbers_ignore_the_caller_supplied_number() {
        let state = apply(&live(), RoundEvent::StartRound(config("comparée")));
        assert_eq!(state.current.unwrap().number, 1);
    }

    #[test]
    fn end_round_without_current_round_is_rejected() {
        let state = live();
        let err = state.apply(RoundEvent::EndRound(results(1, 1))).unwrap_err();
        assert_eq!(err.event, "endRound");
        assert_eq!(err.status, GameStatus::Live);
    }

    #[test]
    fn start_round_while_not_started_only_drafts() {
        let state = apply(&RoundState::default(), RoundEvent::StartRound(config("chantée")));
        assert!(state.current.is_none());
        assert!(state.is_between_rounds);
        assert_eq!(
            state.next_round_draft.as_ref().map(|c| c.round_type.as_str()),
            Some("chantée")
        );
    }

    #[test]
    fn start_round_is_rejected_while_a_round_runs() {
        let state = apply(&live(), RoundEvent::StartRound(config("comparée")));
        assert!(state.apply(RoundEvent::StartRound(config("mixte"))).is_err());
    }

    #[test]
    fn finished_match_cannot_go_live_again() {
        let state = apply(&live(), RoundEvent::FinishGame);
        assert!(state.apply(RoundEvent::StartGame).is_err());
        assert!(state.apply(RoundEvent::StartRound(config("mixte"))).is_err());
        assert!(state.apply(RoundEvent::FinishGame).is_err());
    }

    #[test]
    fn finishing_abandons_the_running_round() {
        let state = apply(&live(), RoundEvent::StartRound(config("comparée")));
        let state = apply(&state, RoundEvent::FinishGame);
        assert!(state.current.is_none());
        assert!(state.is_between_rounds);
        assert!(state.history.is_empty());
    }

    #[test]
    fn restart_returns_to_not_started_and_keeps_templates() {
        let t = template("Comparée");
        let state = apply(&live(), RoundEvent::SaveTemplate(t.clone()));
        let state = apply(&state, RoundEvent::StartRound(config("comparée")));
        let state = apply(&state, RoundEvent::EndRound(results(1, 0)));

        let mut restarted = state.clone();
        restarted.restart();
        assert_eq!(restarted.game_status, GameStatus::NotStarted);
        assert!(restarted.history.is_empty());
        assert!(restarted.templates.contains_key(&t.id));
    }

    #[test]
    fn templates_are_created_updated_and_deleted() {
        let t = template("Libre");
        let state = apply(&RoundState::default(), RoundEvent::SaveTemplate(t.clone()));
        assert_eq!(state.templates.len(), 1);

        let state = apply(
            &state,
            RoundEvent::UpdateTemplate {
                id: t.id,
                updates: TemplateUpdate {
                    name: Some("  Libre chantée ".into()),
                    ..TemplateUpdate::default()
                },
            },
        );
        assert_eq!(state.templates[&t.id].name, "Libre chantée");
        assert_eq!(state.templates[&t.id].tags, vec!["classic".to_string()]);

        let blank = state.apply(RoundEvent::UpdateTemplate {
            id: t.id,
            updates: TemplateUpdate {
                name: Some("   ".into()),
                ..TemplateUpdate::default()
            },
        });
        assert!(blank.is_err());

        let state = apply(&state, RoundEvent::DeleteTemplate(t.id));
        assert!(state.templates.is_empty());
        assert!(state.apply(RoundEvent::DeleteTemplate(t.id)).is_err());
    }

    #[test]
    fn blank_template_name_is_rejected() {
        let mut t = template("x");
        t.name = " ".into();
        assert!(RoundState::default().apply(RoundEvent::SaveTemplate(t)).is_err());
    }

    #[test]
    fn playlist_with_unknown_template_is_not_created() {
        let t = template("A");
        let state = apply(&RoundState::default(), RoundEvent::SaveTemplate(t.clone()));
        let result = state.apply(RoundEvent::CreatePlaylist(NewPlaylist {
            id: Uuid::new_v4(),
            name: "Soirée".into(),
            description: String::new(),
            template_ids: vec![t.id, Uuid::new_v4()],
        }));
        assert!(result.is_err());
    }

    #[test]
    fn playlist_cursor_moves_within_bounds() {
        let a = template("A");
        let b = template("B");
        let playlist_id = Uuid::new_v4();
        let mut state = RoundState::default();
        for event in [
            RoundEvent::SaveTemplate(a.clone()),
            RoundEvent::SaveTemplate(b.clone()),
            RoundEvent::CreatePlaylist(NewPlaylist {
                id: playlist_id,
                name: "Soirée".into(),
                description: "deux rounds".into(),
                template_ids: vec![a.id, b.id],
            }),
            RoundEvent::StartPlaylist(playlist_id),
        ] {
            state = apply(&state, event);
        }

        let active = state.active_playlist.clone().unwrap();
        assert_eq!(active.cursor, 0);
        assert_eq!(active.current_template().map(|t| t.id), Some(a.id));
        assert!(state.apply(RoundEvent::PreviousInPlaylist).is_err());

        let state = apply(&state, RoundEvent::NextInPlaylist);
        let active = state.active_playlist.clone().unwrap();
        assert_eq!(active.current_template().map(|t| t.id), Some(b.id));
        assert!(state.apply(RoundEvent::NextInPlaylist).is_err());

        let state = apply(&state, RoundEvent::PreviousInPlaylist);
        assert_eq!(state.active_playlist.as_ref().unwrap().cursor, 0);

        let state = apply(&state, RoundEvent::StopPlaylist);
        assert!(state.active_playlist.is_none());
        assert!(state.apply(RoundEvent::StopPlaylist).is_err());
    }

    #[test]
    fn deleting_the_active_playlist_deactivates_it() {
        let a = template("A");
        let playlist_id = Uuid::new_v4();
        let mut state = RoundState::default();
        for event in [
            RoundEvent::SaveTemplate(a.clone()),
            RoundEvent::CreatePlaylist(NewPlaylist {
                id: playlist_id,
                name: "Solo".into(),
                description: String::new(),
                template_ids: vec![a.id],
            }),
            RoundEvent::StartPlaylist(playlist_id),
            RoundEvent::DeletePlaylist(playlist_id),
        ] {
            state = apply(&state, event);
        }
        assert!(state.active_playlist.is_none());
        assert!(state.playlists.is_empty());
    }

    #[test]
    fn empty_playlist_cannot_start() {
        let playlist_id = Uuid::new_v4();
        let state = apply(
            &RoundState::default(),
            RoundEvent::CreatePlaylist(NewPlaylist {
                id: playlist_id,
                name: "Vide".into(),
                description: String::new(),
                template_ids: Vec::new(),
            }),
        );
        assert!(state.apply(RoundEvent::StartPlaylist(playlist_id)).is_err());
    }

    #[test]
    fn upcoming_queue_and_draft_do_not_touch_current() {
        let state = apply(&live(), RoundEvent::EnqueueUpcoming(config("A")));
        let state = apply(&state, RoundEvent::EnqueueUpcoming(config("B")));
        let state = apply(&state, RoundEvent::SetNextRoundDraft(Some(config("C"))));
        assert!(state.current.is_none());
        assert_eq!(state.next_round_draft.as_ref().map(|c| c.number), Some(1));

        let state = apply(&state, RoundEvent::DequeueUpcoming(None));
        assert_eq!(state.upcoming.len(), 1);
        assert_eq!(state.upcoming[0].round_type, "B");
        assert!(state.apply(RoundEvent::DequeueUpcoming(Some(4))).is_err());

        let state = apply(&state, RoundEvent::SetNextRoundDraft(None));
        assert!(state.next_round_draft.is_none());
    }

    #[test]
    fn settings_toggle_independently() {
        let state = apply(
            &RoundState::default(),
            RoundEvent::SetSetting {
                target: RoundSettingTarget::History,
                visible: true,
            },
        );
        assert!(state.settings.show_history);
        assert!(state.settings.show_theme);
    }
}
