use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{
    rounds::{
        ActivePlaylist, CompletedRound, GameStatus, RoundConfig, RoundPlaylist, RoundSettings,
        RoundTemplate,
    },
    scoreboard::{ScoreboardState, ScoringMode, Team, TextStyle},
};

/// Full room snapshot as broadcast in `updateState` and served by `GET /rooms/{room}/state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardSnapshot {
    /// Room the snapshot belongs to.
    pub room: String,
    /// Incremented on every accepted mutation.
    pub version: u64,
    /// First team.
    pub team1: Team,
    /// Second team.
    pub team2: Team,
    /// Header text.
    pub title_text: String,
    /// Footer text.
    pub footer_text: String,
    /// Header style.
    pub title_style: TextStyle,
    /// Footer style.
    pub footer_style: TextStyle,
    /// Whether scores are displayed.
    pub show_score: bool,
    /// Whether penalties are displayed.
    pub show_penalties: bool,
    /// Whether emojis are displayed.
    pub show_emojis: bool,
    /// Logo (data URL or URL).
    pub logo: Option<String>,
    /// Logo height in pixels.
    pub logo_size: u32,
    /// How scores are maintained.
    pub scoring_mode: ScoringMode,
    /// Round being played.
    pub current_round: Option<RoundConfig>,
    /// Completed rounds, oldest first.
    pub round_history: Vec<CompletedRound>,
    /// True when no round is in progress.
    pub is_between_rounds: bool,
    /// Match status.
    pub game_status: GameStatus,
    /// Saved templates in creation order.
    pub templates: Vec<RoundTemplate>,
    /// Saved playlists in creation order.
    pub playlists: Vec<RoundPlaylist>,
    /// Playlist being stepped through.
    pub active_playlist: Option<ActivePlaylist>,
    /// Preview of the next round.
    pub next_round_draft: Option<RoundConfig>,
    /// Queued round configurations.
    pub upcoming_rounds: Vec<RoundConfig>,
    /// Round display toggles.
    pub round_settings: RoundSettings,
}

impl ScoreboardSnapshot {
    /// Flatten a room state into its wire representation.
    pub fn from_state(room: &str, version: u64, state: &ScoreboardState) -> Self {
        let rounds = &state.rounds;
        Self {
            room: room.to_string(),
            version,
            team1: state.team1.clone(),
            team2: state.team2.clone(),
            title_text: state.title_text.clone(),
            footer_text: state.footer_text.clone(),
            title_style: state.title_style.clone(),
            footer_style: state.footer_style.clone(),
            show_score: state.show_score,
            show_penalties: state.show_penalties,
            show_emojis: state.show_emojis,
            logo: state.logo.clone(),
            logo_size: state.logo_size,
            scoring_mode: state.scoring_mode,
            current_round: rounds.current.clone(),
            round_history: rounds.history.clone(),
            is_between_rounds: rounds.is_between_rounds,
            game_status: rounds.game_status,
            templates: rounds.templates.values().cloned().collect(),
            playlists: rounds.playlists.values().cloned().collect(),
            active_playlist: rounds.active_playlist.clone(),
            next_round_draft: rounds.next_round_draft.clone(),
            upcoming_rounds: rounds.upcoming.clone(),
            round_settings: rounds.settings,
        }
    }
}

/// Rooms known to the server, in memory or in the snapshot store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RoomListResponse {
    /// Sorted, de-duplicated room identifiers.
    pub rooms: Vec<String>,
    /// False when the snapshot store could not be queried and only in-memory rooms are listed.
    pub complete: bool,
}
