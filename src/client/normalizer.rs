//! Turns an inbound `updateState` payload into the client's canonical state.
//!
//! The payload may come in the flat wire layout (`currentRound`, `roundHistory`, ...)
//! or with the round fields nested under `rounds`, and any field may be missing or
//! malformed. Every field falls back to a safe default instead of failing the whole
//! snapshot. Team totals are derived from the round history, which is the source of
//! truth for cumulative scores.

use serde::Deserialize;
use serde_json::Value;
use serde_with::{DefaultOnError, VecSkipError, serde_as};
use tracing::warn;

use crate::{
    config::ScoreboardDefaults,
    state::{
        rounds::{
            ActivePlaylist, CompletedRound, GameStatus, RoundConfig, RoundPlaylist, RoundSettings,
            RoundState, RoundTemplate,
        },
        scoreboard::{
            Penalties, ScoreboardState, ScoringMode, Team, TeamKey, TextStyle,
            valid_color_or_default,
        },
    },
};

/// Client-side view of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalState {
    /// Room the snapshot came from, when the server said so.
    pub room: Option<String>,
    /// Server version of the snapshot; 0 when absent.
    pub version: u64,
    /// Normalized scoreboard with rounds nested under `rounds`.
    pub scoreboard: ScoreboardState,
}

impl CanonicalState {
    /// Team by key.
    pub fn team(&self, key: TeamKey) -> &Team {
        self.scoreboard.team(key)
    }

    /// Round lifecycle part of the state.
    pub fn rounds(&self) -> &RoundState {
        &self.scoreboard.rounds
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTeam {
    #[serde_as(as = "DefaultOnError")]
    name: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    color: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    score: Option<i64>,
    #[serde_as(as = "DefaultOnError")]
    penalties: Option<Penalties>,
    #[serde_as(as = "DefaultOnError")]
    emoji: Option<String>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTextStyle {
    #[serde_as(as = "DefaultOnError")]
    color: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    size: Option<u32>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRounds {
    #[serde_as(as = "DefaultOnError")]
    current: Option<RoundConfig>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    history: Option<Vec<CompletedRound>>,
    #[serde_as(as = "DefaultOnError")]
    game_status: Option<GameStatus>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    templates: Option<Vec<RoundTemplate>>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    playlists: Option<Vec<RoundPlaylist>>,
    #[serde_as(as = "DefaultOnError")]
    active_playlist: Option<ActivePlaylist>,
    #[serde_as(as = "DefaultOnError")]
    next_round_draft: Option<RoundConfig>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    upcoming: Option<Vec<RoundConfig>>,
    #[serde_as(as = "DefaultOnError")]
    settings: Option<RoundSettings>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSnapshot {
    #[serde_as(as = "DefaultOnError")]
    room: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    version: Option<u64>,
    #[serde_as(as = "DefaultOnError")]
    team1: Option<RawTeam>,
    #[serde_as(as = "DefaultOnError")]
    team2: Option<RawTeam>,
    #[serde_as(as = "DefaultOnError")]
    title_text: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    footer_text: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    title_style: Option<RawTextStyle>,
    #[serde_as(as = "DefaultOnError")]
    footer_style: Option<RawTextStyle>,
    #[serde_as(as = "DefaultOnError")]
    show_score: Option<bool>,
    #[serde_as(as = "DefaultOnError")]
    show_penalties: Option<bool>,
    #[serde_as(as = "DefaultOnError")]
    show_emojis: Option<bool>,
    #[serde_as(as = "DefaultOnError")]
    logo: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    logo_size: Option<u32>,
    #[serde_as(as = "DefaultOnError")]
    scoring_mode: Option<ScoringMode>,
    #[serde_as(as = "DefaultOnError")]
    current_round: Option<RoundConfig>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    round_history: Option<Vec<CompletedRound>>,
    #[serde_as(as = "DefaultOnError")]
    game_status: Option<GameStatus>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    templates: Option<Vec<RoundTemplate>>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    playlists: Option<Vec<RoundPlaylist>>,
    #[serde_as(as = "DefaultOnError")]
    active_playlist: Option<ActivePlaylist>,
    #[serde_as(as = "DefaultOnError")]
    next_round_draft: Option<RoundConfig>,
    #[serde_as(as = "DefaultOnError<Option<VecSkipError<_>>>")]
    upcoming_rounds: Option<Vec<RoundConfig>>,
    #[serde_as(as = "DefaultOnError")]
    round_settings: Option<RoundSettings>,
    #[serde_as(as = "DefaultOnError")]
    rounds: Option<RawRounds>,
}

/// Normalize with the built-in scoreboard defaults.
pub fn normalize(payload: &Value) -> CanonicalState {
    normalize_with(&ScoreboardDefaults::default(), payload)
}

/// Normalize `payload`, filling gaps from `defaults`.
pub fn normalize_with(defaults: &ScoreboardDefaults, payload: &Value) -> CanonicalState {
    let raw = match RawSnapshot::deserialize(payload) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "snapshot is not an object; using defaults");
            RawSnapshot::default()
        }
    };

    let base = ScoreboardState::new(defaults);
    let nested = raw.rounds.unwrap_or_default();

    let current = raw.current_round.or(nested.current);
    let rounds = RoundState {
        is_between_rounds: current.is_none(),
        current,
        game_status: raw.game_status.or(nested.game_status).unwrap_or_default(),
        history: raw.round_history.or(nested.history).unwrap_or_default(),
        templates: raw
            .templates
            .or(nested.templates)
            .unwrap_or_default()
            .into_iter()
            .map(|template| (template.id, template))
            .collect(),
        playlists: raw
            .playlists
            .or(nested.playlists)
            .unwrap_or_default()
            .into_iter()
            .map(|playlist| (playlist.id, playlist))
            .collect(),
        active_playlist: raw.active_playlist.or(nested.active_playlist),
        next_round_draft: raw.next_round_draft.or(nested.next_round_draft),
        upcoming: raw.upcoming_rounds.or(nested.upcoming).unwrap_or_default(),
        settings: raw.round_settings.or(nested.settings).unwrap_or_default(),
    };

    let mut scoreboard = ScoreboardState {
        team1: team(base.team1, raw.team1),
        team2: team(base.team2, raw.team2),
        title_text: raw.title_text.unwrap_or(base.title_text),
        footer_text: raw.footer_text.unwrap_or(base.footer_text),
        title_style: text_style(base.title_style, raw.title_style),
        footer_style: text_style(base.footer_style, raw.footer_style),
        show_score: raw.show_score.unwrap_or(base.show_score),
        show_penalties: raw.show_penalties.unwrap_or(base.show_penalties),
        show_emojis: raw.show_emojis.unwrap_or(base.show_emojis),
        logo: raw.logo.filter(|logo| !logo.is_empty()),
        logo_size: raw.logo_size.unwrap_or(base.logo_size),
        scoring_mode: raw.scoring_mode.unwrap_or_default(),
        rounds,
    };

    // History wins over the received totals whenever scores follow rounds.
    scoreboard.sync_scores_with_history();

    CanonicalState {
        room: raw.room,
        version: raw.version.unwrap_or_default(),
        scoreboard,
    }
}

fn team(base: Team, raw: Option<RawTeam>) -> Team {
    let raw = raw.unwrap_or_default();
    let color = raw
        .color
        .map(|color| valid_color_or_default(&color).to_string())
        .unwrap_or(base.color);
    Team {
        id: base.id,
        name: raw
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(base.name),
        color,
        score: raw
            .score
            .map(|score| u32::try_from(score.max(0)).unwrap_or(u32::MAX))
            .unwrap_or_default(),
        penalties: raw.penalties.unwrap_or_default(),
        emoji: raw.emoji.filter(|emoji| !emoji.is_empty()),
    }
}

fn text_style(base: TextStyle, raw: Option<RawTextStyle>) -> TextStyle {
    let raw = raw.unwrap_or_default();
    TextStyle {
        color: raw
            .color
            .map(|color| valid_color_or_default(&color).to_string())
            .unwrap_or(base.color),
        size: raw.size.filter(|size| *size > 0).unwrap_or(base.size),
    }
}
