//! Authoritative scoreboard state and its pure mutation function.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    config::ScoreboardDefaults,
    dto::validation::is_hex_color,
    state::rounds::{Rejection, RoundEvent, RoundState},
};

/// Color used whenever a stored color cannot be rendered.
pub const FALLBACK_COLOR: &str = "#FFFFFF";

/// Identifier of one of the two teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum TeamKey {
    /// Left-hand team.
    Team1,
    /// Right-hand team.
    Team2,
}

impl TeamKey {
    /// Wire name of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamKey::Team1 => "team1",
            TeamKey::Team2 => "team2",
        }
    }
}

/// Penalty counters of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Penalties {
    /// Major fouls.
    pub major: u32,
    /// Minor fouls.
    pub minor: u32,
}

/// Kind of penalty addressed by `updatePenalty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PenaltyKind {
    /// [`Penalties::major`].
    Major,
    /// [`Penalties::minor`].
    Minor,
}

/// One team on the scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Fixed key of the team.
    pub id: TeamKey,
    /// Display name.
    pub name: String,
    /// Color as set by the control panel; displays render non-hex values as white.
    pub color: String,
    /// Current score, never negative.
    #[serde(default)]
    pub score: u32,
    /// Penalty counters.
    #[serde(default)]
    pub penalties: Penalties,
    /// Optional emoji shown next to the name.
    #[serde(default)]
    pub emoji: Option<String>,
}

/// Color and size of a text block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TextStyle {
    /// Hex color.
    pub color: String,
    /// Font size in pixels.
    pub size: u32,
}

/// Text block addressed by `updateText` and `updateTextStyle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextTarget {
    /// Header line.
    Title,
    /// Footer line.
    Footer,
}

/// Element toggled by `updateVisibility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisibilityTarget {
    /// Team scores.
    Score,
    /// Penalty counters.
    Penalties,
    /// Team emojis.
    Emojis,
}

/// How team scores are maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ScoringMode {
    /// Scores follow the sum of the round history.
    #[default]
    Round,
    /// Scores are only changed by explicit adjustments.
    Manual,
}

/// Direction of a score adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreStep {
    /// Add one point.
    Increment,
    /// Remove one point, never going below zero.
    Decrement,
}

impl ScoreStep {
    /// Normalize a signed action into a step; zero means nothing to do.
    pub fn from_action(action: i64) -> Option<Self> {
        match action.signum() {
            1 => Some(ScoreStep::Increment),
            -1 => Some(ScoreStep::Decrement),
            _ => None,
        }
    }
}

/// Complete state of one scoreboard room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardState {
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
    /// Logo as a data URL or a plain URL.
    #[serde(default)]
    pub logo: Option<String>,
    /// Logo height in pixels.
    pub logo_size: u32,
    /// How scores are maintained.
    #[serde(default)]
    pub scoring_mode: ScoringMode,
    /// Round lifecycle.
    #[serde(default)]
    pub rounds: RoundState,
}

/// Mutations accepted by the scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreboardEvent {
    /// Rename or recolor a team.
    UpdateTeam {
        /// Team to change.
        team: TeamKey,
        /// New name; blank names are ignored.
        name: Option<String>,
        /// New color.
        color: Option<String>,
    },
    /// Set or clear a team emoji.
    SetTeamEmoji {
        /// Team to change.
        team: TeamKey,
        /// New emoji.
        emoji: Option<String>,
    },
    /// Move a score by one point. Refused in [`ScoringMode::Round`].
    AdjustScore {
        /// Team to change.
        team: TeamKey,
        /// Direction.
        step: ScoreStep,
    },
    /// Add one penalty.
    AddPenalty {
        /// Team to change.
        team: TeamKey,
        /// Counter to increment.
        kind: PenaltyKind,
    },
    /// Zero both penalty counters of a team.
    ResetPenalties(TeamKey),
    /// Restart the match, keeping team identities.
    ResetAll,
    /// Replace or clear the logo.
    SetLogo(Option<String>),
    /// Change the logo height.
    SetLogoSize(u32),
    /// Replace a text block.
    SetText {
        /// Block to change.
        target: TextTarget,
        /// New content.
        text: String,
    },
    /// Change the style of a text block; absent fields are kept.
    SetTextStyle {
        /// Block to change.
        target: TextTarget,
        /// New color.
        color: Option<String>,
        /// New size.
        size: Option<u32>,
    },
    /// Show or hide an element.
    SetVisibility {
        /// Element to toggle.
        target: VisibilityTarget,
        /// New value.
        visible: bool,
    },
    /// Swap emojis between the two teams.
    SwitchTeamEmojis,
    /// Change the scoring mode.
    SetScoringMode(ScoringMode),
    /// Round lifecycle event.
    Round(RoundEvent),
}

impl ScoreboardEvent {
    /// Wire-level name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ScoreboardEvent::UpdateTeam { .. } => "updateTeam",
            ScoreboardEvent::SetTeamEmoji { .. } => "updateTeamEmoji",
            ScoreboardEvent::AdjustScore { .. } => "updateScore",
            ScoreboardEvent::AddPenalty { .. } => "updatePenalty",
            ScoreboardEvent::ResetPenalties(_) => "resetPenalties",
            ScoreboardEvent::ResetAll => "resetAll",
            ScoreboardEvent::SetLogo(_) => "updateLogo",
            ScoreboardEvent::SetLogoSize(_) => "updateLogoSize",
            ScoreboardEvent::SetText { .. } => "updateText",
            ScoreboardEvent::SetTextStyle { .. } => "updateTextStyle",
            ScoreboardEvent::SetVisibility { .. } => "updateVisibility",
            ScoreboardEvent::SwitchTeamEmojis => "switchTeamEmojis",
            ScoreboardEvent::SetScoringMode(_) => "updateScoringMode",
            ScoreboardEvent::Round(event) => event.name(),
        }
    }
}

impl ScoreboardState {
    /// Fresh state built from the configured defaults.
    pub fn new(defaults: &ScoreboardDefaults) -> Self {
        let team = |id, defaults: &crate::config::TeamDefaults| Team {
            id,
            name: defaults.name.clone(),
            color: defaults.color.clone(),
            score: 0,
            penalties: Penalties::default(),
            emoji: defaults.emoji.clone(),
        };
        Self {
            team1: team(TeamKey::Team1, &defaults.team1),
            team2: team(TeamKey::Team2, &defaults.team2),
            title_text: defaults.title_text.clone(),
            footer_text: defaults.footer_text.clone(),
            title_style: TextStyle {
                color: defaults.text_color.clone(),
                size: defaults.title_size,
            },
            footer_style: TextStyle {
                color: defaults.text_color.clone(),
                size: defaults.footer_size,
            },
            show_score: true,
            show_penalties: true,
            show_emojis: true,
            logo: None,
            logo_size: defaults.logo_size,
            scoring_mode: ScoringMode::Round,
            rounds: RoundState::default(),
        }
    }

    /// Borrow a team by key.
    pub fn team(&self, key: TeamKey) -> &Team {
        match key {
            TeamKey::Team1 => &self.team1,
            TeamKey::Team2 => &self.team2,
        }
    }

    fn team_mut(&mut self, key: TeamKey) -> &mut Team {
        match key {
            TeamKey::Team1 => &mut self.team1,
            TeamKey::Team2 => &mut self.team2,
        }
    }

    fn text_style_mut(&mut self, target: TextTarget) -> &mut TextStyle {
        match target {
            TextTarget::Title => &mut self.title_style,
            TextTarget::Footer => &mut self.footer_style,
        }
    }

    /// Total a team should display when scores follow the round history, clamped at
    /// zero. An empty history totals zero.
    pub fn derived_score(&self, key: TeamKey) -> u32 {
        let total = self.rounds.history_total(key).max(0);
        u32::try_from(total).unwrap_or(u32::MAX)
    }

    /// In [`ScoringMode::Round`], overwrite both team scores with their history totals.
    pub fn sync_scores_with_history(&mut self) {
        if self.scoring_mode != ScoringMode::Round {
            return;
        }
        for key in [TeamKey::Team1, TeamKey::Team2] {
            let total = self.derived_score(key);
            self.team_mut(key).score = total;
        }
    }

    /// Apply `event`, returning the next state or the reason it was refused.
    ///
    /// Refused events leave `self` untouched.
    pub fn apply(&self, event: ScoreboardEvent) -> Result<ScoreboardState, Rejection> {
        let event_name = event.name();
        let status = self.rounds.game_status;
        let reject = move |reason: &'static str| Rejection {
            event: event_name,
            status,
            reason,
        };

        let mut next = self.clone();
        match event {
            ScoreboardEvent::UpdateTeam { team, name, color } => {
                let name = name
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty());
                if name.is_none() && color.is_none() {
                    return Err(reject("nothing to update"));
                }
                let target = next.team_mut(team);
                if let Some(name) = name {
                    target.name = name;
                }
                if let Some(color) = color {
                    target.color = color;
                }
            }
            ScoreboardEvent::SetTeamEmoji { team, emoji } => {
                next.team_mut(team).emoji = emoji.filter(|emoji| !emoji.trim().is_empty());
            }
            ScoreboardEvent::AdjustScore { team, step } => {
                if self.scoring_mode == ScoringMode::Round {
                    return Err(reject("scores follow the round history"));
                }
                let target = next.team_mut(team);
                target.score = match step {
                    ScoreStep::Increment => target.score.saturating_add(1),
                    ScoreStep::Decrement => target.score.saturating_sub(1),
                };
            }
            ScoreboardEvent::AddPenalty { team, kind } => {
                let penalties = &mut next.team_mut(team).penalties;
                let counter = match kind {
                    PenaltyKind::Major => &mut penalties.major,
                    PenaltyKind::Minor => &mut penalties.minor,
                };
                *counter = counter.saturating_add(1);
            }
            ScoreboardEvent::ResetPenalties(team) => {
                next.team_mut(team).penalties = Penalties::default();
            }
            ScoreboardEvent::ResetAll => {
                for key in [TeamKey::Team1, TeamKey::Team2] {
                    let target = next.team_mut(key);
                    target.score = 0;
                    target.penalties = Penalties::default();
                }
                next.rounds.restart();
            }
            ScoreboardEvent::SetLogo(logo) => {
                next.logo = logo.filter(|logo| !logo.trim().is_empty());
            }
            ScoreboardEvent::SetLogoSize(size) => {
                if size == 0 {
                    return Err(reject("logo size must be positive"));
                }
                next.logo_size = size;
            }
            ScoreboardEvent::SetText { target, text } => match target {
                TextTarget::Title => next.title_text = text,
                TextTarget::Footer => next.footer_text = text,
            },
            ScoreboardEvent::SetTextStyle {
                target,
                color,
                size,
            } => {
                if color.is_none() && size.is_none() {
                    return Err(reject("nothing to update"));
                }
                if size == Some(0) {
                    return Err(reject("text size must be positive"));
                }
                let style = next.text_style_mut(target);
                if let Some(color) = color {
                    style.color = color;
                }
                if let Some(size) = size {
                    style.size = size;
                }
            }
            ScoreboardEvent::SetVisibility { target, visible } => match target {
                VisibilityTarget::Score => next.show_score = visible,
                VisibilityTarget::Penalties => next.show_penalties = visible,
                VisibilityTarget::Emojis => next.show_emojis = visible,
            },
            ScoreboardEvent::SwitchTeamEmojis => {
                std::mem::swap(&mut next.team1.emoji, &mut next.team2.emoji);
            }
            ScoreboardEvent::SetScoringMode(mode) => {
                next.scoring_mode = mode;
                next.sync_scores_with_history();
            }
            ScoreboardEvent::Round(event) => {
                let ends_round = matches!(event, RoundEvent::EndRound(_));
                next.rounds.apply_in_place(event)?;
                if ends_round {
                    next.sync_scores_with_history();
                }
            }
        }

        Ok(next)
    }
}

/// Return `color` when it is a valid hex color, otherwise [`FALLBACK_COLOR`].
pub fn valid_color_or_default(color: &str) -> &str {
    if is_hex_color(color) {
        color
    } else {
        FALLBACK_COLOR
    }
}
