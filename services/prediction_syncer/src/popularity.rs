//! Popularity heuristic used to rank matches for featuring and notifications.
//!
//! The score is a plain sum of independent components. It is not normalized,
//! so only the relative ordering of two scores carries meaning.

use chrono::{DateTime, Timelike, Utc};

/// Teams in a typical top-flight table; ranks beyond this contribute nothing.
const TABLE_SIZE: f64 = 20.0;
/// Rank assumed for a team without a known league position.
pub const NEUTRAL_RANK: f64 = (TABLE_SIZE + 1.0) / 2.0;
const RANK_WEIGHT: f64 = 2.0;

const ODDS_WEIGHT: f64 = 20.0;
/// Odds component when the provider did not publish odds.
pub const MISSING_ODDS_SCORE: f64 = 0.0;

const EVENING_START_HOUR: u32 = 17;
const EVENING_END_HOUR: u32 = 21;
pub const EVENING_BONUS: f64 = 10.0;

pub const POPULAR_TEAM_BONUS: f64 = 15.0;

/// Curated club names, matched as substrings of the provider's full team name.
pub const POPULAR_TEAMS: &[&str] = &[
    "Real Madrid",
    "Barcelona",
    "Manchester City",
    "Manchester United",
    "Liverpool",
    "Arsenal",
    "Chelsea",
    "Bayern",
    "Borussia Dortmund",
    "Paris Saint-Germain",
    "Juventus",
    "Internazionale",
    "AC Milan",
    "Atlético de Madrid",
];

/// Everything the scorer looks at for one match.
#[derive(Debug, Clone)]
pub struct PopularityInput<'a> {
    pub home_team: &'a str,
    pub away_team: &'a str,
    pub home_rank: Option<u32>,
    pub away_rank: Option<u32>,
    pub home_odds: Option<f64>,
    pub away_odds: Option<f64>,
    pub kickoff: DateTime<Utc>,
}

pub fn rank_component(home_rank: Option<u32>, away_rank: Option<u32>) -> f64 {
    let home = home_rank.map(f64::from).unwrap_or(NEUTRAL_RANK);
    let away = away_rank.map(f64::from).unwrap_or(NEUTRAL_RANK);
    let average = (home + away) / 2.0;
    (TABLE_SIZE + 1.0 - average).max(0.0) * RANK_WEIGHT
}

pub fn odds_component(home_odds: Option<f64>, away_odds: Option<f64>) -> f64 {
    match (home_odds, away_odds) {
        (Some(home), Some(away)) if home > 0.0 && away > 0.0 => {
            ODDS_WEIGHT / (1.0 + (home - away).abs())
        }
        _ => MISSING_ODDS_SCORE,
    }
}

pub fn kickoff_component(kickoff: DateTime<Utc>) -> f64 {
    if (EVENING_START_HOUR..=EVENING_END_HOUR).contains(&kickoff.hour()) {
        EVENING_BONUS
    } else {
        0.0
    }
}

pub fn is_popular_team(name: &str) -> bool {
    POPULAR_TEAMS
        .iter()
        .any(|popular| name.contains(popular))
}

pub fn team_component(home_team: &str, away_team: &str) -> f64 {
    if is_popular_team(home_team) || is_popular_team(away_team) {
        POPULAR_TEAM_BONUS
    } else {
        0.0
    }
}

pub fn score(input: &PopularityInput<'_>) -> f64 {
    rank_component(input.home_rank, input.away_rank)
        + odds_component(input.home_odds, input.away_odds)
        + kickoff_component(input.kickoff)
        + team_component(input.home_team, input.away_team)
}
