//! Wire types of the external football data provider.
//!
//! Only the fields the reconciler consumes are modelled; everything else in
//! the payload is ignored by serde.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::model::MatchStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct MatchesResponse {
    #[serde(default)]
    pub matches: Vec<ApiMatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiCompetition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiArea {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTeam {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub tla: Option<String>,
    pub crest: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiScoreLine {
    pub home: Option<i32>,
    pub away: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiScore {
    #[serde(default)]
    pub full_time: ApiScoreLine,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOdds {
    pub home_win: Option<f64>,
    pub draw: Option<f64>,
    pub away_win: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMatch {
    pub id: i64,
    pub utc_date: DateTime<Utc>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub area: ApiArea,
    #[serde(default)]
    pub competition: ApiCompetition,
    #[serde(default)]
    pub home_team: ApiTeam,
    #[serde(default)]
    pub away_team: ApiTeam,
    #[serde(default)]
    pub score: ApiScore,
    #[serde(default)]
    pub odds: ApiOdds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StandingsResponse {
    #[serde(default)]
    pub standings: Vec<ApiStanding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiStanding {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub table: Vec<ApiTableRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTableRow {
    pub position: u32,
    pub team: ApiTeam,
}

impl StandingsResponse {
    /// League position per team id taken from the overall ("TOTAL") tables.
    /// Group-stage competitions publish one table per group, so a team keeps
    /// its position within its own group.
    pub fn positions(&self) -> HashMap<i64, u32> {
        self.standings
            .iter()
            .filter(|standing| standing.kind.is_empty() || standing.kind == "TOTAL")
            .flat_map(|standing| standing.table.iter())
            .filter_map(|row| row.team.id.map(|id| (id, row.position)))
            .collect()
    }
}

/// Maps the provider's status vocabulary onto the local three-state one.
pub fn map_status(status: &str) -> MatchStatus {
    match status {
        "SCHEDULED" | "TIMED" => MatchStatus::Scheduled,
        "IN_PLAY" | "PAUSED" => MatchStatus::Ongoing,
        "FINISHED" => MatchStatus::Completed,
        _ => MatchStatus::Unknown,
    }
}
