use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub abbreviation: String,
    pub crest_url: String,
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    Ongoing,
    Completed,
    Unknown,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Ongoing => "ongoing",
            MatchStatus::Completed => "completed",
            MatchStatus::Unknown => "unknown",
        }
    }

    fn progress(&self) -> Option<u8> {
        match self {
            MatchStatus::Scheduled => Some(0),
            MatchStatus::Ongoing => Some(1),
            MatchStatus::Completed => Some(2),
            MatchStatus::Unknown => None,
        }
    }

    /// Status to store when `incoming` is fetched for a match currently in `self`.
    /// Progress never moves backwards and `Unknown` never replaces a known status.
    pub fn advance(self, incoming: MatchStatus) -> MatchStatus {
        match (self.progress(), incoming.progress()) {
            (Some(current), Some(next)) if next < current => self,
            (Some(_), None) => self,
            _ => incoming,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "ongoing" => Ok(MatchStatus::Ongoing),
            "completed" => Ok(MatchStatus::Completed),
            "unknown" => Ok(MatchStatus::Unknown),
            other => Err(format!("unknown match status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn from_scores(home: i32, away: i32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::Home,
            std::cmp::Ordering::Less => Outcome::Away,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Outcome::Home),
            "draw" => Ok(Outcome::Draw),
            "away" => Ok(Outcome::Away),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub tournament: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub match_date: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub home_odds: Option<f64>,
    pub draw_odds: Option<f64>,
    pub away_odds: Option<f64>,
    pub popularity: f64,
}

impl Match {
    pub fn final_score(&self) -> Option<(i32, i32)> {
        match (self.home_score, self.away_score) {
            (Some(home), Some(away)) => Some((home, away)),
            _ => None,
        }
    }
}

/// A match together with both of its teams, as needed for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCard {
    pub fixture: Match,
    pub home: Team,
    pub away: Team,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    pub user_id: i64,
    pub match_id: i64,
    pub predicted_outcome: Option<Outcome>,
    pub predicted_home_score: Option<i32>,
    pub predicted_away_score: Option<i32>,
    pub points_awarded: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Prediction {
    pub fn is_settled(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn exact_score(&self) -> Option<(i32, i32)> {
        match (self.predicted_home_score, self.predicted_away_score) {
            (Some(home), Some(away)) => Some((home, away)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonType {
    Monthly,
    Football,
}

impl SeasonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonType::Monthly => "monthly",
            SeasonType::Football => "football",
        }
    }

    pub fn name_prefix(&self) -> &'static str {
        match self {
            SeasonType::Monthly => "S",
            SeasonType::Football => "F",
        }
    }
}

impl fmt::Display for SeasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(SeasonType::Monthly),
            "football" => Ok(SeasonType::Football),
            other => Err(format!("unknown season type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub season_type: SeasonType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSeason {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub season_type: SeasonType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub chat_id: i64,
    pub language_code: Option<String>,
    pub favorite_team_id: Option<i64>,
    pub total_points: i64,
    pub total_predictions: i32,
    pub correct_predictions: i32,
    pub current_win_streak: i32,
    pub longest_win_streak: i32,
}

/// Aggregate changes written for a user after one prediction is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStatsUpdate {
    pub points: i32,
    pub correct: bool,
    pub current_win_streak: i32,
    pub longest_win_streak: i32,
}

/// All writes for one settled prediction. Adapters apply them together or
/// not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionSettlement {
    pub prediction_id: i64,
    pub user_id: i64,
    pub completed_at: DateTime<Utc>,
    /// Leaderboards credited with `stats.points`.
    pub season_ids: Vec<i64>,
    pub stats: UserStatsUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MatchReminder,
    Recap,
    Streak,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::MatchReminder => "match",
            NotificationKind::Recap => "recap",
            NotificationKind::Streak => "streak",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedup key of the notification log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub subject: String,
    pub kind: NotificationKind,
    pub related_id: String,
}

impl NotificationKey {
    pub fn for_user(user_id: i64, kind: NotificationKind, related_id: impl Into<String>) -> Self {
        Self {
            subject: user_id.to_string(),
            kind,
            related_id: related_id.into(),
        }
    }

    /// Channel subjects are prefixed so they never collide with user ids.
    pub fn for_channel(chat_id: i64, kind: NotificationKind, related_id: impl Into<String>) -> Self {
        Self {
            subject: format!("channel:{chat_id}"),
            kind,
            related_id: related_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRecap {
    pub total_predictions: i64,
    pub wins: i64,
    pub losses: i64,
    pub points: i64,
    pub current_streak: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardPosition {
    pub rank: i64,
    pub points: i64,
    pub participants: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_scores() {
        assert_eq!(Outcome::from_scores(2, 1), Outcome::Home);
        assert_eq!(Outcome::from_scores(0, 3), Outcome::Away);
        assert_eq!(Outcome::from_scores(1, 1), Outcome::Draw);
    }

    #[test]
    fn test_status_never_regresses() {
        use MatchStatus::*;
        assert_eq!(Completed.advance(Ongoing), Completed);
        assert_eq!(Completed.advance(Scheduled), Completed);
        assert_eq!(Completed.advance(Unknown), Completed);
        assert_eq!(Ongoing.advance(Unknown), Ongoing);
        assert_eq!(Ongoing.advance(Scheduled), Ongoing);
        assert_eq!(Scheduled.advance(Ongoing), Ongoing);
        assert_eq!(Ongoing.advance(Completed), Completed);
        assert_eq!(Unknown.advance(Scheduled), Scheduled);
    }

    #[test]
    fn test_channel_key_is_distinct_from_user_key() {
        let user = NotificationKey::for_user(42, NotificationKind::MatchReminder, "7");
        let channel = NotificationKey::for_channel(42, NotificationKind::MatchReminder, "7");
        assert_ne!(user, channel);
        assert_eq!(channel.subject, "channel:42");
    }
}
