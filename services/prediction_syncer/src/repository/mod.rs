//! Storage contract consumed by the sync, settlement, season and
//! notification cycles.
//!
//! `Repository` is the only dynamically dispatched seam in the crate. The
//! Postgres adapter backs the binary; the in-memory adapter backs the tests
//! and can inject failures per operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    LeaderboardPosition, Match, MatchCard, MatchStatus, NewSeason, NotificationKey, Prediction,
    PredictionSettlement, Season, SeasonType, Team, User, WeeklyRecap,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert or overwrite every field of the team keyed by id.
    async fn upsert_team(&self, team: &Team) -> Result<()>;

    /// Insert or overwrite the match keyed by id. The stored status never
    /// moves backwards, see [`crate::model::MatchStatus::advance`].
    async fn upsert_match(&self, fixture: &Match) -> Result<()>;

    async fn get_match(&self, match_id: i64) -> Result<Option<Match>>;

    /// Completed matches with at least one prediction lacking `completed_at`.
    async fn completed_matches_with_unsettled_predictions(&self) -> Result<Vec<Match>>;

    async fn predictions_for_match(&self, match_id: i64) -> Result<Vec<Prediction>>;

    /// Marks the prediction settled, credits every listed leaderboard and
    /// updates the user's totals and streak in one unit. Returns `false`
    /// without writing anything when the prediction was already settled.
    async fn apply_settlement(&self, settlement: &PredictionSettlement) -> Result<bool>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    async fn all_users(&self) -> Result<Vec<User>>;

    async fn users_with_favorite_team(&self) -> Result<Vec<User>>;

    async fn active_seasons(&self) -> Result<Vec<Season>>;

    async fn active_season(&self, season_type: SeasonType) -> Result<Option<Season>>;

    async fn mark_season_inactive(&self, season_id: i64) -> Result<()>;

    /// Creates a new active season of the given type.
    async fn create_season(&self, season: &NewSeason) -> Result<Season>;

    async fn count_seasons(&self, season_type: SeasonType) -> Result<i64>;

    async fn notification_sent(&self, key: &NotificationKey) -> Result<bool>;

    async fn log_notification(&self, key: &NotificationKey) -> Result<()>;

    /// Scheduled matches of `team_id` kicking off in `[from, from + hours]`.
    async fn upcoming_matches_for_team(
        &self,
        team_id: i64,
        from: DateTime<Utc>,
        hours: i64,
    ) -> Result<Vec<MatchCard>>;

    /// Highest-popularity scheduled match kicking off in `[from, from + hours]`.
    async fn most_popular_match_within(
        &self,
        from: DateTime<Utc>,
        hours: i64,
    ) -> Result<Option<MatchCard>>;

    /// Settled predictions of the user since `since`, with the user's current streak.
    async fn weekly_recap(&self, user_id: i64, since: DateTime<Utc>) -> Result<WeeklyRecap>;

    async fn leaderboard_position(
        &self,
        user_id: i64,
        season_id: i64,
    ) -> Result<Option<LeaderboardPosition>>;
}

/// Row to store when `incoming` is fetched for a match already stored as
/// `existing`. Every field is overwritten except that the status never
/// regresses, and a completed match keeps its score if the fetch lost it.
pub fn merge_fetched_match(existing: Option<&Match>, incoming: &Match) -> Match {
    let mut merged = incoming.clone();
    let Some(existing) = existing else {
        return merged;
    };

    merged.status = existing.status.advance(incoming.status);
    if merged.status == MatchStatus::Completed {
        if merged.final_score().is_none() {
            merged.home_score = existing.home_score;
            merged.away_score = existing.away_score;
        }
    } else {
        merged.home_score = None;
        merged.away_score = None;
    }
    merged
}
