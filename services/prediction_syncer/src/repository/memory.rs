use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

use super::{merge_fetched_match, Repository};
use crate::error::{Result, SyncError};
use crate::model::{
    LeaderboardPosition, Match, MatchCard, MatchStatus, NewSeason, NotificationKey, Prediction,
    PredictionSettlement, Season, SeasonType, Team, User, WeeklyRecap,
};

#[derive(Default)]
struct State {
    teams: BTreeMap<i64, Team>,
    matches: BTreeMap<i64, Match>,
    predictions: BTreeMap<i64, Prediction>,
    users: BTreeMap<i64, User>,
    seasons: BTreeMap<i64, Season>,
    leaderboards: BTreeMap<(i64, i64), i64>,
    notifications: Vec<NotificationKey>,
    faults: HashSet<(String, Option<i64>)>,
}

impl State {
    /// Fails when a fault was injected for `operation`, either for every
    /// call or for the given id only.
    fn check_fault(&self, operation: &str, id: Option<i64>) -> Result<()> {
        let all = (operation.to_string(), None);
        let one = (operation.to_string(), id);
        if self.faults.contains(&all) || (id.is_some() && self.faults.contains(&one)) {
            return Err(SyncError::Storage(format!(
                "injected failure in {operation} ({id:?})"
            )));
        }
        Ok(())
    }

    fn card(&self, fixture: &Match) -> Option<MatchCard> {
        Some(MatchCard {
            fixture: fixture.clone(),
            home: self.teams.get(&fixture.home_team_id)?.clone(),
            away: self.teams.get(&fixture.away_team_id)?.clone(),
        })
    }

    fn upcoming(&self, from: DateTime<Utc>, hours: i64) -> impl Iterator<Item = &Match> {
        let until = from + Duration::hours(hours);
        self.matches.values().filter(move |fixture| {
            fixture.status == MatchStatus::Scheduled
                && fixture.match_date >= from
                && fixture.match_date <= until
        })
    }
}

/// Map-backed repository with the same observable semantics as
/// [`super::PgRepository`], used by the test suite.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `operation` fail with a storage error.
    pub async fn fail_all(&self, operation: &str) {
        self.state
            .lock()
            .await
            .faults
            .insert((operation.to_string(), None));
    }

    /// Makes later calls of `operation` fail when their primary id is `id`.
    /// Settlement writes use the names `settle_prediction` (prediction id),
    /// `add_leaderboard_points` (season id) and `update_user_stats` (user id).
    pub async fn fail_for(&self, operation: &str, id: i64) {
        self.state
            .lock()
            .await
            .faults
            .insert((operation.to_string(), Some(id)));
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    pub async fn insert_team(&self, team: Team) {
        self.state.lock().await.teams.insert(team.id, team);
    }

    /// Stores the match as given, bypassing the fetch merge rules.
    pub async fn insert_match(&self, fixture: Match) {
        self.state.lock().await.matches.insert(fixture.id, fixture);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_prediction(&self, prediction: Prediction) {
        self.state
            .lock()
            .await
            .predictions
            .insert(prediction.id, prediction);
    }

    pub async fn insert_season(&self, season: Season) {
        self.state.lock().await.seasons.insert(season.id, season);
    }

    pub async fn insert_leaderboard_points(&self, user_id: i64, season_id: i64, points: i64) {
        self.state
            .lock()
            .await
            .leaderboards
            .insert((season_id, user_id), points);
    }

    pub async fn team(&self, team_id: i64) -> Option<Team> {
        self.state.lock().await.teams.get(&team_id).cloned()
    }

    pub async fn prediction(&self, prediction_id: i64) -> Option<Prediction> {
        self.state
            .lock()
            .await
            .predictions
            .get(&prediction_id)
            .cloned()
    }

    pub async fn user(&self, user_id: i64) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn seasons(&self) -> Vec<Season> {
        self.state.lock().await.seasons.values().cloned().collect()
    }

    pub async fn leaderboard_points(&self, user_id: i64, season_id: i64) -> i64 {
        self.state
            .lock()
            .await
            .leaderboards
            .get(&(season_id, user_id))
            .copied()
            .unwrap_or(0)
    }

    pub async fn notification_log(&self) -> Vec<NotificationKey> {
        self.state.lock().await.notifications.clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn upsert_team(&self, team: &Team) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_fault("upsert_team", Some(team.id))?;
        state.teams.insert(team.id, team.clone());
        Ok(())
    }

    async fn upsert_match(&self, fixture: &Match) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_fault("upsert_match", Some(fixture.id))?;
        let merged = merge_fetched_match(state.matches.get(&fixture.id), fixture);
        state.matches.insert(fixture.id, merged);
        Ok(())
    }

    async fn get_match(&self, match_id: i64) -> Result<Option<Match>> {
        let state = self.state.lock().await;
        state.check_fault("get_match", Some(match_id))?;
        Ok(state.matches.get(&match_id).cloned())
    }

    async fn completed_matches_with_unsettled_predictions(&self) -> Result<Vec<Match>> {
        let state = self.state.lock().await;
        state.check_fault("completed_matches_with_unsettled_predictions", None)?;
        let pending: HashSet<i64> = state
            .predictions
            .values()
            .filter(|prediction| !prediction.is_settled())
            .map(|prediction| prediction.match_id)
            .collect();

        let mut matches: Vec<Match> = state
            .matches
            .values()
            .filter(|fixture| {
                fixture.status == MatchStatus::Completed && pending.contains(&fixture.id)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|fixture| (fixture.match_date, fixture.id));
        Ok(matches)
    }

    async fn predictions_for_match(&self, match_id: i64) -> Result<Vec<Prediction>> {
        let state = self.state.lock().await;
        state.check_fault("predictions_for_match", Some(match_id))?;
        Ok(state
            .predictions
            .values()
            .filter(|prediction| prediction.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn apply_settlement(&self, settlement: &PredictionSettlement) -> Result<bool> {
        let mut state = self.state.lock().await;
        let user_id = settlement.user_id;

        // every check runs before the first write
        state.check_fault("settle_prediction", Some(settlement.prediction_id))?;
        for season_id in &settlement.season_ids {
            state.check_fault("add_leaderboard_points", Some(*season_id))?;
        }
        state.check_fault("update_user_stats", Some(user_id))?;
        let pending = state
            .predictions
            .get(&settlement.prediction_id)
            .is_some_and(|prediction| !prediction.is_settled());
        if !pending {
            return Ok(false);
        }
        if !state.users.contains_key(&user_id) {
            return Err(SyncError::Storage(format!("user {user_id} not found")));
        }

        let stats = settlement.stats;
        if let Some(prediction) = state.predictions.get_mut(&settlement.prediction_id) {
            prediction.points_awarded = stats.points;
            prediction.completed_at = Some(settlement.completed_at);
        }

        for season_id in &settlement.season_ids {
            *state.leaderboards.entry((*season_id, user_id)).or_insert(0) +=
                i64::from(stats.points);
        }

        if let Some(user) = state.users.get_mut(&user_id) {
            user.total_points += i64::from(stats.points);
            user.total_predictions += 1;
            if stats.correct {
                user.correct_predictions += 1;
            }
            user.current_win_streak = stats.current_win_streak;
            user.longest_win_streak = stats.longest_win_streak;
        }
        Ok(true)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let state = self.state.lock().await;
        state.check_fault("get_user", Some(user_id))?;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        state.check_fault("all_users", None)?;
        Ok(state.users.values().cloned().collect())
    }

    async fn users_with_favorite_team(&self) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        state.check_fault("users_with_favorite_team", None)?;
        Ok(state
            .users
            .values()
            .filter(|user| user.favorite_team_id.is_some())
            .cloned()
            .collect())
    }

    async fn active_seasons(&self) -> Result<Vec<Season>> {
        let state = self.state.lock().await;
        state.check_fault("active_seasons", None)?;
        Ok(state
            .seasons
            .values()
            .filter(|season| season.is_active)
            .cloned()
            .collect())
    }

    async fn active_season(&self, season_type: SeasonType) -> Result<Option<Season>> {
        let state = self.state.lock().await;
        state.check_fault("active_season", None)?;
        Ok(state
            .seasons
            .values()
            .find(|season| season.is_active && season.season_type == season_type)
            .cloned())
    }

    async fn mark_season_inactive(&self, season_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_fault("mark_season_inactive", Some(season_id))?;
        if let Some(season) = state.seasons.get_mut(&season_id) {
            season.is_active = false;
        }
        Ok(())
    }

    async fn create_season(&self, season: &NewSeason) -> Result<Season> {
        let mut state = self.state.lock().await;
        state.check_fault("create_season", None)?;
        if state
            .seasons
            .values()
            .any(|existing| existing.is_active && existing.season_type == season.season_type)
        {
            return Err(SyncError::Storage(format!(
                "an active {} season already exists",
                season.season_type
            )));
        }

        let id = state.seasons.keys().next_back().copied().unwrap_or(0) + 1;
        let created = Season {
            id,
            name: season.name.clone(),
            start_date: season.start_date,
            end_date: season.end_date,
            is_active: true,
            season_type: season.season_type,
        };
        state.seasons.insert(id, created.clone());
        Ok(created)
    }

    async fn count_seasons(&self, season_type: SeasonType) -> Result<i64> {
        let state = self.state.lock().await;
        state.check_fault("count_seasons", None)?;
        Ok(state
            .seasons
            .values()
            .filter(|season| season.season_type == season_type)
            .count() as i64)
    }

    async fn notification_sent(&self, key: &NotificationKey) -> Result<bool> {
        let state = self.state.lock().await;
        state.check_fault("notification_sent", None)?;
        Ok(state.notifications.contains(key))
    }

    async fn log_notification(&self, key: &NotificationKey) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_fault("log_notification", None)?;
        if !state.notifications.contains(key) {
            state.notifications.push(key.clone());
        }
        Ok(())
    }

    async fn upcoming_matches_for_team(
        &self,
        team_id: i64,
        from: DateTime<Utc>,
        hours: i64,
    ) -> Result<Vec<MatchCard>> {
        let state = self.state.lock().await;
        state.check_fault("upcoming_matches_for_team", Some(team_id))?;
        let mut cards: Vec<MatchCard> = state
            .upcoming(from, hours)
            .filter(|fixture| fixture.home_team_id == team_id || fixture.away_team_id == team_id)
            .filter_map(|fixture| state.card(fixture))
            .collect();
        cards.sort_by_key(|card| card.fixture.match_date);
        Ok(cards)
    }

    async fn most_popular_match_within(
        &self,
        from: DateTime<Utc>,
        hours: i64,
    ) -> Result<Option<MatchCard>> {
        let state = self.state.lock().await;
        state.check_fault("most_popular_match_within", None)?;
        let best = state.upcoming(from, hours).fold(None::<&Match>, |best, fixture| {
            match best {
                Some(current) if current.popularity >= fixture.popularity => Some(current),
                _ => Some(fixture),
            }
        });
        Ok(best.and_then(|fixture| state.card(fixture)))
    }

    async fn weekly_recap(&self, user_id: i64, since: DateTime<Utc>) -> Result<WeeklyRecap> {
        let state = self.state.lock().await;
        state.check_fault("weekly_recap", Some(user_id))?;
        let mut recap = WeeklyRecap {
            current_streak: state
                .users
                .get(&user_id)
                .map(|user| user.current_win_streak)
                .unwrap_or(0),
            ..WeeklyRecap::default()
        };

        for prediction in state.predictions.values().filter(|prediction| {
            prediction.user_id == user_id
                && prediction.completed_at.is_some_and(|settled| settled >= since)
        }) {
            recap.total_predictions += 1;
            recap.points += i64::from(prediction.points_awarded);
            if prediction.points_awarded > 0 {
                recap.wins += 1;
            } else {
                recap.losses += 1;
            }
        }
        Ok(recap)
    }

    async fn leaderboard_position(
        &self,
        user_id: i64,
        season_id: i64,
    ) -> Result<Option<LeaderboardPosition>> {
        let state = self.state.lock().await;
        state.check_fault("leaderboard_position", Some(user_id))?;
        let Some(&points) = state.leaderboards.get(&(season_id, user_id)) else {
            return Ok(None);
        };

        let season_rows = state
            .leaderboards
            .iter()
            .filter(|((season, _), _)| *season == season_id);
        let (ahead, participants) = season_rows.fold((0, 0), |(ahead, total), (_, other)| {
            (ahead + i64::from(*other > points), total + 1)
        });

        Ok(Some(LeaderboardPosition {
            rank: ahead + 1,
            points,
            participants,
        }))
    }
}
