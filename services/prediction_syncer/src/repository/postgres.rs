use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::{merge_fetched_match, Repository};
use crate::config::DatabaseConfig;
use crate::error::{Result, SyncError};
use crate::model::{
    LeaderboardPosition, Match, MatchCard, NewSeason, NotificationKey, Prediction,
    PredictionSettlement, Season, SeasonType, Team, User, WeeklyRecap,
};

const MATCH_COLUMNS: &str = r#"
    m.id, m.tournament, m.home_team_id, m.away_team_id, m.match_date, m.status,
    m.home_score, m.away_score, m.home_odds, m.draw_odds, m.away_odds, m.popularity_score
"#;

const CARD_COLUMNS: &str = r#"
    ht.name AS home_name, ht.short_name AS home_short_name,
    ht.abbreviation AS home_abbreviation, ht.crest_url AS home_crest_url,
    ht.country AS home_country,
    at.name AS away_name, at.short_name AS away_short_name,
    at.abbreviation AS away_abbreviation, at.crest_url AS away_crest_url,
    at.country AS away_country
"#;

fn invalid_column(column: &str, value: &str) -> SyncError {
    SyncError::Storage(format!("invalid {column} value {value:?}"))
}

/// `make_interval` takes an `int4` hour count.
fn interval_hours(hours: i64) -> Result<i32> {
    i32::try_from(hours)
        .map_err(|_| SyncError::Storage(format!("lookahead of {hours} hours is out of range")))
}

#[derive(Debug, sqlx::FromRow)]
struct MatchRow {
    id: i64,
    tournament: String,
    home_team_id: i64,
    away_team_id: i64,
    match_date: DateTime<Utc>,
    status: String,
    home_score: Option<i32>,
    away_score: Option<i32>,
    home_odds: Option<f64>,
    draw_odds: Option<f64>,
    away_odds: Option<f64>,
    popularity_score: f64,
}

impl TryFrom<MatchRow> for Match {
    type Error = SyncError;

    fn try_from(row: MatchRow) -> Result<Self> {
        Ok(Match {
            id: row.id,
            tournament: row.tournament,
            home_team_id: row.home_team_id,
            away_team_id: row.away_team_id,
            match_date: row.match_date,
            status: row
                .status
                .parse()
                .map_err(|_| invalid_column("status", &row.status))?,
            home_score: row.home_score,
            away_score: row.away_score,
            home_odds: row.home_odds,
            draw_odds: row.draw_odds,
            away_odds: row.away_odds,
            popularity: row.popularity_score,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MatchCardRow {
    #[sqlx(flatten)]
    fixture: MatchRow,
    home_name: String,
    home_short_name: String,
    home_abbreviation: String,
    home_crest_url: String,
    home_country: String,
    away_name: String,
    away_short_name: String,
    away_abbreviation: String,
    away_crest_url: String,
    away_country: String,
}

impl TryFrom<MatchCardRow> for MatchCard {
    type Error = SyncError;

    fn try_from(row: MatchCardRow) -> Result<Self> {
        let home = Team {
            id: row.fixture.home_team_id,
            name: row.home_name,
            short_name: row.home_short_name,
            abbreviation: row.home_abbreviation,
            crest_url: row.home_crest_url,
            country: row.home_country,
        };
        let away = Team {
            id: row.fixture.away_team_id,
            name: row.away_name,
            short_name: row.away_short_name,
            abbreviation: row.away_abbreviation,
            crest_url: row.away_crest_url,
            country: row.away_country,
        };
        Ok(MatchCard {
            fixture: row.fixture.try_into()?,
            home,
            away,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    user_id: i64,
    match_id: i64,
    predicted_outcome: Option<String>,
    predicted_home_score: Option<i32>,
    predicted_away_score: Option<i32>,
    points_awarded: i32,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PredictionRow> for Prediction {
    type Error = SyncError;

    fn try_from(row: PredictionRow) -> Result<Self> {
        let predicted_outcome = match row.predicted_outcome {
            Some(outcome) => Some(
                outcome
                    .parse()
                    .map_err(|_| invalid_column("predicted_outcome", &outcome))?,
            ),
            None => None,
        };
        Ok(Prediction {
            id: row.id,
            user_id: row.user_id,
            match_id: row.match_id,
            predicted_outcome,
            predicted_home_score: row.predicted_home_score,
            predicted_away_score: row.predicted_away_score,
            points_awarded: row.points_awarded,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SeasonRow {
    id: i64,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    is_active: bool,
    season_type: String,
}

impl TryFrom<SeasonRow> for Season {
    type Error = SyncError;

    fn try_from(row: SeasonRow) -> Result<Self> {
        Ok(Season {
            id: row.id,
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            season_type: row
                .season_type
                .parse()
                .map_err(|_| invalid_column("season_type", &row.season_type))?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    chat_id: i64,
    language_code: Option<String>,
    favorite_team_id: Option<i64>,
    total_points: i64,
    total_predictions: i32,
    correct_predictions: i32,
    current_win_streak: i32,
    longest_win_streak: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            chat_id: row.chat_id,
            language_code: row.language_code,
            favorite_team_id: row.favorite_team_id,
            total_points: row.total_points,
            total_predictions: row.total_predictions,
            correct_predictions: row.correct_predictions,
            current_win_streak: row.current_win_streak,
            longest_win_streak: row.longest_win_streak,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecapRow {
    total_predictions: i64,
    wins: i64,
    losses: i64,
    points: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    position: i64,
    points: i64,
    participants: i64,
}

const USER_COLUMNS: &str = r#"
    id, chat_id, language_code, favorite_team_id, total_points, total_predictions,
    correct_predictions, current_win_streak, longest_win_streak
"#;

const SEASON_COLUMNS: &str = "id, name, start_date, end_date, is_active, season_type";

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = SyncError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Postgres adapter of [`Repository`].
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub async fn connect(config: &DatabaseConfig, database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn upsert_team(&self, team: &Team) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO teams (id, name, short_name, abbreviation, crest_url, country, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                short_name = EXCLUDED.short_name,
                abbreviation = EXCLUDED.abbreviation,
                crest_url = EXCLUDED.crest_url,
                country = EXCLUDED.country,
                updated_at = NOW()
            "#,
        )
        .bind(team.id)
        .bind(&team.name)
        .bind(&team.short_name)
        .bind(&team.abbreviation)
        .bind(&team.crest_url)
        .bind(&team.country)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_match(&self, fixture: &Match) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<MatchRow> = sqlx::query_as(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches m WHERE m.id = $1 FOR UPDATE"
        ))
        .bind(fixture.id)
        .fetch_optional(&mut *tx)
        .await?;
        let existing = existing.map(Match::try_from).transpose()?;
        let merged = merge_fetched_match(existing.as_ref(), fixture);

        sqlx::query(
            r#"
            INSERT INTO matches (
                id, tournament, home_team_id, away_team_id, match_date, status,
                home_score, away_score, home_odds, draw_odds, away_odds, popularity_score, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (id) DO UPDATE SET
                tournament = EXCLUDED.tournament,
                home_team_id = EXCLUDED.home_team_id,
                away_team_id = EXCLUDED.away_team_id,
                match_date = EXCLUDED.match_date,
                status = EXCLUDED.status,
                home_score = EXCLUDED.home_score,
                away_score = EXCLUDED.away_score,
                home_odds = EXCLUDED.home_odds,
                draw_odds = EXCLUDED.draw_odds,
                away_odds = EXCLUDED.away_odds,
                popularity_score = EXCLUDED.popularity_score,
                updated_at = NOW()
            "#,
        )
        .bind(merged.id)
        .bind(&merged.tournament)
        .bind(merged.home_team_id)
        .bind(merged.away_team_id)
        .bind(merged.match_date)
        .bind(merged.status.as_str())
        .bind(merged.home_score)
        .bind(merged.away_score)
        .bind(merged.home_odds)
        .bind(merged.draw_odds)
        .bind(merged.away_odds)
        .bind(merged.popularity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_match(&self, match_id: i64) -> Result<Option<Match>> {
        let row: Option<MatchRow> =
            sqlx::query_as(&format!("SELECT {MATCH_COLUMNS} FROM matches m WHERE m.id = $1"))
                .bind(match_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Match::try_from).transpose()
    }

    async fn completed_matches_with_unsettled_predictions(&self) -> Result<Vec<Match>> {
        let rows: Vec<MatchRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MATCH_COLUMNS}
            FROM matches m
            WHERE m.status = 'completed'
              AND EXISTS (
                  SELECT 1 FROM predictions p
                  WHERE p.match_id = m.id AND p.completed_at IS NULL
              )
            ORDER BY m.match_date, m.id
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn predictions_for_match(&self, match_id: i64) -> Result<Vec<Prediction>> {
        let rows: Vec<PredictionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, match_id, predicted_outcome, predicted_home_score,
                   predicted_away_score, points_awarded, created_at, completed_at
            FROM predictions
            WHERE match_id = $1
            ORDER BY id
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn apply_settlement(&self, settlement: &PredictionSettlement) -> Result<bool> {
        let stats = &settlement.stats;
        let user_id = settlement.user_id;
        let mut tx = self.pool.begin().await?;

        let settled = sqlx::query(
            r#"
            UPDATE predictions
            SET points_awarded = $2, completed_at = $3
            WHERE id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(settlement.prediction_id)
        .bind(stats.points)
        .bind(settlement.completed_at)
        .execute(&mut *tx)
        .await?;
        if settled.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        for season_id in &settlement.season_ids {
            sqlx::query(
                r#"
                INSERT INTO leaderboards (season_id, user_id, points, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (season_id, user_id) DO UPDATE SET
                    points = leaderboards.points + EXCLUDED.points,
                    updated_at = NOW()
                "#,
            )
            .bind(season_id)
            .bind(user_id)
            .bind(i64::from(stats.points))
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE users SET
                total_points = total_points + $2,
                total_predictions = total_predictions + 1,
                correct_predictions = correct_predictions + $3,
                current_win_streak = $4,
                longest_win_streak = $5
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(i64::from(stats.points))
        .bind(i32::from(stats.correct))
        .bind(stats.current_win_streak)
        .bind(stats.longest_win_streak)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            // dropping `tx` rolls back the prediction and leaderboard writes
            return Err(SyncError::Storage(format!("user {user_id} not found")));
        }

        tx.commit().await?;
        debug!(
            "Settled prediction {} for user {} across {} leaderboards",
            settlement.prediction_id,
            user_id,
            settlement.season_ids.len()
        );
        Ok(true)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn users_with_favorite_team(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE favorite_team_id IS NOT NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn active_seasons(&self) -> Result<Vec<Season>> {
        let rows: Vec<SeasonRow> = sqlx::query_as(&format!(
            "SELECT {SEASON_COLUMNS} FROM seasons WHERE is_active ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn active_season(&self, season_type: SeasonType) -> Result<Option<Season>> {
        let row: Option<SeasonRow> = sqlx::query_as(&format!(
            "SELECT {SEASON_COLUMNS} FROM seasons WHERE is_active AND season_type = $1"
        ))
        .bind(season_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Season::try_from).transpose()
    }

    async fn mark_season_inactive(&self, season_id: i64) -> Result<()> {
        sqlx::query("UPDATE seasons SET is_active = FALSE WHERE id = $1")
            .bind(season_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_season(&self, season: &NewSeason) -> Result<Season> {
        let row: SeasonRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO seasons (name, start_date, end_date, is_active, season_type)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING {SEASON_COLUMNS}
            "#
        ))
        .bind(&season.name)
        .bind(season.start_date)
        .bind(season.end_date)
        .bind(season.season_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        debug!("Created season {} ({})", row.name, row.season_type);
        row.try_into()
    }

    async fn count_seasons(&self, season_type: SeasonType) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seasons WHERE season_type = $1")
            .bind(season_type.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn notification_sent(&self, key: &NotificationKey) -> Result<bool> {
        let sent: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM notification_log
                WHERE subject = $1 AND notification_type = $2 AND related_id = $3
            )
            "#,
        )
        .bind(&key.subject)
        .bind(key.kind.as_str())
        .bind(&key.related_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sent)
    }

    async fn log_notification(&self, key: &NotificationKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_log (subject, notification_type, related_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (subject, notification_type, related_id) DO NOTHING
            "#,
        )
        .bind(&key.subject)
        .bind(key.kind.as_str())
        .bind(&key.related_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upcoming_matches_for_team(
        &self,
        team_id: i64,
        from: DateTime<Utc>,
        hours: i64,
    ) -> Result<Vec<MatchCard>> {
        let rows: Vec<MatchCardRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MATCH_COLUMNS}, {CARD_COLUMNS}
            FROM matches m
            JOIN teams ht ON ht.id = m.home_team_id
            JOIN teams at ON at.id = m.away_team_id
            WHERE (m.home_team_id = $1 OR m.away_team_id = $1)
              AND m.status = 'scheduled'
              AND m.match_date BETWEEN $2 AND $2 + make_interval(hours => $3)
            ORDER BY m.match_date
            "#
        ))
        .bind(team_id)
        .bind(from)
        .bind(interval_hours(hours)?)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn most_popular_match_within(
        &self,
        from: DateTime<Utc>,
        hours: i64,
    ) -> Result<Option<MatchCard>> {
        let row: Option<MatchCardRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MATCH_COLUMNS}, {CARD_COLUMNS}
            FROM matches m
            JOIN teams ht ON ht.id = m.home_team_id
            JOIN teams at ON at.id = m.away_team_id
            WHERE m.status = 'scheduled'
              AND m.match_date BETWEEN $1 AND $1 + make_interval(hours => $2)
            ORDER BY m.popularity_score DESC, m.match_date, m.id
            LIMIT 1
            "#
        ))
        .bind(from)
        .bind(interval_hours(hours)?)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MatchCard::try_from).transpose()
    }

    async fn weekly_recap(&self, user_id: i64, since: DateTime<Utc>) -> Result<WeeklyRecap> {
        let row: RecapRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total_predictions,
                COUNT(*) FILTER (WHERE points_awarded > 0) AS wins,
                COUNT(*) FILTER (WHERE points_awarded = 0) AS losses,
                COALESCE(SUM(points_awarded), 0)::BIGINT AS points
            FROM predictions
            WHERE user_id = $1 AND completed_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let current_streak: Option<i32> =
            sqlx::query_scalar("SELECT current_win_streak FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(WeeklyRecap {
            total_predictions: row.total_predictions,
            wins: row.wins,
            losses: row.losses,
            points: row.points,
            current_streak: current_streak.unwrap_or(0),
        })
    }

    async fn leaderboard_position(
        &self,
        user_id: i64,
        season_id: i64,
    ) -> Result<Option<LeaderboardPosition>> {
        let row: Option<PositionRow> = sqlx::query_as(
            r#"
            WITH ranked AS (
                SELECT
                    user_id,
                    points,
                    RANK() OVER (ORDER BY points DESC) AS position,
                    COUNT(*) OVER () AS participants
                FROM leaderboards
                WHERE season_id = $1
            )
            SELECT position, points, participants
            FROM ranked
            WHERE user_id = $2
            "#,
        )
        .bind(season_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| LeaderboardPosition {
            rank: row.position,
            points: row.points,
            participants: row.participants,
        }))
    }
}
