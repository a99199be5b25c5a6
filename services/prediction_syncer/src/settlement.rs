//! Turns finished matches into awarded points, streaks and leaderboard rows.
//!
//! Matches and their predictions are processed strictly one after another so
//! two predictions of the same user never race on the streak fields. The
//! writes of one prediction commit together, so a failed prediction stays
//! pending and is picked up again by the next run.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::model::{Match, Outcome, Prediction, PredictionSettlement, Season, UserStatsUpdate};
use crate::repository::Repository;

pub const EXACT_SCORE_POINTS: i32 = 7;
pub const OUTCOME_POINTS: i32 = 3;

/// Streak thresholds and their bonus, highest first.
const STREAK_BONUSES: [(i32, i32); 3] = [(11, 10), (7, 5), (4, 2)];

/// Points before streak bonus. An exact-score prediction is judged on the
/// score alone; the outcome rule only applies when no score was predicted.
pub fn base_points(prediction: &Prediction, final_score: (i32, i32)) -> i32 {
    if let Some(predicted) = prediction.exact_score() {
        return if predicted == final_score {
            EXACT_SCORE_POINTS
        } else {
            0
        };
    }

    let actual = Outcome::from_scores(final_score.0, final_score.1);
    match prediction.predicted_outcome {
        Some(outcome) if outcome == actual => OUTCOME_POINTS,
        _ => 0,
    }
}

/// Bonus for a streak value taken after the current prediction was applied.
pub fn streak_bonus(streak: i32) -> i32 {
    STREAK_BONUSES
        .iter()
        .find(|(threshold, _)| streak >= *threshold)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streak {
    pub current: i32,
    pub longest: i32,
}

impl Streak {
    pub fn apply(self, correct: bool) -> Self {
        if correct {
            let current = self.current + 1;
            Self {
                current,
                longest: self.longest.max(current),
            }
        } else {
            Self {
                current: 0,
                longest: self.longest,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredPrediction {
    pub base: i32,
    pub bonus: i32,
    pub correct: bool,
    pub streak: Streak,
}

impl ScoredPrediction {
    pub fn total(&self) -> i32 {
        self.base + self.bonus
    }
}

pub fn score_prediction(
    prediction: &Prediction,
    final_score: (i32, i32),
    streak: Streak,
) -> ScoredPrediction {
    let base = base_points(prediction, final_score);
    let correct = base == EXACT_SCORE_POINTS || base == OUTCOME_POINTS;
    let streak = streak.apply(correct);
    let bonus = if correct { streak_bonus(streak.current) } else { 0 };

    ScoredPrediction {
        base,
        bonus,
        correct,
        streak,
    }
}

/// A user crossed a bonus threshold while a match was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakAchievement {
    pub user_id: i64,
    pub chat_id: i64,
    pub language_code: Option<String>,
    pub match_id: i64,
    pub streak: i32,
    pub bonus: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub matches_processed: usize,
    pub predictions_settled: usize,
    pub predictions_failed: usize,
    pub achievements: Vec<StreakAchievement>,
}

enum Settled {
    Written(Option<StreakAchievement>),
    AlreadySettled,
}

pub struct SettlementEngine {
    repo: Arc<dyn Repository>,
}

impl SettlementEngine {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Settles every completed match that still has unsettled predictions.
    ///
    /// Fails only when the pending matches cannot be listed or when no season
    /// is active; failures on single predictions are logged and skipped.
    pub async fn run(&self) -> Result<SettlementReport> {
        let mut report = SettlementReport::default();

        let pending = self.repo.completed_matches_with_unsettled_predictions().await?;
        if pending.is_empty() {
            debug!("No completed matches awaiting settlement");
            return Ok(report);
        }

        let seasons = self.repo.active_seasons().await?;
        if seasons.is_empty() {
            return Err(SyncError::NoActiveSeason);
        }

        for fixture in &pending {
            self.settle_match(fixture, &seasons, &mut report).await;
        }

        info!(
            "Settlement finished: {} matches, {} predictions settled, {} failed",
            report.matches_processed, report.predictions_settled, report.predictions_failed
        );
        Ok(report)
    }

    async fn settle_match(&self, fixture: &Match, seasons: &[Season], report: &mut SettlementReport) {
        let Some(final_score) = fixture.final_score() else {
            warn!("Match {} is completed but has no final score", fixture.id);
            return;
        };

        let predictions = match self.repo.predictions_for_match(fixture.id).await {
            Ok(predictions) => predictions,
            Err(e) => {
                error!("Failed to load predictions for match {}: {}", fixture.id, e);
                return;
            }
        };
        report.matches_processed += 1;

        for prediction in predictions.iter().filter(|p| !p.is_settled()) {
            match self.settle_prediction(prediction, final_score, seasons).await {
                Ok(Settled::Written(achievement)) => {
                    report.predictions_settled += 1;
                    report.achievements.extend(achievement);
                }
                Ok(Settled::AlreadySettled) => {
                    debug!("Prediction {} was settled concurrently", prediction.id);
                }
                Err(e) => {
                    error!(
                        "Failed to settle prediction {} (match {}): {}",
                        prediction.id, fixture.id, e
                    );
                    report.predictions_failed += 1;
                }
            }
        }
    }

    async fn settle_prediction(
        &self,
        prediction: &Prediction,
        final_score: (i32, i32),
        seasons: &[Season],
    ) -> Result<Settled> {
        let user = self
            .repo
            .get_user(prediction.user_id)
            .await?
            .ok_or_else(|| SyncError::Storage(format!("user {} not found", prediction.user_id)))?;

        let streak = Streak {
            current: user.current_win_streak,
            longest: user.longest_win_streak,
        };
        let scored = score_prediction(prediction, final_score, streak);

        let settlement = PredictionSettlement {
            prediction_id: prediction.id,
            user_id: user.id,
            completed_at: Utc::now(),
            season_ids: seasons.iter().map(|season| season.id).collect(),
            stats: UserStatsUpdate {
                points: scored.total(),
                correct: scored.correct,
                current_win_streak: scored.streak.current,
                longest_win_streak: scored.streak.longest,
            },
        };
        if !self.repo.apply_settlement(&settlement).await? {
            return Ok(Settled::AlreadySettled);
        }

        debug!(
            "Prediction {} settled for user {}: {} + {} bonus",
            prediction.id, user.id, scored.base, scored.bonus
        );

        let achievement = (scored.bonus > 0).then(|| StreakAchievement {
            user_id: user.id,
            chat_id: user.chat_id,
            language_code: user.language_code.clone(),
            match_id: prediction.match_id,
            streak: scored.streak.current,
            bonus: scored.bonus,
        });
        Ok(Settled::Written(achievement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn prediction(outcome: Option<Outcome>, score: Option<(i32, i32)>) -> Prediction {
        Prediction {
            id: 1,
            user_id: 1,
            match_id: 1,
            predicted_outcome: outcome,
            predicted_home_score: score.map(|(home, _)| home),
            predicted_away_score: score.map(|(_, away)| away),
            points_awarded: 0,
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    #[test]
    fn test_exact_score_is_all_or_nothing() {
        assert_eq!(base_points(&prediction(None, Some((2, 1))), (2, 1)), 7);
        assert_eq!(
            base_points(&prediction(Some(Outcome::Home), Some((2, 1))), (2, 1)),
            7
        );
        // right outcome, wrong score
        assert_eq!(base_points(&prediction(None, Some((3, 1))), (2, 1)), 0);
        assert_eq!(
            base_points(&prediction(Some(Outcome::Home), Some((1, 0))), (2, 1)),
            0
        );
    }

    #[test]
    fn test_outcome_only_prediction() {
        assert_eq!(base_points(&prediction(Some(Outcome::Home), None), (2, 1)), 3);
        assert_eq!(base_points(&prediction(Some(Outcome::Away), None), (0, 4)), 3);
        assert_eq!(base_points(&prediction(Some(Outcome::Draw), None), (1, 1)), 3);
        assert_eq!(base_points(&prediction(Some(Outcome::Draw), None), (2, 1)), 0);
        assert_eq!(base_points(&prediction(None, None), (2, 1)), 0);
    }

    #[test]
    fn test_streak_bonus_steps() {
        let expected = [
            (0, 0),
            (3, 0),
            (4, 2),
            (6, 2),
            (7, 5),
            (10, 5),
            (11, 10),
            (30, 10),
        ];
        for (streak, bonus) in expected {
            assert_eq!(streak_bonus(streak), bonus, "streak {streak}");
        }
    }

    #[test]
    fn test_streak_resets_and_keeps_longest() {
        let streak = Streak {
            current: 5,
            longest: 5,
        };
        let after_win = streak.apply(true);
        assert_eq!(after_win, Streak { current: 6, longest: 6 });
        let after_loss = after_win.apply(false);
        assert_eq!(after_loss, Streak { current: 0, longest: 6 });
    }

    #[test]
    fn test_bonus_uses_updated_streak() {
        let scored = score_prediction(
            &prediction(Some(Outcome::Home), None),
            (1, 0),
            Streak { current: 3, longest: 8 },
        );
        assert_eq!(scored.streak, Streak { current: 4, longest: 8 });
        assert_eq!(scored.bonus, 2);
        assert_eq!(scored.total(), 5);
        assert!(scored.correct);
    }

    #[test]
    fn test_incorrect_prediction_gets_no_bonus() {
        let scored = score_prediction(
            &prediction(Some(Outcome::Away), None),
            (1, 0),
            Streak { current: 12, longest: 12 },
        );
        assert_eq!(scored.total(), 0);
        assert_eq!(scored.streak.current, 0);
        assert!(!scored.correct);
    }
}
