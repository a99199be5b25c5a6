use chrono::{Datelike, Months, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{NewSeason, Season, SeasonType};
use crate::repository::Repository;

/// First and last day of the calendar month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(first);
    (first, last)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The active season already covers the current month.
    Current(Season),
    /// A new season was created, replacing `previous` when there was one.
    Rotated {
        previous: Option<Season>,
        created: Season,
    },
}

pub struct SeasonManager {
    repo: Arc<dyn Repository>,
    season_types: Vec<SeasonType>,
}

impl SeasonManager {
    pub fn new(repo: Arc<dyn Repository>, season_types: Vec<SeasonType>) -> Self {
        Self { repo, season_types }
    }

    /// Rotates every managed season type. Stops at the first storage error.
    pub async fn run(&self, today: NaiveDate) -> Result<Vec<RotationOutcome>> {
        let mut outcomes = Vec::with_capacity(self.season_types.len());
        for season_type in &self.season_types {
            outcomes.push(self.rotate(*season_type, today).await?);
        }
        Ok(outcomes)
    }

    /// Makes sure exactly one season of `season_type` is active and that it
    /// spans the calendar month of `today`.
    pub async fn rotate(&self, season_type: SeasonType, today: NaiveDate) -> Result<RotationOutcome> {
        let (start_date, end_date) = month_bounds(today);
        let active = self.repo.active_season(season_type).await?;

        if let Some(season) = &active {
            if season.start_date == start_date && season.end_date == end_date {
                debug!("Season {} is current for {}", season.name, season_type);
                return Ok(RotationOutcome::Current(season.clone()));
            }
            self.repo.mark_season_inactive(season.id).await?;
            info!("Closed {} season {}", season_type, season.name);
        }

        let count = self.repo.count_seasons(season_type).await?;
        let created = self
            .repo
            .create_season(&NewSeason {
                name: format!("{}{}", season_type.name_prefix(), count + 1),
                start_date,
                end_date,
                season_type,
            })
            .await?;

        info!(
            "Started {} season {} ({} to {})",
            season_type, created.name, created.start_date, created.end_date
        );
        Ok(RotationOutcome::Rotated {
            previous: active,
            created,
        })
    }
}
