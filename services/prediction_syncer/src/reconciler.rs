use governor::clock::{Clock, DefaultClock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::fetcher::Fetcher;
use crate::model::{Match, MatchStatus, Team};
use crate::popularity::{self, PopularityInput};
use crate::provider::{map_status, ApiMatch, ApiTeam};
use crate::repository::Repository;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub competitions_synced: usize,
    pub failed_competitions: Vec<String>,
    pub teams_upserted: usize,
    pub matches_upserted: usize,
    pub matches_skipped: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.competitions_synced += other.competitions_synced;
        self.failed_competitions.extend(other.failed_competitions);
        self.teams_upserted += other.teams_upserted;
        self.matches_upserted += other.matches_upserted;
        self.matches_skipped += other.matches_skipped;
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Local team record for a provider team. Teams without an id or a name
/// cannot be keyed and are rejected.
pub fn team_from_api(team: &ApiTeam, country: &str) -> Option<Team> {
    let id = team.id?;
    let name = non_empty(team.name.as_ref())?;
    Some(Team {
        id,
        name: name.to_string(),
        short_name: non_empty(team.short_name.as_ref())
            .unwrap_or(name)
            .to_string(),
        abbreviation: non_empty(team.tla.as_ref()).unwrap_or_default().to_string(),
        crest_url: non_empty(team.crest.as_ref()).unwrap_or_default().to_string(),
        country: country.to_string(),
    })
}

/// Local match record for a provider match whose teams were already mapped.
pub fn match_from_api(
    fetched: &ApiMatch,
    home: &Team,
    away: &Team,
    ranks: &HashMap<i64, u32>,
) -> Match {
    let status = map_status(&fetched.status);
    let (home_score, away_score) = if status == MatchStatus::Completed {
        (fetched.score.full_time.home, fetched.score.full_time.away)
    } else {
        (None, None)
    };

    let tournament = if fetched.competition.name.is_empty() {
        fetched.competition.code.clone()
    } else {
        fetched.competition.name.clone()
    };

    let popularity = popularity::score(&PopularityInput {
        home_team: &home.name,
        away_team: &away.name,
        home_rank: ranks.get(&home.id).copied(),
        away_rank: ranks.get(&away.id).copied(),
        home_odds: fetched.odds.home_win,
        away_odds: fetched.odds.away_win,
        kickoff: fetched.utc_date,
    });

    Match {
        id: fetched.id,
        tournament,
        home_team_id: home.id,
        away_team_id: away.id,
        match_date: fetched.utc_date,
        status,
        home_score,
        away_score,
        home_odds: fetched.odds.home_win,
        draw_odds: fetched.odds.draw,
        away_odds: fetched.odds.away_win,
        popularity,
    }
}

/// Pulls matches per competition and writes teams and matches to the store.
pub struct Reconciler<C: Clock = DefaultClock> {
    repo: Arc<dyn Repository>,
    fetcher: Fetcher<C>,
    competitions: Vec<String>,
}

impl<C: Clock> Reconciler<C> {
    pub fn new(repo: Arc<dyn Repository>, fetcher: Fetcher<C>, competitions: Vec<String>) -> Self {
        Self {
            repo,
            fetcher,
            competitions,
        }
    }

    pub fn fetcher(&self) -> &Fetcher<C> {
        &self.fetcher
    }

    /// Syncs every configured competition. A competition whose fetch fails
    /// is logged and skipped; the others still run. Shutdown during a
    /// provider wait ends the run after the competitions already synced.
    pub async fn run(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for code in &self.competitions {
            let ranks = match self.fetcher.fetch_standings(code).await {
                Ok(ranks) => ranks,
                Err(SyncError::Cancelled) => {
                    info!("Sync interrupted by shutdown before {}", code);
                    break;
                }
                Err(e) => {
                    warn!("No standings for {}, using neutral ranks: {}", code, e);
                    HashMap::new()
                }
            };

            let fetched = match self.fetcher.fetch_matches(code).await {
                Ok(fetched) => fetched,
                Err(SyncError::Cancelled) => {
                    info!("Sync interrupted by shutdown during {}", code);
                    break;
                }
                Err(e) => {
                    error!("Skipping competition {}: {}", code, e);
                    report.failed_competitions.push(code.clone());
                    continue;
                }
            };

            let mut competition = self.reconcile(&fetched, &ranks).await;
            competition.competitions_synced = 1;
            info!(
                "Synced {}: {} matches, {} teams, {} skipped",
                code,
                competition.matches_upserted,
                competition.teams_upserted,
                competition.matches_skipped
            );
            report.absorb(competition);
        }

        info!("Fetch metrics: {}", self.fetcher.metrics().snapshot());
        report
    }

    /// Writes one batch of fetched matches. Records that cannot be mapped or
    /// stored are logged and counted as skipped.
    pub async fn reconcile(&self, fetched: &[ApiMatch], ranks: &HashMap<i64, u32>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut stored_teams: HashSet<i64> = HashSet::new();

        for record in fetched {
            let country = record.area.name.as_str();
            let (Some(home), Some(away)) = (
                team_from_api(&record.home_team, country),
                team_from_api(&record.away_team, country),
            ) else {
                warn!("Skipping match {}: missing team name or id", record.id);
                report.matches_skipped += 1;
                continue;
            };

            let mut teams_ok = true;
            for team in [&home, &away] {
                if stored_teams.contains(&team.id) {
                    continue;
                }
                match self.repo.upsert_team(team).await {
                    Ok(()) => {
                        stored_teams.insert(team.id);
                        report.teams_upserted += 1;
                    }
                    Err(e) => {
                        error!("Failed to upsert team {} ({}): {}", team.id, team.name, e);
                        teams_ok = false;
                    }
                }
            }
            if !teams_ok {
                report.matches_skipped += 1;
                continue;
            }

            let fixture = match_from_api(record, &home, &away, ranks);
            if fixture.status == MatchStatus::Unknown {
                warn!(
                    "Match {} has unrecognized status {:?}",
                    record.id, record.status
                );
            }

            match self.repo.upsert_match(&fixture).await {
                Ok(()) => report.matches_upserted += 1,
                Err(e) => {
                    error!("Failed to upsert match {}: {}", fixture.id, e);
                    report.matches_skipped += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::{BackoffPolicy, TokioDelay};
    use crate::fetcher::tests::test_fetcher;
    use crate::fetcher::RequestPacer;
    use crate::repository::InMemoryRepository;
    use nonzero_ext::nonzero;
    use pretty_assertions::assert_eq;
    use test_log::test;

    const MATCHES: &str = r#"{
        "matches": [
            {
                "id": 1001,
                "utcDate": "2026-10-21T19:00:00Z",
                "status": "FINISHED",
                "area": {"name": "Europe"},
                "competition": {"name": "UEFA Champions League", "code": "CL"},
                "homeTeam": {"id": 86, "name": "Real Madrid CF", "shortName": "Real Madrid", "tla": "RMA", "crest": "https://crests.example/86.png"},
                "awayTeam": {"id": 81, "name": "FC Barcelona", "shortName": "Barça", "tla": "FCB", "crest": "https://crests.example/81.png"},
                "score": {"fullTime": {"home": 2, "away": 1}},
                "odds": {"homeWin": 2.1, "draw": 3.5, "awayWin": 3.0}
            },
            {
                "id": 1002,
                "utcDate": "2026-10-22T16:45:00Z",
                "status": "TIMED",
                "area": {"name": "Europe"},
                "competition": {"name": "UEFA Champions League", "code": "CL"},
                "homeTeam": {"id": 86, "name": "Real Madrid CF"},
                "awayTeam": {"id": 5, "name": "FC Bayern München"},
                "score": {"fullTime": {"home": null, "away": null}}
            },
            {
                "id": 1003,
                "utcDate": "2026-10-22T19:00:00Z",
                "status": "TIMED",
                "homeTeam": {"id": null, "name": null},
                "awayTeam": {"id": 5, "name": "FC Bayern München"}
            },
            {
                "id": 1004,
                "utcDate": "2026-10-23T19:00:00Z",
                "status": "POSTPONED",
                "homeTeam": {"id": 65, "name": "Manchester City FC"},
                "awayTeam": {"id": 5, "name": "FC Bayern München"},
                "score": {"fullTime": {"home": 1, "away": 1}}
            }
        ]
    }"#;

    const STANDINGS: &str = r#"{
        "standings": [{"type": "TOTAL", "table": [
            {"position": 1, "team": {"id": 86}},
            {"position": 4, "team": {"id": 81}}
        ]}]
    }"#;

    #[test(tokio::test)]
    async fn test_sync_upserts_teams_and_matches() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/competitions/CL/standings")
            .with_status(200)
            .with_body(STANDINGS)
            .create_async()
            .await;
        server
            .mock("GET", "/competitions/CL/matches")
            .with_status(200)
            .with_body(MATCHES)
            .create_async()
            .await;

        let repo = Arc::new(InMemoryRepository::new());
        let (fetcher, _delay) = test_fetcher(&server.url(), nonzero!(60u32));
        let reconciler = Reconciler::new(repo.clone(), fetcher, vec!["CL".to_string()]);

        let report = reconciler.run().await;
        assert_eq!(
            report,
            SyncReport {
                competitions_synced: 1,
                failed_competitions: vec![],
                teams_upserted: 4,
                matches_upserted: 3,
                matches_skipped: 1,
            }
        );

        let finished = repo.get_match(1001).await.unwrap().unwrap();
        assert_eq!(finished.status, MatchStatus::Completed);
        assert_eq!(finished.final_score(), Some((2, 1)));
        assert_eq!(finished.tournament, "UEFA Champions League");
        assert_eq!(finished.draw_odds, Some(3.5));

        let upcoming = repo.get_match(1002).await.unwrap().unwrap();
        assert_eq!(upcoming.status, MatchStatus::Scheduled);
        assert_eq!(upcoming.final_score(), None);
        assert!(finished.popularity > upcoming.popularity);

        let postponed = repo.get_match(1004).await.unwrap().unwrap();
        assert_eq!(postponed.status, MatchStatus::Unknown);
        assert_eq!(postponed.final_score(), None);

        let bayern = repo.team(5).await.unwrap();
        assert_eq!(bayern.short_name, "FC Bayern München");
        assert_eq!(bayern.abbreviation, "");
        assert!(repo.get_match(1003).await.unwrap().is_none());
    }

    #[test(tokio::test)]
    async fn test_failed_competition_does_not_abort_run() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/competitions/PL/standings")
            .with_status(403)
            .create_async()
            .await;
        server
            .mock("GET", "/competitions/PL/matches")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/competitions/CL/standings")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/competitions/CL/matches")
            .with_status(200)
            .with_body(MATCHES)
            .create_async()
            .await;

        let repo = Arc::new(InMemoryRepository::new());
        let (fetcher, _delay) = test_fetcher(&server.url(), nonzero!(60u32));
        let reconciler = Reconciler::new(
            repo.clone(),
            fetcher,
            vec!["PL".to_string(), "CL".to_string()],
        );

        let report = reconciler.run().await;
        assert_eq!(report.failed_competitions, vec!["PL".to_string()]);
        assert_eq!(report.competitions_synced, 1);
        assert_eq!(report.matches_upserted, 3);
        assert!(repo.get_match(1001).await.unwrap().is_some());
    }

    #[test(tokio::test)]
    async fn test_shutdown_during_pacing_ends_run() {
        let mut server = mockito::Server::new_async().await;
        let standings = server
            .mock("GET", "/competitions/PL/standings")
            .with_status(200)
            .with_body(STANDINGS)
            .expect(1)
            .create_async()
            .await;
        let untouched = server
            .mock("GET", mockito::Matcher::Regex("matches$".to_string()))
            .expect(0)
            .create_async()
            .await;

        let (stop, shutdown) = tokio::sync::watch::channel(false);
        stop.send(true).unwrap();
        let fetcher = Fetcher::new(
            reqwest::Client::new(),
            &server.url(),
            "secret",
            RequestPacer::per_minute(nonzero!(1u32)),
            BackoffPolicy::new(3, std::time::Duration::from_secs(60)),
            Arc::new(TokioDelay::until_shutdown(shutdown)),
        );
        let repo = Arc::new(InMemoryRepository::new());
        let reconciler = Reconciler::new(
            repo.clone(),
            fetcher,
            vec!["PL".to_string(), "CL".to_string()],
        );

        let report = reconciler.run().await;

        standings.assert_async().await;
        untouched.assert_async().await;
        assert_eq!(report, SyncReport::default());
    }

    #[test(tokio::test)]
    async fn test_storage_failure_skips_only_that_match() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.fail_for("upsert_match", 1001).await;
        let (fetcher, _delay) = test_fetcher("http://127.0.0.1:9", nonzero!(60u32));
        let reconciler = Reconciler::new(repo.clone(), fetcher, vec![]);

        let fetched: crate::provider::MatchesResponse = serde_json::from_str(MATCHES).unwrap();
        let report = reconciler.reconcile(&fetched.matches, &HashMap::new()).await;

        assert_eq!(report.matches_upserted, 2);
        assert_eq!(report.matches_skipped, 2);
        assert!(repo.get_match(1001).await.unwrap().is_none());
        assert!(repo.get_match(1002).await.unwrap().is_some());
    }

    #[test(tokio::test)]
    async fn test_resync_never_regresses_completed_match() {
        let repo = Arc::new(InMemoryRepository::new());
        let (fetcher, _delay) = test_fetcher("http://127.0.0.1:9", nonzero!(60u32));
        let reconciler = Reconciler::new(repo.clone(), fetcher, vec![]);

        let fetched: crate::provider::MatchesResponse = serde_json::from_str(MATCHES).unwrap();
        reconciler.reconcile(&fetched.matches, &HashMap::new()).await;

        let mut stale = fetched.matches[0].clone();
        stale.status = "IN_PLAY".to_string();
        stale.odds.home_win = Some(1.8);
        reconciler.reconcile(&[stale], &HashMap::new()).await;

        let stored = repo.get_match(1001).await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Completed);
        assert_eq!(stored.final_score(), Some((2, 1)));
        assert_eq!(stored.home_odds, Some(1.8));
    }
}
