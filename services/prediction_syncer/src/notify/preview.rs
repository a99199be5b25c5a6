use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PreviewConfig;
use crate::error::{Result, SyncError};
use crate::model::MatchCard;

/// Renders the preview card attached to match reminders.
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(&self, card: &MatchCard) -> Result<Vec<u8>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRequest<'a> {
    pub tournament: &'a str,
    pub home_team: &'a str,
    pub away_team: &'a str,
    pub match_date: DateTime<Utc>,
    pub home_crest: &'a str,
    pub away_crest: &'a str,
}

impl<'a> From<&'a MatchCard> for CardRequest<'a> {
    fn from(card: &'a MatchCard) -> Self {
        Self {
            tournament: &card.fixture.tournament,
            home_team: &card.home.short_name,
            away_team: &card.away.short_name,
            match_date: card.fixture.match_date,
            home_crest: &card.home.crest_url,
            away_crest: &card.away.crest_url,
        }
    }
}

/// Client of the card rendering service (`POST /api/football-card`).
pub struct HttpImageRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageRenderer {
    pub fn from_config(config: &PreviewConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::new(client, &config.base_url))
    }

    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/football-card", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ImageRenderer for HttpImageRenderer {
    async fn render(&self, card: &MatchCard) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CardRequest::from(card))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                "Preview for match {} failed with status {}",
                card.fixture.id, status
            );
            return Err(SyncError::ImagePreview(status.as_u16()));
        }

        let image = response.bytes().await?;
        debug!("Rendered preview for match {} ({} bytes)", card.fixture.id, image.len());
        Ok(image.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Match, MatchStatus, Team};
    use chrono::TimeZone;
    use mockito::Matcher;

    fn team(id: i64, name: &str) -> Team {
        Team {
            id,
            name: name.to_string(),
            short_name: name.to_string(),
            abbreviation: String::new(),
            crest_url: format!("https://crests.example/{id}.png"),
            country: "Europe".to_string(),
        }
    }

    fn card() -> MatchCard {
        MatchCard {
            fixture: Match {
                id: 7,
                tournament: "UEFA Champions League".to_string(),
                home_team_id: 86,
                away_team_id: 81,
                match_date: Utc.with_ymd_and_hms(2026, 10, 21, 19, 0, 0).unwrap(),
                status: MatchStatus::Scheduled,
                home_score: None,
                away_score: None,
                home_odds: None,
                draw_odds: None,
                away_odds: None,
                popularity: 0.0,
            },
            home: team(86, "Real Madrid"),
            away: team(81, "Barça"),
        }
    }

    #[tokio::test]
    async fn test_render_posts_card_description() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/football-card")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "tournament": "UEFA Champions League",
                "homeTeam": "Real Madrid",
                "awayTeam": "Barça",
                "matchDate": "2026-10-21T19:00:00Z",
                "homeCrest": "https://crests.example/86.png"
            })))
            .with_status(200)
            .with_body(vec![0x89, 0x50, 0x4e, 0x47])
            .create_async()
            .await;

        let renderer = HttpImageRenderer::new(reqwest::Client::new(), &server.url());
        let image = renderer.render(&card()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(image, vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[tokio::test]
    async fn test_non_200_is_preview_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/football-card")
            .with_status(502)
            .create_async()
            .await;

        let renderer = HttpImageRenderer::new(reqwest::Client::new(), &server.url());
        match renderer.render(&card()).await {
            Err(SyncError::ImagePreview(status)) => assert_eq!(status, 502),
            other => panic!("expected preview error, got {:?}", other.map(|b| b.len())),
        }
    }
}
