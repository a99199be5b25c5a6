use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc, Weekday};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::messages::{self, escape_markdown, Language};
use super::preview::ImageRenderer;
use super::{LinkButton, Notifier, OutboundMessage};
use crate::backoff::Delay;
use crate::config::{NotificationConfig, TelegramConfig};
use crate::error::Result;
use crate::model::{MatchCard, NotificationKey, NotificationKind, SeasonType, User};
use crate::repository::Repository;
use crate::settlement::StreakAchievement;

const CHANNEL_LOOKAHEAD_HOURS: i64 = 24;
const RECAP_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub channel_chat_id: Option<i64>,
    pub web_app_url: String,
    pub bot_web_app_url: String,
    pub default_language: String,
    pub reminder_lookahead_hours: i64,
    pub concurrency: usize,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl DispatchSettings {
    pub fn from_config(telegram: &TelegramConfig, notifications: &NotificationConfig) -> Self {
        Self {
            channel_chat_id: telegram.channel_chat_id,
            web_app_url: telegram.web_app_url.trim_end_matches('/').to_string(),
            bot_web_app_url: telegram.bot_web_app_url.clone(),
            default_language: notifications.default_language.clone(),
            reminder_lookahead_hours: notifications.reminder_lookahead_hours,
            concurrency: notifications.concurrency.max(1),
            batch_size: notifications.batch_size.max(1),
            batch_pause: notifications.batch_pause(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn sent() -> Self {
        Self {
            sent: 1,
            ..Self::default()
        }
    }

    fn duplicate() -> Self {
        Self {
            duplicates: 1,
            ..Self::default()
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: 1,
            ..Self::default()
        }
    }

    fn failed() -> Self {
        Self {
            failed: 1,
            ..Self::default()
        }
    }

    pub fn absorb(&mut self, other: DispatchReport) {
        self.sent += other.sent;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// ISO week label used as the recap dedup key, e.g. `2026-W42`.
pub fn iso_week_key(date: DateTime<Utc>) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Deduplicated outbound notifications.
///
/// Every send is checked against the notification log first and recorded
/// there only after the notifier accepted it.
pub struct NotificationDispatcher {
    repo: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<dyn ImageRenderer>,
    delay: Arc<dyn Delay>,
    settings: DispatchSettings,
}

impl NotificationDispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<dyn ImageRenderer>,
        delay: Arc<dyn Delay>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            repo,
            notifier,
            renderer,
            delay,
            settings,
        }
    }

    fn language_for(&self, user_code: Option<&str>) -> Language {
        Language::resolve(user_code, &self.settings.default_language)
    }

    /// `Some` when the key must not be sent now: it was sent before, or the
    /// log could not be read.
    async fn blocked(&self, key: &NotificationKey) -> Option<DispatchReport> {
        match self.repo.notification_sent(key).await {
            Ok(false) => None,
            Ok(true) => Some(DispatchReport::duplicate()),
            Err(e) => {
                error!(
                    "Failed to check notification log for {} {} {}: {}",
                    key.subject, key.kind, key.related_id, e
                );
                Some(DispatchReport::failed())
            }
        }
    }

    async fn send_and_log(&self, key: &NotificationKey, message: &OutboundMessage) -> DispatchReport {
        let result = if message.image.is_some() {
            self.notifier.send_photo(message).await
        } else {
            self.notifier.send_text(message).await
        };

        if let Err(e) = result {
            error!(
                "Failed to send {} notification to {}: {}",
                key.kind, key.subject, e
            );
            return DispatchReport::failed();
        }

        if let Err(e) = self.repo.log_notification(key).await {
            error!(
                "Sent {} notification to {} but failed to log it: {}",
                key.kind, key.subject, e
            );
        }
        DispatchReport::sent()
    }

    /// Runs `send` for every item in batches of `batch_size`, at most
    /// `concurrency` at a time, pausing between batches. Stops after the
    /// current batch if shutdown interrupts a pause.
    async fn fan_out<'a, T, F, Fut>(&self, items: &'a [T], send: F) -> DispatchReport
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = DispatchReport> + 'a,
    {
        let mut report = DispatchReport::default();
        let mut batches = items.chunks(self.settings.batch_size.max(1)).peekable();

        while let Some(batch) = batches.next() {
            let results: Vec<DispatchReport> = stream::iter(batch)
                .map(&send)
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;
            for result in results {
                report.absorb(result);
            }

            if batches.peek().is_some() && !self.delay.sleep(self.settings.batch_pause).await {
                info!("Shutdown requested, leaving remaining batches unsent");
                break;
            }
        }
        report
    }

    /// Reminds users about upcoming matches of their favorite team.
    pub async fn send_match_reminders(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let users = self.repo.users_with_favorite_team().await?;
        let report = self
            .fan_out(&users, |user| self.remind_user(user, now))
            .await;

        info!(
            "Match reminders: {} sent, {} already sent, {} skipped, {} failed",
            report.sent, report.duplicates, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn remind_user(&self, user: &User, now: DateTime<Utc>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(team_id) = user.favorite_team_id else {
            return report;
        };

        let cards = match self
            .repo
            .upcoming_matches_for_team(team_id, now, self.settings.reminder_lookahead_hours)
            .await
        {
            Ok(cards) => cards,
            Err(e) => {
                error!("Failed to load matches for user {}: {}", user.id, e);
                report.absorb(DispatchReport::failed());
                return report;
            }
        };

        let language = self.language_for(user.language_code.as_deref());
        for card in &cards {
            let key = NotificationKey::for_user(
                user.id,
                NotificationKind::MatchReminder,
                card.fixture.id.to_string(),
            );
            if let Some(blocked) = self.blocked(&key).await {
                report.absorb(blocked);
                continue;
            }

            let image = match self.renderer.render(card).await {
                Ok(image) => image,
                Err(e) => {
                    warn!(
                        "Skipping reminder for match {} to user {}: {}",
                        card.fixture.id, user.id, e
                    );
                    report.absorb(DispatchReport::skipped());
                    continue;
                }
            };

            let message = OutboundMessage {
                chat_id: user.chat_id,
                text: escape_markdown(&messages::match_reminder(
                    language,
                    &card.home.short_name,
                    &card.away.short_name,
                )),
                image: Some(image),
                button: Some(LinkButton::WebApp {
                    text: messages::reminder_button(language).to_string(),
                    url: format!("{}/matches/{}", self.settings.web_app_url, card.fixture.id),
                }),
            };
            report.absorb(self.send_and_log(&key, &message).await);
        }
        report
    }

    /// Features the most popular match of the next 24 hours in the channel.
    pub async fn send_channel_reminder(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let Some(channel_id) = self.settings.channel_chat_id else {
            debug!("No channel configured, skipping channel reminder");
            return Ok(DispatchReport::default());
        };

        let Some(card) = self
            .repo
            .most_popular_match_within(now, CHANNEL_LOOKAHEAD_HOURS)
            .await?
        else {
            info!("No upcoming match to feature in the channel");
            return Ok(DispatchReport::default());
        };

        let key = NotificationKey::for_channel(
            channel_id,
            NotificationKind::MatchReminder,
            card.fixture.id.to_string(),
        );
        if let Some(blocked) = self.blocked(&key).await {
            debug!("Match {} already featured in the channel", card.fixture.id);
            return Ok(blocked);
        }

        let report = self.send_and_log(&key, &self.channel_message(channel_id, &card).await).await;
        if report.sent > 0 {
            info!("Featured match {} in the channel", card.fixture.id);
        }
        Ok(report)
    }

    async fn channel_message(&self, channel_id: i64, card: &MatchCard) -> OutboundMessage {
        let image = match self.renderer.render(card).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(
                    "No preview for channel match {}, sending text only: {}",
                    card.fixture.id, e
                );
                None
            }
        };

        let language = self.language_for(None);
        OutboundMessage {
            chat_id: channel_id,
            text: escape_markdown(&messages::channel_reminder(
                language,
                &card.home.short_name,
                &card.away.short_name,
                card.fixture.match_date,
            )),
            image,
            button: Some(LinkButton::Url {
                text: messages::channel_button(language).to_string(),
                url: format!(
                    "{}?startapp=m_{}",
                    self.settings.bot_web_app_url, card.fixture.id
                ),
            }),
        }
    }

    /// Sends last week's personal summary. Runs on Mondays (UTC) only.
    pub async fn send_weekly_recaps(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        if now.weekday() != Weekday::Mon {
            debug!("Skipping weekly recap; today is {}", now.weekday());
            return Ok(DispatchReport::default());
        }

        let week = iso_week_key(now);
        let users = self.repo.all_users().await?;
        let season_id = match self.repo.active_season(SeasonType::Monthly).await {
            Ok(season) => season.map(|season| season.id),
            Err(e) => {
                warn!("Recap without leaderboard positions: {}", e);
                None
            }
        };

        let since = now - ChronoDuration::days(RECAP_WINDOW_DAYS);
        let report = self
            .fan_out(&users, |user| self.recap_user(user, &week, since, season_id))
            .await;

        info!(
            "Weekly recap {}: {} sent, {} already sent, {} skipped, {} failed",
            week, report.sent, report.duplicates, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn recap_user(
        &self,
        user: &User,
        week: &str,
        since: DateTime<Utc>,
        season_id: Option<i64>,
    ) -> DispatchReport {
        let key = NotificationKey::for_user(user.id, NotificationKind::Recap, week);
        if let Some(blocked) = self.blocked(&key).await {
            return blocked;
        }

        let recap = match self.repo.weekly_recap(user.id, since).await {
            Ok(recap) => recap,
            Err(e) => {
                error!("Failed to load recap for user {}: {}", user.id, e);
                return DispatchReport::failed();
            }
        };
        if recap.total_predictions == 0 {
            return DispatchReport::skipped();
        }

        let position = match season_id {
            Some(season_id) => self
                .repo
                .leaderboard_position(user.id, season_id)
                .await
                .unwrap_or_else(|e| {
                    warn!("No leaderboard position for user {}: {}", user.id, e);
                    None
                }),
            None => None,
        };

        let language = self.language_for(user.language_code.as_deref());
        let message = OutboundMessage {
            chat_id: user.chat_id,
            text: escape_markdown(&messages::weekly_recap(language, &recap, position.as_ref())),
            image: None,
            button: None,
        };
        self.send_and_log(&key, &message).await
    }

    /// Congratulates users whose streak earned a bonus during settlement.
    pub async fn send_streak_notifications(
        &self,
        achievements: &[StreakAchievement],
    ) -> DispatchReport {
        let report = self
            .fan_out(achievements, |achievement| self.congratulate(achievement))
            .await;
        if !achievements.is_empty() {
            info!(
                "Streak notifications: {} sent, {} already sent, {} failed",
                report.sent, report.duplicates, report.failed
            );
        }
        report
    }

    async fn congratulate(&self, achievement: &StreakAchievement) -> DispatchReport {
        let key = NotificationKey::for_user(
            achievement.user_id,
            NotificationKind::Streak,
            achievement.match_id.to_string(),
        );
        if let Some(blocked) = self.blocked(&key).await {
            return blocked;
        }

        let language = self.language_for(achievement.language_code.as_deref());
        let message = OutboundMessage {
            chat_id: achievement.chat_id,
            text: escape_markdown(&messages::streak_achievement(
                language,
                achievement.streak,
                achievement.bonus,
            )),
            image: None,
            button: None,
        };
        self.send_and_log(&key, &message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::TokioDelay;
    use crate::error::SyncError;
    use crate::fetcher::tests::RecordingDelay;
    use crate::model::{Match, MatchStatus, Team};
    use crate::repository::InMemoryRepository;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<OutboundMessage>>,
        failing_chats: Vec<i64>,
    }

    impl RecordingNotifier {
        fn deliver(&self, message: &OutboundMessage) -> Result<()> {
            if self.failing_chats.contains(&message.chat_id) {
                return Err(SyncError::Notifier("chat not found".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, message: &OutboundMessage) -> Result<()> {
            self.deliver(message)
        }

        async fn send_photo(&self, message: &OutboundMessage) -> Result<()> {
            self.deliver(message)
        }
    }

    struct StaticRenderer {
        fail: bool,
    }

    #[async_trait]
    impl ImageRenderer for StaticRenderer {
        async fn render(&self, _card: &MatchCard) -> Result<Vec<u8>> {
            if self.fail {
                Err(SyncError::ImagePreview(500))
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    fn now() -> DateTime<Utc> {
        // a Monday
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            channel_chat_id: Some(-100500),
            web_app_url: "https://app.example".to_string(),
            bot_web_app_url: "https://t.me/predict_bot/app".to_string(),
            default_language: "en".to_string(),
            reminder_lookahead_hours: 24,
            concurrency: 3,
            batch_size: 2,
            batch_pause: Duration::from_millis(1000),
        }
    }

    fn user(id: i64, favorite: Option<i64>) -> User {
        User {
            id,
            chat_id: 1000 + id,
            language_code: None,
            favorite_team_id: favorite,
            total_points: 0,
            total_predictions: 0,
            correct_predictions: 0,
            current_win_streak: 0,
            longest_win_streak: 0,
        }
    }

    fn team(id: i64, name: &str) -> Team {
        Team {
            id,
            name: name.to_string(),
            short_name: name.to_string(),
            abbreviation: String::new(),
            crest_url: String::new(),
            country: String::new(),
        }
    }

    fn fixture(id: i64, home: i64, away: i64, hours_from_now: i64, popularity: f64) -> Match {
        Match {
            id,
            tournament: "UEFA Champions League".to_string(),
            home_team_id: home,
            away_team_id: away,
            match_date: now() + ChronoDuration::hours(hours_from_now),
            status: MatchStatus::Scheduled,
            home_score: None,
            away_score: None,
            home_odds: None,
            draw_odds: None,
            away_odds: None,
            popularity,
        }
    }

    async fn seeded_repo() -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_team(team(1, "Arsenal")).await;
        repo.insert_team(team(2, "Chelsea")).await;
        repo.insert_team(team(3, "Celtic")).await;
        repo.insert_match(fixture(10, 1, 2, 5, 30.0)).await;
        repo.insert_match(fixture(11, 3, 1, 48, 50.0)).await;
        repo.insert_match(fixture(12, 3, 2, 20, 45.0)).await;
        repo
    }

    fn dispatcher(
        repo: Arc<InMemoryRepository>,
        notifier: Arc<RecordingNotifier>,
        renderer_fails: bool,
    ) -> (NotificationDispatcher, Arc<RecordingDelay>) {
        let delay = Arc::new(RecordingDelay::default());
        let dispatcher = NotificationDispatcher::new(
            repo,
            notifier,
            Arc::new(StaticRenderer {
                fail: renderer_fails,
            }),
            delay.clone(),
            settings(),
        );
        (dispatcher, delay)
    }

    #[tokio::test]
    async fn test_reminders_are_sent_once() {
        let repo = seeded_repo().await;
        repo.insert_user(user(1, Some(1))).await;
        repo.insert_user(user(2, Some(3))).await;
        repo.insert_user(user(3, None)).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, _delay) = dispatcher(repo.clone(), notifier.clone(), false);

        let first = dispatcher.send_match_reminders(now()).await.unwrap();
        assert_eq!(first.sent, 2);

        let second = dispatcher.send_match_reminders(now()).await.unwrap();
        assert_eq!(second.sent, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(notifier.sent().len(), 2);

        let arsenal_fan = notifier
            .sent()
            .into_iter()
            .find(|m| m.chat_id == 1001)
            .unwrap();
        assert_eq!(
            arsenal_fan.button,
            Some(LinkButton::WebApp {
                text: "Make your prediction".to_string(),
                url: "https://app.example/matches/10".to_string(),
            })
        );
        assert!(arsenal_fan.image.is_some());
    }

    #[tokio::test]
    async fn test_failed_send_is_not_logged() {
        let repo = seeded_repo().await;
        repo.insert_user(user(1, Some(1))).await;
        let notifier = Arc::new(RecordingNotifier {
            failing_chats: vec![1001],
            ..RecordingNotifier::default()
        });
        let (dispatcher, _delay) = dispatcher(repo.clone(), notifier, false);

        let report = dispatcher.send_match_reminders(now()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(repo.notification_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_reminder_without_preview_is_skipped() {
        let repo = seeded_repo().await;
        repo.insert_user(user(1, Some(1))).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, _delay) = dispatcher(repo.clone(), notifier.clone(), true);

        let report = dispatcher.send_match_reminders(now()).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_batches_pause_between_each_other() {
        let repo = seeded_repo().await;
        for id in 1..=5 {
            repo.insert_user(user(id, Some(1))).await;
        }
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, delay) = dispatcher(repo, notifier.clone(), false);

        let report = dispatcher.send_match_reminders(now()).await.unwrap();
        assert_eq!(report.sent, 5);
        // 5 users in batches of 2: two pauses, none after the last batch
        assert_eq!(
            *delay.waits.lock().unwrap(),
            vec![Duration::from_millis(1000); 2]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_pause_leaves_later_batches_unsent() {
        let repo = seeded_repo().await;
        for id in 1..=5 {
            repo.insert_user(user(id, Some(1))).await;
        }
        let notifier = Arc::new(RecordingNotifier::default());
        let (stop, shutdown) = tokio::sync::watch::channel(false);
        let dispatcher = NotificationDispatcher::new(
            repo,
            notifier.clone(),
            Arc::new(StaticRenderer { fail: false }),
            Arc::new(TokioDelay::until_shutdown(shutdown)),
            settings(),
        );

        let started = tokio::time::Instant::now();
        let stopper = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            stop.send(true).unwrap();
        };
        let (report, ()) = tokio::join!(dispatcher.send_match_reminders(now()), stopper);

        assert_eq!(report.unwrap().sent, 2);
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_channel_features_most_popular_match_once() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, _delay) = dispatcher(repo.clone(), notifier.clone(), false);

        let first = dispatcher.send_channel_reminder(now()).await.unwrap();
        assert_eq!(first.sent, 1);
        let second = dispatcher.send_channel_reminder(now()).await.unwrap();
        assert_eq!(second.duplicates, 1);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, -100500);
        assert_eq!(
            sent[0].button,
            Some(LinkButton::Url {
                text: "Place a prediction".to_string(),
                url: "https://t.me/predict_bot/app?startapp=m_12".to_string(),
            })
        );
        assert_eq!(
            repo.notification_log().await,
            vec![NotificationKey::for_channel(
                -100500,
                NotificationKind::MatchReminder,
                "12"
            )]
        );
    }

    #[tokio::test]
    async fn test_channel_falls_back_to_text_without_preview() {
        let repo = seeded_repo().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, _delay) = dispatcher(repo, notifier.clone(), true);

        let report = dispatcher.send_channel_reminder(now()).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(notifier.sent()[0].image, None);
    }

    #[tokio::test]
    async fn test_recap_only_on_monday_and_once_per_week() {
        let repo = seeded_repo().await;
        repo.insert_user(user(1, None)).await;
        repo.insert_prediction(crate::model::Prediction {
            id: 1,
            user_id: 1,
            match_id: 10,
            predicted_outcome: Some(crate::model::Outcome::Home),
            predicted_home_score: None,
            predicted_away_score: None,
            points_awarded: 3,
            created_at: now() - ChronoDuration::days(3),
            completed_at: Some(now() - ChronoDuration::days(2)),
        })
        .await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, _delay) = dispatcher(repo.clone(), notifier.clone(), false);

        let tuesday = now() + ChronoDuration::days(1);
        assert_eq!(
            dispatcher.send_weekly_recaps(tuesday).await.unwrap(),
            DispatchReport::default()
        );

        assert_eq!(dispatcher.send_weekly_recaps(now()).await.unwrap().sent, 1);
        assert_eq!(dispatcher.send_weekly_recaps(now()).await.unwrap().duplicates, 1);
        assert_eq!(
            repo.notification_log().await,
            vec![NotificationKey::for_user(1, NotificationKind::Recap, "2026-W43")]
        );
        assert!(notifier.sent()[0].text.contains("Predictions: 1"));
    }

    #[tokio::test]
    async fn test_streak_notification_dedup() {
        let repo = Arc::new(InMemoryRepository::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, _delay) = dispatcher(repo, notifier.clone(), false);
        let achievement = StreakAchievement {
            user_id: 1,
            chat_id: 1001,
            language_code: Some("ru".to_string()),
            match_id: 10,
            streak: 4,
            bonus: 2,
        };

        let achievements = [achievement.clone(), achievement];
        let first = dispatcher.send_streak_notifications(&achievements[..1]).await;
        let second = dispatcher.send_streak_notifications(&achievements[1..]).await;
        assert_eq!(first.sent, 1);
        assert_eq!(second.duplicates, 1);
        assert!(notifier.sent()[0].text.contains("подряд"));
    }

    #[test]
    fn test_iso_week_key() {
        assert_eq!(iso_week_key(now()), "2026-W43");
        let new_year = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(iso_week_key(new_year), "2026-W53");
    }
}
