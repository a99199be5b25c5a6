use chrono::Utc;
use governor::clock::{Clock, DefaultClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::backoff::{Delay, TokioDelay};
use crate::config::{ScheduleConfig, SyncerConfig};
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::notify::{
    DispatchReport, DispatchSettings, HttpImageRenderer, NotificationDispatcher, TelegramNotifier,
};
use crate::reconciler::{Reconciler, SyncReport};
use crate::repository::Repository;
use crate::scheduler::run_every;
use crate::season::{RotationOutcome, SeasonManager};
use crate::settlement::{SettlementEngine, SettlementReport};

/// Owns one instance of every cycle and drives them on their own timers.
pub struct Syncer<C: Clock = DefaultClock> {
    reconciler: Reconciler<C>,
    settlement: SettlementEngine,
    seasons: SeasonManager,
    dispatcher: NotificationDispatcher,
    schedule: ScheduleConfig,
}

impl Syncer<DefaultClock> {
    /// Wires the production adapters around `repo`. Provider waits and
    /// notification pauses end early once `shutdown` flips.
    pub fn from_config(
        config: &SyncerConfig,
        repo: Arc<dyn Repository>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let delay: Arc<dyn Delay> = Arc::new(TokioDelay::until_shutdown(shutdown));
        let fetcher = Fetcher::from_config(&config.provider, delay.clone())?;
        let notifier = Arc::new(TelegramNotifier::from_config(&config.telegram)?);
        let renderer = Arc::new(HttpImageRenderer::from_config(&config.preview)?);

        Ok(Self::new(
            Reconciler::new(repo.clone(), fetcher, config.provider.competitions.clone()),
            SettlementEngine::new(repo.clone()),
            SeasonManager::new(repo.clone(), config.schedule.rotating_season_types.clone()),
            NotificationDispatcher::new(
                repo,
                notifier,
                renderer,
                delay,
                DispatchSettings::from_config(&config.telegram, &config.notifications),
            ),
            config.schedule.clone(),
        ))
    }
}

impl<C: Clock> Syncer<C> {
    pub fn new(
        reconciler: Reconciler<C>,
        settlement: SettlementEngine,
        seasons: SeasonManager,
        dispatcher: NotificationDispatcher,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            reconciler,
            settlement,
            seasons,
            dispatcher,
            schedule,
        }
    }

    pub async fn sync_matches(&self) -> Result<SyncReport> {
        Ok(self.reconciler.run().await)
    }

    /// Settles finished matches, then congratulates users who hit a streak
    /// bonus along the way.
    pub async fn settle_predictions(&self) -> Result<SettlementReport> {
        let report = self.settlement.run().await?;
        self.dispatcher
            .send_streak_notifications(&report.achievements)
            .await;
        Ok(report)
    }

    pub async fn rotate_seasons(&self) -> Result<Vec<RotationOutcome>> {
        self.seasons.run(Utc::now().date_naive()).await
    }

    /// Channel feature first, then favorite-team reminders. Both run even if
    /// the other fails; the first error is returned.
    pub async fn send_notifications(&self) -> Result<DispatchReport> {
        let now = Utc::now();
        let channel = self.dispatcher.send_channel_reminder(now).await;
        let reminders = self.dispatcher.send_match_reminders(now).await;

        let mut report = channel?;
        report.absorb(reminders?);
        Ok(report)
    }

    pub async fn send_weekly_recap(&self) -> Result<DispatchReport> {
        self.dispatcher.send_weekly_recaps(Utc::now()).await
    }

    /// Runs every cycle once immediately and then on its own interval until
    /// `shutdown` flips. Returns after all loops have stopped.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let every = |secs: u64| Duration::from_secs(secs.max(1));
        info!("Syncer starting");

        // All loops share this task. A cycle only holds up the others while
        // it blocks the thread without awaiting; every cycle here awaits on
        // I/O or a timer.
        tokio::join!(
            run_every(
                "match sync",
                every(self.schedule.sync_interval_secs),
                shutdown.clone(),
                || async move { self.sync_matches().await.map(|_| ()) },
            ),
            run_every(
                "prediction settlement",
                every(self.schedule.settle_interval_secs),
                shutdown.clone(),
                || async move { self.settle_predictions().await.map(|_| ()) },
            ),
            run_every(
                "season rotation",
                every(self.schedule.season_interval_secs),
                shutdown.clone(),
                || async move { self.rotate_seasons().await.map(|_| ()) },
            ),
            run_every(
                "match notifications",
                every(self.schedule.notify_interval_secs),
                shutdown.clone(),
                || async move { self.send_notifications().await.map(|_| ()) },
            ),
            run_every(
                "weekly recap",
                every(self.schedule.recap_interval_secs),
                shutdown,
                || async move { self.send_weekly_recap().await.map(|_| ()) },
            ),
        );

        info!("Syncer stopped");
    }
}
