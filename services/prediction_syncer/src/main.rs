use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prediction_syncer::repository::Repository;
use prediction_syncer::scheduler::shutdown_channel;
use prediction_syncer::season::RotationOutcome;
use prediction_syncer::{PgRepository, Syncer, SyncerConfig};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every cycle on its schedule until Ctrl-C
    Run,
    /// Pull fixtures and standings from the provider once
    Sync,
    /// Settle predictions for completed matches once
    Settle,
    /// Close expired seasons and open the current ones
    RotateSeasons,
    /// Send the channel feature and favorite-team reminders
    Notify,
    /// Send the weekly recap (only does anything on Mondays)
    Recap,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SyncerConfig::from_env().context("Failed to load configuration")?;
    let repo = PgRepository::connect(&config.database, config.database_url()?)
        .await
        .context("Failed to connect to database")?;

    if let Commands::Migrate = cli.command {
        repo.migrate().await?;
        info!("Migrations applied");
        return Ok(());
    }

    let repo: Arc<dyn Repository> = Arc::new(repo);
    let (stop, shutdown) = shutdown_channel();
    let syncer = Syncer::from_config(&config, repo, shutdown.clone())?;

    match cli.command {
        Commands::Run => {
            let signal = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Shutdown requested, stopping at the next wait");
                let _ = stop.send(true);
            };
            tokio::join!(syncer.run(shutdown), signal);
        }
        Commands::Sync => {
            let report = syncer.sync_matches().await?;
            info!(
                "Synced {} competitions ({} failed): {} teams, {} matches upserted, {} skipped",
                report.competitions_synced,
                report.failed_competitions.len(),
                report.teams_upserted,
                report.matches_upserted,
                report.matches_skipped
            );
        }
        Commands::Settle => {
            let report = syncer.settle_predictions().await?;
            info!(
                "Settled {} predictions across {} matches ({} failed, {} streak bonuses)",
                report.predictions_settled,
                report.matches_processed,
                report.predictions_failed,
                report.achievements.len()
            );
        }
        Commands::RotateSeasons => {
            for outcome in syncer.rotate_seasons().await? {
                match outcome {
                    RotationOutcome::Current(season) => {
                        info!("Season {} is current", season.name)
                    }
                    RotationOutcome::Rotated { previous, created } => info!(
                        "Opened season {} (closed {})",
                        created.name,
                        previous.map(|s| s.name).unwrap_or_else(|| "none".to_string())
                    ),
                }
            }
        }
        Commands::Notify => {
            let report = syncer.send_notifications().await?;
            info!("Notifications: {:?}", report);
        }
        Commands::Recap => {
            let report = syncer.send_weekly_recap().await?;
            info!("Weekly recap: {:?}", report);
        }
        Commands::Migrate => {}
    }

    Ok(())
}
