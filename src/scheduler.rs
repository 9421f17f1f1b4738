//! Periodic trigger
//!
//! Drives the manga and chapter batches on their own configured intervals
//! until shutdown. Both intervals fire once immediately on start. A slow
//! batch delays the next tick rather than causing a burst of catch-up runs.

use crate::pipeline::Harvester;
use std::future::Future;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Runs both pipeline stages on their schedules until Ctrl-C
pub async fn run(harvester: &Harvester) {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_until(harvester, shutdown).await;
}

/// Runs both pipeline stages on their schedules until `shutdown` completes
///
/// # Arguments
///
/// * `harvester` - The pipeline to drive
/// * `shutdown` - Resolves when the trigger should stop
pub async fn run_until<F>(harvester: &Harvester, shutdown: F)
where
    F: Future<Output = ()>,
{
    let schedule = &harvester.config().schedule;
    let mut manga_ticks = interval(schedule.manga.interval());
    manga_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut chapter_ticks = interval(schedule.chapters.interval());
    chapter_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Scheduler started (manga: {:?}, chapters: {:?})",
        schedule.manga, schedule.chapters
    );

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Scheduler shutting down");
                break;
            }
            _ = manga_ticks.tick() => {
                match harvester.drain_manga_queue().await {
                    Ok(report) => debug!("Manga batch: {:?}", report),
                    Err(e) => error!("Manga batch failed: {}", e),
                }
            }
            _ = chapter_ticks.tick() => {
                match harvester.drain_chapter_queue().await {
                    Ok(report) => debug!("Chapter batch: {:?}", report),
                    Err(e) => error!("Chapter batch failed: {}", e),
                }
            }
        }
    }
}
