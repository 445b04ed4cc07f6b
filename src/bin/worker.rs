use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use viralspot::{
    app_state::{self, AppState, Settings},
    config::AppConfig,
    db::{self, queue_queries},
    models::queue::QueueStatus,
    services::{
        ai::AiClient,
        processor,
        queue::{Dispatched, JobQueue},
        scraper::ScraperClient,
    },
};

const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting profile processing worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");
    let sessions = app_state::session_store(&config).expect("Failed to initialize session store");
    let scraper = ScraperClient::new(&config.scraper_base_url, &config.scraper_api_token)
        .expect("Failed to initialize scraper client");
    let ai = AiClient::new(&config.ai_base_url, &config.ai_api_token, &config.ai_model)
        .expect("Failed to initialize AI client");

    let state = AppState::new(
        db_pool,
        queue,
        sessions,
        scraper,
        ai,
        Settings::from_config(&config),
    );

    // Rows left PROCESSING by a dead worker first, then everything PENDING
    sweep_stale(&state).await;
    match requeue_pending(&state).await {
        Ok(count) => tracing::info!(count, "Re-dispatched pending queue rows"),
        Err(e) => tracing::error!(error = %e, "Failed to re-dispatch pending rows"),
    }

    tracing::info!("Worker ready, starting job processing loop");

    let mut last_sweep = Instant::now();

    // Main processing loop
    loop {
        if last_sweep.elapsed() >= STALE_SWEEP_INTERVAL {
            sweep_stale(&state).await;
            last_sweep = Instant::now();
        }

        match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job handled, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(poll_interval).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing job, will retry");
                sleep(poll_interval).await;
            }
        }
    }
}

/// Release expired PROCESSING rows and dispatch the ones that may run again.
async fn sweep_stale(state: &AppState) {
    match release_stale(state).await {
        Ok(0) => {}
        Ok(count) => tracing::warn!(count, "Released stale processing rows"),
        Err(e) => tracing::error!(error = %e, "Failed to release stale processing rows"),
    }
}

async fn release_stale(state: &AppState) -> Result<usize, Box<dyn std::error::Error>> {
    let released = queue_queries::release_stale_entries(
        &state.db,
        state.settings.processing_lease_secs,
        state.settings.max_attempts,
    )
    .await?;

    for entry in &released {
        if entry.status == QueueStatus::Pending {
            state.queue.enqueue(entry.id, entry.priority).await?;
        } else {
            tracing::warn!(
                queue_id = %entry.id,
                username = %entry.username,
                attempts = entry.attempts,
                "Stale job failed after max attempts"
            );
        }
    }
    Ok(released.len())
}

/// Push every PENDING row back onto the dispatch lists. Duplicates are
/// harmless: a second pop finds the row no longer PENDING and skips it.
async fn requeue_pending(state: &AppState) -> Result<usize, Box<dyn std::error::Error>> {
    let pending = queue_queries::pending_entries(&state.db).await?;
    for entry in &pending {
        state.queue.enqueue(entry.id, entry.priority).await?;
    }
    Ok(pending.len())
}

/// Process the next dispatched job.
/// Returns Ok(true) if an id was popped, Ok(false) if the lists were empty.
async fn process_next_job(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let Some(Dispatched { queue_id, priority }) = state.queue.dequeue().await? else {
        return Ok(false);
    };

    // Optimistic PENDING -> PROCESSING transition
    let Some(entry) = queue_queries::claim_entry(&state.db, queue_id).await? else {
        tracing::debug!(queue_id = %queue_id, "Queue row already claimed or gone, skipping");
        return Ok(true);
    };

    tracing::info!(
        queue_id = %entry.id,
        request_id = %entry.request_id,
        username = %entry.username,
        priority = %priority,
        attempt = entry.attempts,
        "Processing profile"
    );

    let started = Instant::now();
    match processor::process_profile(state, &entry.username).await {
        Ok(summary) => {
            queue_queries::complete_entry(&state.db, entry.id).await?;
            tracing::info!(
                queue_id = %entry.id,
                username = %entry.username,
                reels = summary.reels_stored,
                similar = summary.similar_linked,
                duration_ms = started.elapsed().as_millis() as u64,
                "Job completed successfully"
            );
        }
        Err(e) => {
            tracing::error!(
                queue_id = %entry.id,
                username = %entry.username,
                error = %e,
                "Job processing failed"
            );

            let status = queue_queries::fail_attempt(
                &state.db,
                entry.id,
                &e.to_string(),
                state.settings.max_attempts,
            )
            .await?;

            if status == QueueStatus::Pending {
                state.queue.enqueue(entry.id, entry.priority).await?;
                tracing::info!(
                    queue_id = %entry.id,
                    attempts = entry.attempts,
                    "Job re-queued for retry"
                );
            } else {
                tracing::warn!(
                    queue_id = %entry.id,
                    attempts = entry.attempts,
                    "Job failed after max attempts"
                );
            }
        }
    }

    Ok(true)
}
