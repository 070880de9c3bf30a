//! Scrape jobs and the periodic dispatch that fans them out.
//!
//! - [`run_scrape_job`]: scrape one feed and store whatever is new
//! - [`Dispatcher`]: spawn one independent job per feed on a `JoinSet`
//! - [`Scheduler`]: run the dispatcher on a fixed interval until shutdown
//!
//! Jobs never share state besides the database. A job that fails or panics
//! is logged when reaped and has no effect on the others.

use crate::config::ScheduleConfig;
use crate::models::Candidate;
use crate::scrapers::{ScrapeContext, scrape_feed};
use crate::store::{Database, InsertOutcome, StoreError};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Feed {0} does not exist")]
    FeedNotFound(i64),
}

/// Outcome of one scrape job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub feed_id: i64,
    /// Candidates produced by the strategy after normalization.
    pub scraped: usize,
    pub created: usize,
    pub existing: usize,
    /// Candidates whose insert failed.
    pub failed: usize,
}

/// Handle of a dispatched job, also recorded as the feed's `last_job_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub feed_id: i64,
}

/// Scrape the feed `feed_id` and store every candidate whose URL is new.
///
/// The strategy stream is drained completely before anything is written.
/// Contents already present are left as they are.
#[instrument(level = "info", skip(db, ctx))]
pub async fn run_scrape_job(
    db: &Database,
    ctx: &ScrapeContext,
    feed_id: i64,
) -> Result<JobReport, JobError> {
    let t0 = Instant::now();
    let feed = db
        .get_feed(feed_id)
        .await?
        .ok_or(JobError::FeedNotFound(feed_id))?;

    let candidates: Vec<Candidate> = scrape_feed(ctx, &feed).collect().await;

    let report = store_candidates(db, feed_id, &candidates).await;

    info!(
        feed = %feed,
        scraped = report.scraped,
        created = report.created,
        existing = report.existing,
        failed = report.failed,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Scrape job finished"
    );
    Ok(report)
}

/// Offer every candidate to the store. A failed insert is logged and
/// counted; the remaining candidates are still stored.
async fn store_candidates(db: &Database, feed_id: i64, candidates: &[Candidate]) -> JobReport {
    let mut report = JobReport {
        feed_id,
        scraped: candidates.len(),
        ..JobReport::default()
    };
    for candidate in candidates {
        match db.insert_content_if_absent(candidate).await {
            Ok(InsertOutcome::Created(content_id)) => {
                debug!(content_id, url = %candidate.url, "Stored new content");
                report.created += 1;
            }
            Ok(InsertOutcome::Existing) => report.existing += 1,
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "Could not store content; continuing");
                report.failed += 1;
            }
        }
    }
    report
}

/// Fans scrape jobs out onto the runtime, one task per feed.
pub struct Dispatcher {
    db: Database,
    ctx: Arc<ScrapeContext>,
    jobs: JoinSet<(JobHandle, Result<JobReport, JobError>)>,
}

impl Dispatcher {
    pub fn new(db: Database, ctx: Arc<ScrapeContext>) -> Self {
        Self {
            db,
            ctx,
            jobs: JoinSet::new(),
        }
    }

    /// Spawn a job for every feed and return the handles.
    ///
    /// Inactive feeds are dispatched too. Failing to record a handle on its
    /// feed is logged and the job still runs.
    #[instrument(level = "info", skip_all)]
    pub async fn dispatch_all(&mut self) -> Result<Vec<JobHandle>, StoreError> {
        self.reap();
        let feeds = self.db.list_feeds().await?;
        let mut handles = Vec::with_capacity(feeds.len());

        for feed in feeds {
            let handle = JobHandle {
                job_id: Uuid::new_v4().to_string(),
                feed_id: feed.id,
            };
            if let Err(e) = self.db.set_feed_last_job(feed.id, &handle.job_id).await {
                warn!(feed_id = feed.id, error = %e, "Could not record job id on feed");
            }

            let db = self.db.clone();
            let ctx = Arc::clone(&self.ctx);
            let job = handle.clone();
            self.jobs.spawn(async move {
                let result = run_scrape_job(&db, &ctx, job.feed_id).await;
                (job, result)
            });
            handles.push(handle);
        }

        info!(count = handles.len(), in_flight = self.jobs.len(), "Dispatched scrape jobs");
        Ok(handles)
    }

    /// Number of jobs not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    /// Wait for every outstanding job and return the successful reports.
    pub async fn wait_all(&mut self) -> Vec<JobReport> {
        let mut reports = Vec::new();
        while let Some(joined) = self.jobs.join_next().await {
            if let Some(report) = log_finished(joined) {
                reports.push(report);
            }
        }
        reports
    }

    /// Collect jobs that already finished without waiting on the others.
    fn reap(&mut self) {
        while let Some(joined) = self.jobs.try_join_next() {
            log_finished(joined);
        }
    }
}

fn log_finished(
    joined: Result<(JobHandle, Result<JobReport, JobError>), tokio::task::JoinError>,
) -> Option<JobReport> {
    match joined {
        Ok((_, Ok(report))) => Some(report),
        Ok((handle, Err(e))) => {
            error!(job_id = %handle.job_id, feed_id = handle.feed_id, error = %e, "Scrape job failed");
            None
        }
        Err(e) => {
            error!(error = %e, "Scrape job panicked or was cancelled");
            None
        }
    }
}

/// Periodic trigger for [`Dispatcher::dispatch_all`].
pub struct Scheduler {
    config: ScheduleConfig,
    dispatcher: Dispatcher,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher }
    }

    /// Dispatch every `interval` until `shutdown` resolves, then wait for
    /// the jobs still running.
    #[instrument(level = "info", skip_all, fields(interval_secs = self.config.interval_secs))]
    pub async fn run<S>(mut self, shutdown: S) -> Vec<JobReport>
    where
        S: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.run_on_start {
            // The first tick completes immediately.
            ticker.tick().await;
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(in_flight = self.dispatcher.in_flight(), "Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatcher.dispatch_all().await {
                        error!(error = %e, "Dispatch pass failed");
                    }
                }
            }
        }

        self.dispatcher.wait_all().await
    }
}
