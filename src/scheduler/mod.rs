//! Periodic job scheduler.
//!
//! Every job runs in its own task and awaits its body before waiting for
//! the next tick, so a job never overlaps itself. Different jobs run
//! concurrently. Tasks are kept as join handles and aborted on shutdown.

pub mod jobs;

pub use jobs::Pipeline;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("job '{0}' is already registered")]
    DuplicateJob(String),
}

/// When a job fires.
#[derive(Debug, Clone)]
pub enum Cadence {
    /// Every `Duration`, start to start. The first tick is one period after start.
    Interval(Duration),
    /// Calendar schedule in UTC (six-field cron with seconds).
    Cron(Box<Schedule>),
}

impl Cadence {
    pub fn every_minutes(minutes: u64) -> Self {
        Self::Interval(Duration::from_secs(minutes.max(1) * 60))
    }

    pub fn cron(expr: &str) -> Result<Self, SchedulerError> {
        Schedule::from_str(expr)
            .map(|s| Self::Cron(Box::new(s)))
            .map_err(|e| SchedulerError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            })
    }

    /// Time from `now` until the next cron fire. `None` for intervals or
    /// exhausted schedules.
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Interval(_) => None,
            Self::Cron(schedule) => schedule
                .after(&now)
                .next()
                .and_then(|at| (at - now).to_std().ok()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Interval(every) => format!("every {}s", every.as_secs()),
            Self::Cron(schedule) => format!("cron {}", schedule),
        }
    }
}

/// Body of a job; called once per tick.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Job {
    cadence: Cadence,
    task: JobFn,
}

/// Job table plus the handles of started jobs.
pub struct Scheduler {
    jobs: BTreeMap<String, Job>,
    handles: BTreeMap<String, JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            handles: BTreeMap::new(),
        }
    }

    pub fn add_job(
        &mut self,
        id: impl Into<String>,
        cadence: Cadence,
        task: JobFn,
    ) -> Result<(), SchedulerError> {
        let id = id.into();
        if self.jobs.contains_key(&id) {
            return Err(SchedulerError::DuplicateJob(id));
        }
        self.jobs.insert(id, Job { cadence, task });
        Ok(())
    }

    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    /// Spawn a task per registered job that is not already running.
    pub fn start(&mut self) {
        for (id, job) in &self.jobs {
            if self.handles.contains_key(id) {
                continue;
            }
            info!("Scheduling job {} ({})", id, job.cadence.describe());
            let handle = tokio::spawn(run_job(id.clone(), job.cadence.clone(), job.task.clone()));
            self.handles.insert(id.clone(), handle);
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.handles.get(id).is_some_and(|h| !h.is_finished())
    }

    /// Abort every job task and wait for them to stop.
    pub async fn shutdown(&mut self) {
        for (id, handle) in std::mem::take(&mut self.handles) {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Job {} ended abnormally: {}", id, e);
                }
            }
            debug!("Stopped job {}", id);
        }
    }
}

async fn run_job(id: String, cadence: Cadence, task: JobFn) {
    match cadence {
        Cadence::Interval(every) => {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                debug!("Running job {}", id);
                task().await;
            }
        }
        Cadence::Cron(_) => loop {
            let Some(wait) = cadence.until_next(Utc::now()) else {
                warn!("Job {} has no upcoming fire time, stopping", id);
                return;
            };
            tokio::time::sleep(wait).await;
            debug!("Running job {}", id);
            task().await;
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>, work: Duration) -> JobFn {
        Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(work).await;
            }
            .boxed()
        })
    }

    #[test]
    fn test_cron_next_fire() {
        let cadence = Cadence::cron("0 0 3 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 30, 0).unwrap();
        assert_eq!(cadence.until_next(now), Some(Duration::from_secs(30 * 60)));

        let quarterly = Cadence::cron("0 0 7 15 1,4,7,10 *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let next = now + chrono::Duration::from_std(quarterly.until_next(now).unwrap()).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2027, 1, 15, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_cron_and_duplicate_ids() {
        assert!(matches!(
            Cadence::cron("every tuesday"),
            Err(SchedulerError::InvalidCron { .. })
        ));

        let mut scheduler = Scheduler::new();
        let job = counting_job(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
        scheduler
            .add_job("dedup", Cadence::every_minutes(5), job.clone())
            .unwrap();
        assert!(matches!(
            scheduler.add_job("dedup", Cadence::every_minutes(5), job),
            Err(SchedulerError::DuplicateJob(_))
        ));
    }

    #[tokio::test]
    async fn test_interval_job_never_overlaps_itself() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        // Body takes longer than the period: ticks are skipped, not stacked.
        scheduler
            .add_job(
                "slow",
                Cadence::Interval(Duration::from_millis(20)),
                counting_job(counter.clone(), Duration::from_millis(100)),
            )
            .unwrap();
        scheduler.start();
        assert!(scheduler.is_running("slow"));

        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.shutdown().await;
        let runs = counter.load(Ordering::SeqCst);
        assert!((1..=3).contains(&runs), "unexpected run count {runs}");
        assert!(!scheduler.is_running("slow"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), runs);
    }
}
