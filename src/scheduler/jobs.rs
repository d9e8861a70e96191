//! The daemon's jobs and the wiring that registers them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{Cadence, JobFn, Scheduler, SchedulerError};
use crate::config::Settings;
use crate::dedup::DedupEngine;
use crate::feeds::{self, MfRentalFeed, RealityMixFeed};
use crate::ingest::IngestionEngine;
use crate::repository::DbContext;
use crate::scrapers::{build_adapter, HttpClient, KNOWN_SOURCES};
use crate::spatial;

/// Gap between source runs during warm-up.
pub const WARMUP_STAGGER: Duration = Duration::from_secs(5);

pub const ZONE_PIPELINE_JOB: &str = "zone_pipeline";
pub const REALITYMIX_JOB: &str = "realitymix";
pub const MF_RENTAL_JOB: &str = "mf_rental";

/// Everything a job needs, shared by all of them.
#[derive(Clone)]
pub struct Pipeline {
    ctx: DbContext,
    engine: IngestionEngine,
    dedup: DedupEngine,
    client: HttpClient,
    settings: Arc<Settings>,
    /// One cycle per source at a time, across the warm-up and the scheduler.
    source_locks: Arc<HashMap<&'static str, Arc<Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        ctx: DbContext,
        engine: IngestionEngine,
        client: HttpClient,
        settings: Settings,
    ) -> Self {
        Self {
            dedup: DedupEngine::new(ctx.clone()),
            ctx,
            engine,
            client,
            settings: Arc::new(settings),
            source_locks: Arc::new(
                KNOWN_SOURCES
                    .iter()
                    .map(|id| (*id, Arc::new(Mutex::new(()))))
                    .collect(),
            ),
        }
    }

    fn source_lock(&self, source: &str) -> Option<Arc<Mutex<()>>> {
        self.source_locks.get(source).cloned()
    }

    /// Sources that are both known and enabled.
    pub fn enabled_sources(&self) -> Vec<&'static str> {
        KNOWN_SOURCES
            .iter()
            .copied()
            .filter(|id| self.settings.source(id).enabled)
            .collect()
    }

    /// One ingestion cycle followed by a dedup pass. A second call for the
    /// same source waits for the running cycle to finish.
    pub async fn run_source(&self, source: &str) {
        let Some(lock) = self.source_lock(source) else {
            warn!("No adapter registered for source '{}'", source);
            return;
        };
        let _guard = lock.lock().await;

        let max = self.settings.source(source).max_listings;
        let Some(adapter) = build_adapter(source, self.client.clone(), max) else {
            warn!("No adapter registered for source '{}'", source);
            return;
        };

        match self.engine.run_cycle(adapter.as_ref()).await {
            Ok(report) => info!(
                "[{}] Run {} finished: {} found, {} new, {} updated, {} removed",
                source,
                report.run_id,
                report.counts.found,
                report.counts.new,
                report.counts.updated,
                report.removed
            ),
            Err(e) => error!("[{}] Ingestion cycle failed: {}", source, e),
        }

        self.run_dedup().await;
    }

    pub async fn run_dedup(&self) {
        match self.dedup.run().await {
            Ok(0) => {}
            Ok(n) => info!("Dedup linked {} listings", n),
            Err(e) => error!("Dedup pass failed: {}", e),
        }
    }

    pub async fn run_zone_pipeline(&self) {
        let (assigned, computed) = spatial::run_zone_pipeline(&self.ctx).await;
        info!(
            "Zone pipeline: {} listings assigned, {} benchmark rows",
            assigned, computed
        );
    }

    pub async fn run_realitymix(&self) {
        let feed = RealityMixFeed::new(self.client.clone());
        match feeds::refresh(&self.ctx, &feed).await {
            Ok(n) => info!("RealityMix: stored {} reference points", n),
            Err(e) => error!("RealityMix refresh failed: {}", e),
        }
    }

    pub async fn run_mf_rental(&self) {
        let feed = MfRentalFeed::new(
            self.client.clone(),
            self.settings.mf_rental_endpoint.clone(),
        );
        match feeds::refresh(&self.ctx, &feed).await {
            Ok(n) => info!("MF rental: stored {} reference points", n),
            Err(e) => error!("MF rental refresh failed: {}", e),
        }
    }

    /// Startup sequence: zones, every enabled source (staggered), the zone
    /// pipeline, then RealityMix.
    pub async fn warm_up(&self) {
        info!("Warm-up started");
        match spatial::load_zones(&self.ctx, None).await {
            Ok(n) => info!("Loaded {} zones", n),
            Err(e) => error!("Zone load failed: {}", e),
        }

        for (i, source) in self.enabled_sources().into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(WARMUP_STAGGER).await;
            }
            self.run_source(source).await;
        }

        self.run_zone_pipeline().await;
        self.run_realitymix().await;
        info!("Warm-up finished");
    }

    fn job<F, Fut>(&self, body: F) -> JobFn
    where
        F: Fn(Pipeline) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let pipeline = self.clone();
        Arc::new(move || body(pipeline.clone()).boxed())
    }

    /// Register the per-source interval jobs and the cron jobs.
    pub fn build_scheduler(&self) -> Result<Scheduler, SchedulerError> {
        let mut scheduler = Scheduler::new();

        for source in self.enabled_sources() {
            let cadence = Cadence::Interval(self.settings.source(source).interval());
            let task = self.job(move |p| async move { p.run_source(source).await });
            scheduler.add_job(source, cadence, task)?;
        }

        scheduler.add_job(
            ZONE_PIPELINE_JOB,
            Cadence::cron(&self.settings.zone_pipeline_cron)?,
            self.job(|p| async move { p.run_zone_pipeline().await }),
        )?;
        scheduler.add_job(
            REALITYMIX_JOB,
            Cadence::cron(&self.settings.realitymix_cron)?,
            self.job(|p| async move { p.run_realitymix().await }),
        )?;
        scheduler.add_job(
            MF_RENTAL_JOB,
            Cadence::cron(&self.settings.mf_rental_cron)?,
            self.job(|p| async move { p.run_mf_rental().await }),
        )?;

        Ok(scheduler)
    }
}
