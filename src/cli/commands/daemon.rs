//! Long-running commands: the scheduler daemon and the notification worker.

use console::style;
use realitytracker::config::{Config, Settings};
use realitytracker::notify::NotificationWorker;
use realitytracker::scheduler::Pipeline;
use tracing::info;

use crate::cli::helpers::{build_bus, build_engine, build_notifier, open_database};

/// Deliver queued notifications, once or until Ctrl-C.
pub async fn cmd_notify(settings: &Settings, once: bool) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let bus = build_bus(settings, &ctx).await?;
    let worker = NotificationWorker::new(ctx, bus, build_notifier(settings)?);

    if once {
        let processed = worker.run_once().await?;
        println!("{} Processed {} events", style("✓").green(), processed);
        return Ok(());
    }

    println!(
        "{} Notification worker running, press Ctrl-C to stop",
        style("→").cyan()
    );
    tokio::select! {
        _ = worker.run() => {}
        result = tokio::signal::ctrl_c() => result?,
    }
    println!("{} Stopped", style("✓").green());
    Ok(())
}

/// Run every scheduled job and the notification worker until Ctrl-C.
pub async fn cmd_daemon(settings: &Settings, config: &Config, warm_up: bool) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    info!("Starting daemon with config {}", config.hash());

    let (engine, bus) = build_engine(settings, &ctx).await?;
    let pipeline = Pipeline::new(
        ctx.clone(),
        engine,
        settings.http_client()?,
        settings.clone(),
    );

    let mut scheduler = pipeline.build_scheduler()?;
    scheduler.start();
    println!(
        "{} Scheduled jobs: {}",
        style("✓").green(),
        scheduler.job_ids().join(", ")
    );

    let worker = NotificationWorker::new(ctx, bus, build_notifier(settings)?);
    let worker_task = tokio::spawn(async move { worker.run().await });

    let warmup_task = warm_up.then(|| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.warm_up().await })
    });

    println!("{} Daemon running, press Ctrl-C to stop", style("→").cyan());
    tokio::signal::ctrl_c().await?;

    println!("{} Shutting down...", style("→").cyan());
    if let Some(task) = warmup_task {
        task.abort();
    }
    worker_task.abort();
    scheduler.shutdown().await;
    println!("{} Stopped", style("✓").green());
    Ok(())
}
