use crate::data_sync::config::ScheduleConfig;
use crate::data_sync::service::{SyncRunReport, SyncService};
use crate::error::{SyncError, SyncResult};
use eyre::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<SyncRunReport>> + Send + Sync>;

struct Job {
    name: String,
    period: Duration,
    run: JobFn,
}

/// Named periodic jobs with an explicit start/stop lifecycle.
///
/// Each job ticks on its own timer, first firing one period after `start`.
/// A job still running when its next tick comes due delays that tick rather
/// than overlapping with itself. Job errors are logged and never stop the
/// scheduler.
pub struct SyncScheduler {
    jobs: Vec<Job>,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// The products (incremental), tariffs and updates jobs, or none when
    /// scheduling is disabled
    pub fn for_service(service: Arc<SyncService>, schedule: &ScheduleConfig) -> Self {
        let mut scheduler = Self::new();
        if !schedule.enabled {
            info!("Scheduled syncs are disabled, registering no jobs");
            return scheduler;
        }

        let products = Arc::clone(&service);
        scheduler.add_job(
            "products",
            Duration::from_secs(schedule.products_interval_secs),
            Arc::new(move || {
                let service = Arc::clone(&products);
                async move { service.run_product_sync(false).await }.boxed()
            }),
        );

        let tariffs = Arc::clone(&service);
        scheduler.add_job(
            "tariffs",
            Duration::from_secs(schedule.tariffs_interval_secs),
            Arc::new(move || {
                let service = Arc::clone(&tariffs);
                async move { service.run_tariff_sync().await }.boxed()
            }),
        );

        scheduler.add_job(
            "updates",
            Duration::from_secs(schedule.updates_interval_secs),
            Arc::new(move || {
                let service = Arc::clone(&service);
                async move { service.run_update_sync().await }.boxed()
            }),
        );

        scheduler
    }

    pub fn add_job(&mut self, name: impl Into<String>, period: Duration, run: JobFn) -> &mut Self {
        self.jobs.push(Job {
            name: name.into(),
            period,
            run,
        });
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.shutdown_tx.is_some() {
            return Err(eyre::eyre!("SyncScheduler already started"));
        }
        if let Some(job) = self.jobs.iter().find(|job| job.period.is_zero()) {
            return Err(eyre::eyre!("Job {} has a zero period", job.name));
        }

        info!("Starting SyncScheduler with {} jobs", self.jobs.len());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for job in &self.jobs {
            let name = job.name.clone();
            let period = job.period;
            let run = Arc::clone(&job.run);
            let mut shutdown_rx = shutdown_rx.clone();

            self.tasks.push(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = ticker.tick() => {
                            info!("Scheduled {} sync triggered", name);
                            match run().await {
                                Ok(report) => info!(
                                    "Scheduled {} sync finished: {} succeeded, {} failed",
                                    name, report.succeeded, report.failed
                                ),
                                Err(SyncError::RunInProgress(sync_type)) => {
                                    warn!("Skipping scheduled {} sync, a {} run is in progress", name, sync_type)
                                }
                                Err(e) => error!("Scheduled {} sync failed: {}", name, e),
                            }
                        }
                    }
                }
            }));
        }

        self.shutdown_tx = Some(shutdown_tx);
        info!("SyncScheduler started successfully");
        Ok(())
    }

    /// Signal every job loop and wait for in-flight runs to finish
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping SyncScheduler");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Scheduler task error during shutdown: {}", e);
            }
        }

        info!("SyncScheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.tasks.iter().any(|task| !task.is_finished())
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running, tasks may be orphaned");
        }
    }
}
