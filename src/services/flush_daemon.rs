//! Periodic flush background daemon.
//!
//! Drives any [`PeriodicJob`] on a fixed interval. The strategy engine uses
//! it to drain dirty arms and rules to the pattern store every few seconds
//! so that recording an outcome never waits on storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;

/// A unit of work run repeatedly by the daemon.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Run one pass, returning how many items were processed.
    async fn run_once(&self) -> DomainResult<u64>;
}

/// Configuration for the flush daemon.
#[derive(Debug, Clone)]
pub struct FlushDaemonConfig {
    /// Interval between runs.
    pub interval: Duration,
    /// Whether to run immediately on start.
    pub run_on_startup: bool,
    /// Stop after this many failures in a row. `None` never gives up;
    /// failed flushes keep their keys dirty and the next tick retries them.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for FlushDaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            run_on_startup: false,
            max_consecutive_failures: None,
        }
    }
}

impl FlushDaemonConfig {
    /// Create config with custom interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }
}

/// Event emitted by the daemon.
#[derive(Debug, Clone)]
pub enum FlushDaemonEvent {
    Started,
    RunCompleted {
        run_number: u64,
        items: u64,
        duration_ms: u64,
    },
    RunFailed {
        run_number: u64,
        error: String,
    },
    Stopped {
        reason: StopReason,
    },
}

/// Reason the daemon stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Requested to stop.
    Requested,
    /// Too many consecutive failures.
    TooManyFailures,
}

/// Status of the daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_run: Option<Instant>,
    /// Items reported by successful runs.
    pub items_flushed: u64,
}

/// Handle to control a running daemon.
pub struct DaemonHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<DaemonStatus>>,
    task: JoinHandle<()>,
}

impl DaemonHandle {
    /// Request the daemon to stop after its current run.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Run the job now instead of waiting for the next tick.
    pub fn run_now(&self) {
        self.wake.notify_one();
    }

    /// Check if stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Get current daemon status.
    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }

    /// Wait for the daemon loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Flush daemon task ended abnormally");
        }
    }
}

/// Periodic flush daemon.
pub struct FlushDaemon<J: PeriodicJob> {
    job: Arc<J>,
    config: FlushDaemonConfig,
}

impl<J: PeriodicJob> FlushDaemon<J> {
    pub fn new(job: J, config: FlushDaemonConfig) -> Self {
        Self {
            job: Arc::new(job),
            config,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults(job: J) -> Self {
        Self::new(job, FlushDaemonConfig::default())
    }

    /// Get configuration.
    pub fn config(&self) -> &FlushDaemonConfig {
        &self.config
    }

    /// Spawn the daemon loop, returning its control handle and event stream.
    pub fn start(self) -> (DaemonHandle, mpsc::Receiver<FlushDaemonEvent>) {
        let (tx, rx) = mpsc::channel(100);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let status = Arc::new(RwLock::new(DaemonStatus::default()));

        let runner = Runner {
            job: self.job,
            config: self.config,
            stop_flag: stop_flag.clone(),
            wake: wake.clone(),
            status: status.clone(),
            tx,
        };
        let task = tokio::spawn(runner.run_loop());

        (
            DaemonHandle {
                stop_flag,
                wake,
                status,
                task,
            },
            rx,
        )
    }
}

struct Runner<J: PeriodicJob> {
    job: Arc<J>,
    config: FlushDaemonConfig,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<DaemonStatus>>,
    tx: mpsc::Sender<FlushDaemonEvent>,
}

impl<J: PeriodicJob> Runner<J> {
    // Events are best-effort: a slow or absent consumer must not stall flushing.
    fn emit(&self, event: FlushDaemonEvent) {
        let _ = self.tx.try_send(event);
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    async fn run_loop(self) {
        self.status.write().await.running = true;
        info!(job = self.job.name(), interval_ms = self.config.interval.as_millis() as u64, "Flush daemon started");
        self.emit(FlushDaemonEvent::Started);

        let mut consecutive_failures = 0u32;
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        if self.config.run_on_startup {
            self.run_cycle(&mut consecutive_failures).await;
        }

        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.wake.notified() => {}
            }

            if self.stop_requested() {
                break StopReason::Requested;
            }

            self.run_cycle(&mut consecutive_failures).await;

            if self
                .config
                .max_consecutive_failures
                .is_some_and(|max| consecutive_failures >= max)
            {
                break StopReason::TooManyFailures;
            }
        };

        self.status.write().await.running = false;
        info!(job = self.job.name(), ?reason, "Flush daemon stopped");
        self.emit(FlushDaemonEvent::Stopped { reason });
    }

    async fn run_cycle(&self, consecutive_failures: &mut u32) {
        let run_number = {
            let mut status = self.status.write().await;
            status.total_runs += 1;
            status.total_runs
        };

        let start = Instant::now();
        let result = self.job.run_once().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(items) => {
                *consecutive_failures = 0;
                {
                    let mut status = self.status.write().await;
                    status.successful_runs += 1;
                    status.last_run = Some(Instant::now());
                    status.items_flushed += items;
                }
                debug!(job = self.job.name(), run_number, items, duration_ms, "Periodic run completed");
                self.emit(FlushDaemonEvent::RunCompleted {
                    run_number,
                    items,
                    duration_ms,
                });
            }
            Err(e) => {
                *consecutive_failures += 1;
                {
                    let mut status = self.status.write().await;
                    status.failed_runs += 1;
                    status.last_run = Some(Instant::now());
                }
                warn!(job = self.job.name(), run_number, error = %e, "Periodic run failed");
                self.emit(FlushDaemonEvent::RunFailed {
                    run_number,
                    error: e.to_string(),
                });
            }
        }
    }
}
