//! Clock & Scheduler (spec.md §4.1 C1).
//!
//! Registers jobs as `(name, cron|interval, callback, cancel_token)`. Each
//! job runs on its own task; overlapping invocations of the same job are
//! never allowed — if a previous execution is still running, the tick is
//! skipped and a counter incremented. Cancellation propagates via
//! `tokio_util::sync::CancellationToken`; shutdown drains in-flight
//! callbacks up to a bounded window, then abandons them (spec §5).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type JobCallback = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

/// One field of a 6-field cron expression: `*`, `*/N`, a list, or a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    Any,
    Step(u32),
    List(Vec<u32>),
}

impl CronField {
    fn parse(s: &str) -> anyhow::Result<Self> {
        if s == "*" {
            return Ok(CronField::Any);
        }
        if let Some(step) = s.strip_prefix("*/") {
            return Ok(CronField::Step(step.parse()?));
        }
        if let Some((lo, hi)) = s.split_once('-') {
            let lo: u32 = lo.parse()?;
            let hi: u32 = hi.parse()?;
            return Ok(CronField::List((lo..=hi).collect()));
        }
        let values: Result<Vec<u32>, _> = s.split(',').map(str::parse).collect();
        Ok(CronField::List(values?))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Step(n) => *n != 0 && value % n == 0,
            CronField::List(values) => values.contains(&value),
        }
    }
}

/// A 6-field cron expression: `sec min hour dom mon dow` (spec §4.1).
#[derive(Debug, Clone)]
pub struct CronExpr {
    sec: CronField,
    min: CronField,
    hour: CronField,
    dom: CronField,
    mon: CronField,
    dow: CronField,
}

impl CronExpr {
    pub fn parse(expr: &str) -> anyhow::Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        anyhow::ensure!(fields.len() == 6, "cron expression must have 6 fields, got {}", fields.len());
        Ok(Self {
            sec: CronField::parse(fields[0])?,
            min: CronField::parse(fields[1])?,
            hour: CronField::parse(fields[2])?,
            dom: CronField::parse(fields[3])?,
            mon: CronField::parse(fields[4])?,
            dow: CronField::parse(fields[5])?,
        })
    }

    #[must_use]
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.sec.matches(at.second())
            && self.min.matches(at.minute())
            && self.hour.matches(at.hour())
            && self.dom.matches(at.day())
            && self.mon.matches(at.month())
            && self.dow.matches(at.weekday().num_days_from_sunday())
    }
}

/// A job's trigger: a cron expression or a fixed-period monotonic timer.
#[derive(Debug, Clone)]
pub enum Schedule {
    Cron(CronExpr),
    Interval(Duration),
}

/// Per-job bookkeeping: overlap guard and skip counter.
#[derive(Default)]
struct JobStats {
    running: AtomicBool,
    skipped_overlaps: AtomicU64,
    runs: AtomicU64,
}

/// A point-in-time read of one job's run counters, for the diagnostics
/// endpoint (spec §5/§7: "metrics counters").
#[derive(Debug, Clone)]
pub struct JobStatsSnapshot {
    pub name: String,
    pub runs: u64,
    pub skipped_overlaps: u64,
}

struct RegisteredJob {
    name: String,
    schedule: Schedule,
    callback: JobCallback,
    stats: Arc<JobStats>,
}

/// The scheduler: owns every registered job's background task.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<RegisteredJob>,
    started: Vec<(String, Arc<JobStats>)>,
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self { jobs: Vec::new(), started: Vec::new(), handles: Vec::new(), cancel: CancellationToken::new() }
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register a job. Does not start it; call `start` to spawn all
    /// registered jobs' tasks.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, schedule: Schedule, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.jobs.push(RegisteredJob {
            name: name.into(),
            schedule,
            callback: Arc::new(move || Box::pin(callback())),
            stats: Arc::new(JobStats::default()),
        });
    }

    /// Spawn every registered job on its own task.
    pub fn start(&mut self) {
        let jobs = std::mem::take(&mut self.jobs);
        for job in jobs {
            let cancel = self.cancel.clone();
            self.started.push((job.name.clone(), Arc::clone(&job.stats)));
            self.handles.push(tokio::spawn(run_job(job.name, job.schedule, job.callback, job.stats, cancel)));
        }
    }

    /// Snapshot every started job's run/skip counters (spec §5/§7).
    #[must_use]
    pub fn job_stats(&self) -> Vec<JobStatsSnapshot> {
        self.started
            .iter()
            .map(|(name, stats)| JobStatsSnapshot {
                name: name.clone(),
                runs: stats.runs.load(Ordering::Relaxed),
                skipped_overlaps: stats.skipped_overlaps.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Cancel the root context and wait up to `drain` for in-flight
    /// callbacks, then abandon remaining tasks (spec §5 "Graceful shutdown").
    pub async fn shutdown(self, drain: Duration) {
        self.cancel.cancel();
        let _ = tokio::time::timeout(drain, futures::future::join_all(self.handles)).await;
    }
}

async fn run_job(name: String, schedule: Schedule, callback: JobCallback, stats: Arc<JobStats>, cancel: CancellationToken) {
    loop {
        let wait = match &schedule {
            Schedule::Interval(d) => *d,
            Schedule::Cron(_) => Duration::from_secs(1),
        };
        tokio::select! {
            () = cancel.cancelled() => {
                info!(job = %name, "scheduler job cancelled");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }

        let should_fire = match &schedule {
            Schedule::Interval(_) => true,
            Schedule::Cron(expr) => expr.matches(Utc::now()),
        };
        if !should_fire {
            continue;
        }

        if stats.running.swap(true, Ordering::AcqRel) {
            stats.skipped_overlaps.fetch_add(1, Ordering::Relaxed);
            warn!(job = %name, "skipping tick: previous invocation still running");
            continue;
        }

        stats.runs.fetch_add(1, Ordering::Relaxed);
        let cb = Arc::clone(&callback);
        let fut = cb();
        fut.await;
        stats.running.store(false, Ordering::Release);
    }
}
