//! Cron-driven scheduled agent runs.
//!
//! Jobs are declared in a YAML file and evaluated against wall-clock time by
//! a tick loop. A due job runs `service.run` to completion in the
//! background and optionally appends its result to a per-job log file.
//! Overlapping firings of one job are serialized: if the previous run is
//! still going, the new firing is skipped with a log entry. Missed firings
//! while the daemon was down are not backfilled.

use chrono::{DateTime, Timelike, Utc};
use croner::Cron;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use agentgw_service::AgentService;

/// Seconds between scheduler ticks. Cron granularity is one minute, so a
/// few ticks per minute is plenty.
const TICK_SECS: u64 = 15;

/// A scheduled job declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledJob {
    pub name: String,
    pub skill_name: String,
    pub message: String,
    pub cron_expression: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub log_output: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct JobsFile {
    #[serde(default)]
    jobs: Vec<ScheduledJob>,
}

/// Parse the jobs YAML file. A missing or malformed file yields no jobs.
pub fn load_jobs(path: &Path) -> Vec<ScheduledJob> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            info!(path = %path.display(), "No scheduler config found");
            return Vec::new();
        }
    };

    match serde_yaml::from_str::<JobsFile>(&content) {
        Ok(file) => file.jobs,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to parse scheduler config");
            Vec::new()
        }
    }
}

struct JobEntry {
    job: ScheduledJob,
    cron: Cron,
    running: AtomicBool,
    last_fired: Mutex<Option<DateTime<Utc>>>,
}

impl JobEntry {
    /// Whether the job should fire at `now`. A minute that already fired is
    /// not fired again, regardless of tick cadence.
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        let minute = truncate_to_minute(now);
        if !self.cron.is_time_matching(&minute).unwrap_or(false) {
            return false;
        }
        let mut last = self.last_fired.lock().expect("last_fired lock poisoned");
        if *last == Some(minute) {
            return false;
        }
        *last = Some(minute);
        true
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// The cron scheduler. Shares the service with interactive clients.
pub struct CronScheduler {
    service: Arc<AgentService>,
    log_dir: PathBuf,
    jobs: Vec<Arc<JobEntry>>,
}

impl CronScheduler {
    pub fn new(service: Arc<AgentService>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            log_dir: log_dir.into(),
            jobs: Vec::new(),
        }
    }

    /// Register a job. Disabled jobs are skipped; an invalid cron expression
    /// rejects the job with an error log.
    pub fn add_job(&mut self, job: ScheduledJob) {
        if !job.enabled {
            info!(job = %job.name, "Job is disabled, skipping");
            return;
        }

        let cron = match Cron::new(&job.cron_expression).parse() {
            Ok(cron) => cron,
            Err(e) => {
                error!(job = %job.name, cron = %job.cron_expression, error = %e, "Invalid cron expression");
                return;
            }
        };

        info!(job = %job.name, cron = %job.cron_expression, "Scheduled job");
        self.jobs.push(Arc::new(JobEntry {
            job,
            cron,
            running: AtomicBool::new(false),
            last_fired: Mutex::new(None),
        }));
    }

    /// Load and register every enabled job from a YAML file.
    pub fn load_from_file(&mut self, path: &Path) {
        for job in load_jobs(path) {
            self.add_job(job);
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Job summaries for the status endpoint.
    pub fn summaries(&self) -> Vec<serde_json::Value> {
        self.jobs
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "name": entry.job.name,
                    "skill": entry.job.skill_name,
                    "cron": entry.job.cron_expression,
                    "enabled": entry.job.enabled,
                    "running": entry.running.load(Ordering::SeqCst),
                })
            })
            .collect()
    }

    /// Start the tick loop. Runs until `cancel` trips.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        info!(jobs = self.jobs.len(), "Scheduler started");
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(TICK_SECS));
            interval.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Scheduler shutting down");
                        return;
                    }
                    _ = interval.tick() => {}
                }

                let now = Utc::now();
                for entry in &self.jobs {
                    if entry.is_due(now) {
                        self.clone().fire(entry.clone());
                    }
                }
            }
        })
    }

    /// Fire one job in the background, unless its previous run is still
    /// going.
    fn fire(self: Arc<Self>, entry: Arc<JobEntry>) {
        if entry.running.swap(true, Ordering::SeqCst) {
            warn!(job = %entry.job.name, "Previous run still in progress, skipping this firing");
            return;
        }

        tokio::spawn(async move {
            execute_job(&self.service, &self.log_dir, &entry.job).await;
            entry.running.store(false, Ordering::SeqCst);
        });
    }
}

/// Run one job to completion and log its output if configured.
pub async fn execute_job(service: &AgentService, log_dir: &Path, job: &ScheduledJob) {
    let started = Utc::now();
    info!(job = %job.name, skill = %job.skill_name, "Executing scheduled job");

    match service.run(&job.skill_name, &job.message, None).await {
        Ok((session_id, result)) => {
            if job.log_output {
                write_job_log(log_dir, job, &started, &session_id, &result);
            }
            info!(job = %job.name, "Scheduled job completed");
        }
        Err(e) => {
            error!(job = %job.name, error = %e, "Scheduled job failed");
        }
    }
}

fn write_job_log(
    log_dir: &Path,
    job: &ScheduledJob,
    started: &DateTime<Utc>,
    session_id: &str,
    result: &str,
) {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        warn!(dir = %log_dir.display(), error = %e, "Cannot create log directory");
        return;
    }

    let file = log_dir.join(format!(
        "{}-{}.log",
        job.name,
        started.format("%Y%m%d-%H%M%S")
    ));
    let content = format!(
        "Executed: {}\nSkill: {}\nSession: {}\nMessage: {}\nResult:\n{}\n",
        started.to_rfc3339(),
        job.skill_name,
        session_id,
        job.message,
        result
    );

    match std::fs::write(&file, content) {
        Ok(()) => info!(file = %file.display(), "Job output logged"),
        Err(e) => warn!(file = %file.display(), error = %e, "Failed to write job log"),
    }
}
