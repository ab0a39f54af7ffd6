//! The background scheduler: one cooperative loop, minute-keyed jobs.
//!
//! Every 30 seconds the loop wakes, reads the wall-clock minute, and — if
//! the minute changed since the last pass — evaluates the job table. Jobs
//! run serially; a long job simply delays the rest. Each job is sandboxed:
//! a failure is logged and the loop continues. The stop signal is observed
//! at the sleep boundary.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, Timelike, Weekday};
use tokio::sync::watch;
use tracing::{error, info};

use crate::Runtime;

const TICK: Duration = Duration::from_secs(30);

/// Injectable wall clock so job predicates are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    NightConsolidation,
    WeeklySynthesis,
    GoalTick,
    SocialHeartbeat,
    DailyEmail,
    Backup,
    IdleResearch,
    FeedRead,
}

/// One scheduler job: a name for the logs and a due-predicate over the
/// clock and the scheduler's latch state.
struct Job {
    name: &'static str,
    kind: JobKind,
    due: fn(&Scheduler, DateTime<Local>) -> bool,
}

pub struct Scheduler {
    runtime: Arc<Runtime>,
    clock: Arc<dyn Clock>,
    stop: watch::Receiver<bool>,
    last_minute: Option<u32>,
    last_idle_hour: Option<u32>,
    last_feed_hour: Option<u32>,
    jobs: Vec<Job>,
}

fn job_table() -> Vec<Job> {
    vec![
        Job {
            name: "night consolidation",
            kind: JobKind::NightConsolidation,
            due: |scheduler, now| {
                now.hour() == scheduler.consolidation_hour() && now.minute() == 0
            },
        },
        Job {
            name: "weekly synthesis",
            kind: JobKind::WeeklySynthesis,
            due: |_, now| now.weekday() == Weekday::Sun && now.hour() == 3 && now.minute() == 0,
        },
        Job {
            name: "goal tick",
            kind: JobKind::GoalTick,
            due: |_, now| now.minute() == 15,
        },
        Job {
            name: "social heartbeat",
            kind: JobKind::SocialHeartbeat,
            due: |_, now| now.minute() == 0 || now.minute() == 30,
        },
        Job {
            name: "daily summary email",
            kind: JobKind::DailyEmail,
            due: |scheduler, now| {
                let (hour, minute) = scheduler.daily_email_time();
                now.hour() == hour
                    && now.minute() == minute
                    && scheduler.runtime.email.should_send_today()
            },
        },
        Job {
            name: "backup",
            kind: JobKind::Backup,
            due: |scheduler, now| {
                now.hour() == scheduler.consolidation_hour() && now.minute() == 5
            },
        },
        Job {
            name: "idle research",
            kind: JobKind::IdleResearch,
            due: |scheduler, now| {
                now.hour() % 4 == 0
                    && now.minute() == 30
                    && scheduler.last_idle_hour != Some(now.hour())
            },
        },
        Job {
            name: "feed read",
            kind: JobKind::FeedRead,
            due: |scheduler, now| {
                now.hour() % 6 == 0
                    && now.minute() == 45
                    && scheduler.last_feed_hour != Some(now.hour())
            },
        },
    ]
}

impl Scheduler {
    pub fn new(runtime: Arc<Runtime>, clock: Arc<dyn Clock>, stop: watch::Receiver<bool>) -> Self {
        Self {
            runtime,
            clock,
            stop,
            last_minute: None,
            last_idle_hour: None,
            last_feed_hour: None,
            jobs: job_table(),
        }
    }

    fn consolidation_hour(&self) -> u32 {
        self.runtime.config.read().expect("config lock").consolidation_hour()
    }

    fn daily_email_time(&self) -> (u32, u32) {
        self.runtime.config.read().expect("config lock").daily_email_time()
    }

    /// The long-running loop. Exits when the stop signal flips.
    pub async fn run(mut self) {
        info!(
            consolidation_hour = self.consolidation_hour(),
            "scheduler started"
        );
        loop {
            if *self.stop.borrow() {
                info!("scheduler stopping");
                return;
            }
            self.tick().await;

            let mut stop = self.stop.clone();
            tokio::select! {
                _ = tokio::time::sleep(TICK) => {}
                _ = stop.changed() => {}
            }
        }
    }

    /// One pass: latch on the minute, then run every due job serially.
    pub async fn tick(&mut self) {
        let now = self.clock.now();
        if self.last_minute == Some(now.minute()) {
            return;
        }
        self.last_minute = Some(now.minute());

        let due: Vec<(&'static str, JobKind)> = self
            .jobs
            .iter()
            .filter(|job| (job.due)(self, now))
            .map(|job| (job.name, job.kind))
            .collect();

        for (name, kind) in due {
            info!(job = name, "scheduled job starting");
            if let Err(err) = self.run_job(kind, now).await {
                error!(job = name, ?err, "scheduled job failed");
            }
            self.runtime.publish_event("scheduler", name, "completed");
        }
    }

    /// Which jobs would fire at `now`, without running them. Test surface.
    pub fn due_jobs(&self, now: DateTime<Local>) -> Vec<JobKind> {
        self.jobs
            .iter()
            .filter(|job| (job.due)(self, now))
            .map(|job| job.kind)
            .collect()
    }

    async fn run_job(&mut self, kind: JobKind, now: DateTime<Local>) -> anyhow::Result<()> {
        let runtime = &self.runtime;
        let ai_name = runtime.ai_name();

        match kind {
            JobKind::NightConsolidation => {
                runtime.run_night_consolidation().await?;
            }
            JobKind::WeeklySynthesis => {
                runtime
                    .memory
                    .run_weekly_synthesis(ai_name.as_deref(), now)
                    .await?;
            }
            JobKind::GoalTick => {
                runtime.goals.tick_knowledge().await?;
                runtime.goals.tick_philosophical().await?;
                runtime
                    .goals
                    .tick_personality(runtime.conversation_count())
                    .await?;
            }
            JobKind::SocialHeartbeat => {
                if runtime.moltbook.enabled() {
                    runtime.moltbook.heartbeat().await?;
                }
            }
            JobKind::DailyEmail => {
                runtime.email.send_daily_summary(ai_name.as_deref()).await?;
            }
            JobKind::Backup => {
                let outcome = runtime.backup.run_backup()?;
                runtime
                    .store
                    .log_activity("backup", "nightly backup", &outcome.filename, None)?;
            }
            JobKind::IdleResearch => {
                self.last_idle_hour = Some(now.hour());
                let processed = runtime
                    .curiosity
                    .process_queue(2, ai_name.as_deref(), Some(runtime.search.as_ref()))
                    .await?;
                if processed > 0 {
                    runtime.store.log_activity(
                        "research",
                        "idle curiosity research",
                        &format!("{processed} topics"),
                        None,
                    )?;
                }
            }
            JobKind::FeedRead => {
                self.last_feed_hour = Some(now.hour());
                if runtime.moltbook.enabled() {
                    runtime.moltbook.read_feed("hot", 10).await?;
                }
            }
        }
        Ok(())
    }
}
