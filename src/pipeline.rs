use crate::cache::ResponseCache;
use crate::config::{
    Config, BACKOFF_BASE, CACHE_TTL, PREVIEW_ATTEMPTS, PREVIEW_DEADLINE, SCHEDULED_ATTEMPTS,
    SCHEDULED_DEADLINE,
};
use crate::error::PipelineError;
use crate::mailer::{Mailer, Newsletter};
use crate::model::{AggregateResult, Window};
use crate::normalize::{normalize, NormalizeOptions};
use crate::orchestrator::{FetchPlan, Orchestrator, SourceKind};
use crate::policy::{self, Verdict};
use crate::render::Renderer;
use crate::retry::RetryPolicy;
use crate::sources::Sources;
use anyhow::{Context, Result};
use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Scheduled,
    Preview,
}

impl RunMode {
    pub fn retry_policy(self) -> RetryPolicy {
        match self {
            RunMode::Scheduled => RetryPolicy::new(SCHEDULED_ATTEMPTS, BACKOFF_BASE),
            RunMode::Preview => RetryPolicy::new(PREVIEW_ATTEMPTS, BACKOFF_BASE),
        }
    }

    pub fn deadline(self) -> Duration {
        match self {
            RunMode::Scheduled => SCHEDULED_DEADLINE,
            RunMode::Preview => PREVIEW_DEADLINE,
        }
    }
}

/// Downloaded window `[today - back, today + 1)` and upcoming window
/// `[today, today + ahead)`.
pub fn windows(today: NaiveDate, days_back: i64, days_ahead: i64) -> (Window, Window) {
    let shift = |n: i64| {
        if n >= 0 {
            today.checked_add_days(Days::new(n as u64))
        } else {
            today.checked_sub_days(Days::new(n.unsigned_abs()))
        }
        .unwrap_or(today)
    };
    let downloaded = Window {
        start: shift(-days_back),
        end: shift(1),
    };
    let upcoming = Window {
        start: today,
        end: shift(days_ahead),
    };
    (downloaded, upcoming)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    Sent { recipients: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub runs: u64,
    pub sends: u64,
    pub skipped: u64,
    pub aborted: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_item_count: usize,
    pub last_failed_sources: Vec<String>,
}

/// A send submitted to the runtime. Await [`SendHandle::wait`] for the
/// outcome or drop the handle to let it finish detached.
#[derive(Debug)]
pub struct SendHandle(JoinHandle<Result<SendOutcome>>);

impl SendHandle {
    pub async fn wait(self) -> Result<SendOutcome> {
        self.0.await.context("Send task did not complete")?
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

pub struct Pipeline {
    config: Arc<Config>,
    orchestrator: Orchestrator,
    renderer: Arc<dyn Renderer>,
    mailer: Arc<dyn Mailer>,
    stats: Mutex<RunStats>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        sources: Sources,
        cache: Arc<ResponseCache>,
        renderer: Arc<dyn Renderer>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            orchestrator: Orchestrator::new(sources, cache, CACHE_TTL),
            renderer,
            mailer,
            stats: Mutex::new(RunStats::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn stats(&self) -> RunStats {
        self.stats.lock().await.clone()
    }

    pub async fn build_digest(&self, mode: RunMode) -> Result<AggregateResult, PipelineError> {
        self.build_digest_on(mode, Local::now().date_naive()).await
    }

    pub async fn build_digest_on(
        &self,
        mode: RunMode,
        today: NaiveDate,
    ) -> Result<AggregateResult, PipelineError> {
        let (downloaded, upcoming) = windows(today, self.config.days_back, self.config.days_ahead);
        let plan = FetchPlan {
            downloaded,
            upcoming,
            retry: mode.retry_policy(),
            timeout: mode.deadline(),
        };
        info!(
            "Starting {:?} run: downloaded {}..{}, upcoming {}..{}",
            mode,
            downloaded.start_str(),
            downloaded.end_str(),
            upcoming.start_str(),
            upcoming.end_str()
        );

        let report = self.orchestrator.fetch_all(&plan).await;
        let dropped = match policy::evaluate(&report) {
            Verdict::Proceed { dropped } => dropped,
            Verdict::Abort(e) if mode == RunMode::Preview => {
                warn!("Preview continuing without library data: {}", e);
                vec![SourceKind::Tv, SourceKind::Movies]
            }
            Verdict::Abort(e) => {
                error!("Run aborted: {}", e);
                let failed = match &e {
                    PipelineError::AllSourcesFailed { failed } => failed.clone(),
                    PipelineError::NoSourcesConfigured => Vec::new(),
                };
                self.record_run(0, failed, true).await;
                return Err(e);
            }
        };

        let (buckets, trending) = policy::collect(report, &dropped);
        let options = NormalizeOptions {
            show_unmonitored: self.config.show_unmonitored,
            show_upgraded: self.config.show_upgraded,
        };
        let library = normalize(buckets, options, &downloaded);

        let digest = AggregateResult {
            downloaded_shows: library.downloaded_shows,
            upcoming_shows: library.upcoming_shows,
            downloaded_movies: library.downloaded_movies,
            upcoming_movies: library.upcoming_movies,
            trending,
            downloaded_from: downloaded.start_str(),
            downloaded_to: downloaded.end_str(),
            upcoming_from: upcoming.start_str(),
            upcoming_to: upcoming.end_str(),
        };
        self.record_run(
            digest.library_item_count() + digest.trending_item_count(),
            dropped.iter().map(|s| s.to_string()).collect(),
            false,
        )
        .await;
        Ok(digest)
    }

    pub async fn preview(&self) -> Result<String> {
        let digest = self.build_digest(RunMode::Preview).await?;
        self.renderer.render(&digest).context("Failed to render preview")
    }

    /// Builds, renders and mails one scheduled digest. A policy abort comes
    /// back as a [`PipelineError`] inside the `anyhow::Error`.
    pub async fn send(&self) -> Result<SendOutcome> {
        let digest = self.build_digest(RunMode::Scheduled).await?;

        let outcome = if self.config.recipients.is_empty() {
            SendOutcome::Skipped {
                reason: "no recipients configured".to_string(),
            }
        } else if digest.is_empty() {
            SendOutcome::Skipped {
                reason: "nothing to report".to_string(),
            }
        } else {
            let html = self.renderer.render(&digest).context("Failed to render digest")?;
            let newsletter = Newsletter {
                subject: self.config.subject.clone(),
                html,
                recipients: self.config.recipients.clone(),
            };
            self.mailer
                .send(&newsletter)
                .await
                .context("Failed to deliver digest")?;
            SendOutcome::Sent {
                recipients: newsletter.recipients.len(),
            }
        };

        let mut stats = self.stats.lock().await;
        match &outcome {
            SendOutcome::Sent { recipients } => {
                stats.sends += 1;
                info!("Digest sent to {} recipients", recipients);
            }
            SendOutcome::Skipped { reason } => {
                stats.skipped += 1;
                warn!("Digest skipped: {}", reason);
            }
        }
        Ok(outcome)
    }

    pub fn submit_send(self: &Arc<Self>) -> SendHandle {
        let this = Arc::clone(self);
        SendHandle(tokio::spawn(async move {
            let result = this.send().await;
            if let Err(e) = &result {
                error!("Submitted send failed: {:#}", e);
            }
            result
        }))
    }

    async fn record_run(&self, items: usize, failed: Vec<String>, aborted: bool) {
        let mut stats = self.stats.lock().await;
        stats.runs += 1;
        if aborted {
            stats.aborted += 1;
        }
        stats.last_run = Some(Utc::now());
        stats.last_item_count = items;
        stats.last_failed_sources = failed;
    }
}

pub fn is_policy_abort(err: &anyhow::Error) -> bool {
    err.downcast_ref::<PipelineError>().is_some()
}
