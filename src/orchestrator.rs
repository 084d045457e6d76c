use crate::cache::{cache_key, ResponseCache};
use crate::error::FetchError;
use crate::model::{ReleaseItem, TrendingItem, TrendingList, Window};
use crate::retry::{with_backoff, RetryPolicy};
use crate::sources::Sources;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Tv,
    Movies,
    Trending,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Tv => "tv",
            SourceKind::Movies => "movies",
            SourceKind::Trending => "trending",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchTask {
    TvHistory,
    TvCalendar,
    MovieHistory,
    MovieCalendar,
    Trending(TrendingList),
}

impl FetchTask {
    pub fn source(&self) -> SourceKind {
        match self {
            FetchTask::TvHistory | FetchTask::TvCalendar => SourceKind::Tv,
            FetchTask::MovieHistory | FetchTask::MovieCalendar => SourceKind::Movies,
            FetchTask::Trending(_) => SourceKind::Trending,
        }
    }
}

impl fmt::Display for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTask::TvHistory => f.write_str("tv history"),
            FetchTask::TvCalendar => f.write_str("tv calendar"),
            FetchTask::MovieHistory => f.write_str("movie history"),
            FetchTask::MovieCalendar => f.write_str("movie calendar"),
            FetchTask::Trending(list) => write!(f, "trending {}", list.path()),
        }
    }
}

#[derive(Debug)]
pub enum Payload {
    Releases(Vec<ReleaseItem>),
    Trending(Vec<TrendingItem>),
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub task: FetchTask,
    pub payload: Payload,
    pub error: Option<FetchError>,
}

impl FetchOutcome {
    fn failed(task: FetchTask, error: FetchError) -> Self {
        let payload = match task {
            FetchTask::Trending(_) => Payload::Trending(Vec::new()),
            _ => Payload::Releases(Vec::new()),
        };
        Self {
            task,
            payload,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchPlan {
    pub downloaded: Window,
    pub upcoming: Window,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct FetchReport {
    pub launched: usize,
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchReport {
    pub fn outcome(&self, task: FetchTask) -> Option<&FetchOutcome> {
        self.outcomes.iter().find(|o| o.task == task)
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    sources: Sources,
    cache: Arc<ResponseCache>,
    ttl: Duration,
}

impl Orchestrator {
    pub fn new(sources: Sources, cache: Arc<ResponseCache>, ttl: Duration) -> Self {
        Self { sources, cache, ttl }
    }

    pub fn plan(&self) -> Vec<FetchTask> {
        let mut tasks = Vec::new();
        if self.sources.tv.is_some() {
            tasks.push(FetchTask::TvHistory);
            tasks.push(FetchTask::TvCalendar);
        }
        if self.sources.movies.is_some() {
            tasks.push(FetchTask::MovieHistory);
            tasks.push(FetchTask::MovieCalendar);
        }
        if self.sources.trending.is_some() {
            tasks.extend(self.sources.trending_lists.iter().map(|l| FetchTask::Trending(*l)));
        }
        tasks
    }

    // Exactly one outcome per launched task, even if a task panics.
    pub async fn fetch_all(&self, plan: &FetchPlan) -> FetchReport {
        let tasks = self.plan();
        let deadline = Instant::now() + plan.timeout;
        let mut set = JoinSet::new();

        for task in &tasks {
            let task = *task;
            let this = self.clone();
            let plan = *plan;
            set.spawn(async move {
                let result = timeout_at(deadline, this.run_task(task, &plan, deadline))
                    .await
                    .unwrap_or(Err(FetchError::DeadlineExceeded));
                match result {
                    Ok(payload) => FetchOutcome {
                        task,
                        payload,
                        error: None,
                    },
                    Err(e) => FetchOutcome::failed(task, e),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut reported = HashSet::with_capacity(tasks.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome.error {
                        None => debug!("{} finished", outcome.task),
                        Some(e) => warn!("{} failed: {}", outcome.task, e),
                    }
                    reported.insert(outcome.task);
                    outcomes.push(outcome);
                }
                Err(join_err) => error!("Fetch task died: {}", join_err),
            }
        }
        // A task that panicked never reported; account for it explicitly.
        for task in &tasks {
            if !reported.contains(task) {
                outcomes.push(FetchOutcome::failed(
                    *task,
                    FetchError::TaskFailed(format!("{} did not report", task)),
                ));
            }
        }
        outcomes.sort_by_key(|o| o.task);

        FetchReport {
            launched: tasks.len(),
            outcomes,
        }
    }

    async fn run_task(
        &self,
        task: FetchTask,
        plan: &FetchPlan,
        deadline: Instant,
    ) -> Result<Payload, FetchError> {
        let label = task.to_string();
        match task {
            FetchTask::TvHistory
            | FetchTask::MovieHistory
            | FetchTask::TvCalendar
            | FetchTask::MovieCalendar => {
                let (slot, name) = match task.source() {
                    SourceKind::Tv => (&self.sources.tv, "tv library"),
                    _ => (&self.sources.movies, "movie library"),
                };
                let source = slot.clone().ok_or(FetchError::NotConfigured(name))?;
                let history = matches!(task, FetchTask::TvHistory | FetchTask::MovieHistory);
                let window = if history { plan.downloaded } else { plan.upcoming };
                let key = cache_key(
                    source.service(),
                    if history { "history" } else { "calendar" },
                    &source.identity(),
                    &[window.start_timestamp(), window.end_timestamp()],
                );
                let items = self
                    .read_through(key, || {
                        with_backoff(plan.retry, deadline, &label, || {
                            if history {
                                source.history(window)
                            } else {
                                source.calendar(window)
                            }
                        })
                    })
                    .await?;
                Ok(Payload::Releases(items))
            }
            FetchTask::Trending(list) => {
                let source = self
                    .sources
                    .trending
                    .clone()
                    .ok_or(FetchError::NotConfigured("trending"))?;
                let day = plan.upcoming.start_timestamp();
                let key = cache_key("trakt", list.path(), &source.identity(), &[day]);
                let items = self
                    .read_through(key, || {
                        with_backoff(plan.retry, deadline, &label, || source.list(list))
                    })
                    .await?;
                Ok(Payload::Trending(items))
            }
        }
    }

    async fn read_through<T, F, Fut>(&self, key: String, fetch: F) -> Result<T, FetchError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if let Some(hit) = self.cache.get_as::<T>(&key).await {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        }
        let value = fetch().await?;
        self.cache.set_as(key, &value, self.ttl).await;
        Ok(value)
    }
}
