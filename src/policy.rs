use crate::error::PipelineError;
use crate::model::{TrendingItem, TrendingList};
use crate::normalize::LibraryBuckets;
use crate::orchestrator::{FetchReport, FetchTask, Payload, SourceKind};
use std::collections::BTreeSet;
use tracing::warn;

#[derive(Debug)]
pub enum Verdict {
    Proceed { dropped: Vec<SourceKind> },
    Abort(PipelineError),
}

/// A library source counts as failed when any of its calls failed. Trending
/// never influences the verdict.
pub fn evaluate(report: &FetchReport) -> Verdict {
    let mut launched = BTreeSet::new();
    let mut failed = BTreeSet::new();
    for outcome in &report.outcomes {
        let source = outcome.task.source();
        if source == SourceKind::Trending {
            continue;
        }
        launched.insert(source);
        if !outcome.is_ok() {
            failed.insert(source);
        }
    }

    if launched.is_empty() {
        return Verdict::Abort(PipelineError::NoSourcesConfigured);
    }
    if failed.len() == launched.len() {
        return Verdict::Abort(PipelineError::AllSourcesFailed {
            failed: failed.iter().map(|s| s.to_string()).collect(),
        });
    }
    for source in &failed {
        warn!("Dropping {} source from this run after fetch failure", source);
    }
    Verdict::Proceed {
        dropped: failed.into_iter().collect(),
    }
}

pub fn collect(
    report: FetchReport,
    dropped: &[SourceKind],
) -> (LibraryBuckets, Vec<(TrendingList, Vec<TrendingItem>)>) {
    let mut buckets = LibraryBuckets::default();
    let mut trending = Vec::new();

    for outcome in report.outcomes {
        if let Some(e) = &outcome.error {
            if let FetchTask::Trending(list) = outcome.task {
                warn!("Trending list {} unavailable: {}", list.path(), e);
                trending.push((list, Vec::new()));
            }
            continue;
        }
        if dropped.contains(&outcome.task.source()) {
            continue;
        }
        match (outcome.task, outcome.payload) {
            (FetchTask::TvHistory, Payload::Releases(items)) => buckets.downloaded_episodes = items,
            (FetchTask::TvCalendar, Payload::Releases(items)) => buckets.upcoming_episodes = items,
            (FetchTask::MovieHistory, Payload::Releases(items)) => buckets.downloaded_movies = items,
            (FetchTask::MovieCalendar, Payload::Releases(items)) => buckets.upcoming_movies = items,
            (FetchTask::Trending(list), Payload::Trending(items)) => trending.push((list, items)),
            (task, _) => warn!("Ignoring mismatched payload for {}", task),
        }
    }
    trending.sort_by_key(|(list, _)| *list);
    (buckets, trending)
}
