#![allow(dead_code)]

use anyhow::Result;
use arrdigest::config::Config;
use arrdigest::error::FetchError;
use arrdigest::mailer::{Mailer, Newsletter};
use arrdigest::model::{
    AggregateResult, ExternalIds, MediaKind, ReleaseItem, TrendingItem, TrendingList, Window,
};
use arrdigest::render::Renderer;
use arrdigest::sources::{LibraryApi, TrendingApi};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What a fake upstream call does each time it is invoked.
#[derive(Clone)]
pub enum Behavior {
    Items(Vec<ReleaseItem>),
    /// Fails with a retryable 503 every time.
    Down,
    /// Fails with a retryable 503 this many times, then returns the items.
    Flaky(usize, Vec<ReleaseItem>),
    /// Never answers.
    Hang,
}

pub struct FakeLibrary {
    service: &'static str,
    history: Behavior,
    calendar: Behavior,
    pub history_calls: AtomicUsize,
    pub calendar_calls: AtomicUsize,
}

impl FakeLibrary {
    pub fn new(service: &'static str, history: Behavior, calendar: Behavior) -> Arc<Self> {
        Arc::new(Self {
            service,
            history,
            calendar,
            history_calls: AtomicUsize::new(0),
            calendar_calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> (usize, usize) {
        (
            self.history_calls.load(Ordering::SeqCst),
            self.calendar_calls.load(Ordering::SeqCst),
        )
    }
}

async fn play(
    service: &str,
    behavior: &Behavior,
    calls: &AtomicUsize,
) -> Result<Vec<ReleaseItem>, FetchError> {
    let n = calls.fetch_add(1, Ordering::SeqCst);
    let unavailable = || FetchError::Status {
        url: format!("http://{service}.test/api/v3"),
        status: 503,
        body: "unavailable".to_string(),
    };
    match behavior {
        Behavior::Items(items) => Ok(items.clone()),
        Behavior::Down => Err(unavailable()),
        Behavior::Flaky(failures, items) => {
            if n < *failures {
                Err(unavailable())
            } else {
                Ok(items.clone())
            }
        }
        Behavior::Hang => std::future::pending().await,
    }
}

#[async_trait::async_trait]
impl LibraryApi for FakeLibrary {
    fn service(&self) -> &'static str {
        self.service
    }

    fn identity(&self) -> String {
        format!("fake-{}", self.service)
    }

    async fn history(&self, _window: Window) -> Result<Vec<ReleaseItem>, FetchError> {
        play(self.service, &self.history, &self.history_calls).await
    }

    async fn calendar(&self, _window: Window) -> Result<Vec<ReleaseItem>, FetchError> {
        play(self.service, &self.calendar, &self.calendar_calls).await
    }
}

pub struct FakeTrending {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeTrending {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl TrendingApi for FakeTrending {
    fn identity(&self) -> String {
        "fake-trakt".to_string()
    }

    async fn list(&self, list: TrendingList) -> Result<Vec<TrendingItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Status {
                url: format!("https://trakt.test/{}", list.path()),
                status: 500,
                body: String::new(),
            });
        }
        Ok(vec![TrendingItem {
            title: format!("Hot {}", list.path()),
            year: Some(2024),
            overview: String::new(),
            poster_url: None,
            rating: Some(8.0),
            ids: ExternalIds::default(),
        }])
    }
}

#[derive(Default)]
pub struct CountingRenderer {
    pub calls: AtomicUsize,
}

impl Renderer for CountingRenderer {
    fn render(&self, digest: &AggregateResult) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "<p>{} library items, {} trending</p>",
            digest.library_item_count(),
            digest.trending_item_count()
        ))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Newsletter>>,
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, newsletter: &Newsletter) -> Result<()> {
        self.sent.lock().unwrap().push(newsletter.clone());
        Ok(())
    }
}

pub fn config(pairs: &[(&str, &str)]) -> Arc<Config> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Arc::new(Config::from_lookup(|key| map.get(key).cloned()).unwrap())
}

pub fn episode(series: &str, season: i32, number: i32, date: &str) -> ReleaseItem {
    ReleaseItem {
        kind: MediaKind::Episode,
        series_title: series.to_string(),
        title: format!("Episode {number}"),
        year: None,
        season: Some(season),
        episode: Some(number),
        release_date: date.to_string(),
        downloaded: true,
        is_upgrade: false,
        ids: ExternalIds::default(),
        poster_url: None,
        overview: String::new(),
        monitored: true,
        rating: 7.0,
    }
}

pub fn movie(title: &str, date: &str) -> ReleaseItem {
    ReleaseItem {
        kind: MediaKind::Movie,
        series_title: String::new(),
        title: title.to_string(),
        year: Some(2024),
        season: None,
        episode: None,
        release_date: date.to_string(),
        downloaded: false,
        is_upgrade: false,
        ids: ExternalIds::default(),
        poster_url: None,
        overview: String::new(),
        monitored: true,
        rating: 6.5,
    }
}
