use super::arr::{self, ArrConnection, ArrImage, HistoryRecord};
use super::http::HttpClient;
use super::LibraryApi;
use crate::config::LibraryConnection;
use crate::error::FetchError;
use crate::model::{ExternalIds, MediaKind, ReleaseItem, Window};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SonarrClient {
    arr: ArrConnection,
}

impl SonarrClient {
    pub fn new(http: HttpClient, conn: Option<LibraryConnection>, page_size: u32) -> Result<Self, FetchError> {
        Ok(Self {
            arr: ArrConnection::new("sonarr", http, conn, page_size)?,
        })
    }
}

#[async_trait]
impl LibraryApi for SonarrClient {
    fn service(&self) -> &'static str {
        "sonarr"
    }

    fn identity(&self) -> String {
        self.arr.identity()
    }

    async fn history(&self, window: Window) -> Result<Vec<ReleaseItem>, FetchError> {
        let records: Vec<SonarrHistoryRecord> = self
            .arr
            .history(window, "includeSeries=true&includeEpisode=true")
            .await?;
        Ok(records.into_iter().filter_map(map_history_record).collect())
    }

    async fn calendar(&self, window: Window) -> Result<Vec<ReleaseItem>, FetchError> {
        let episodes: Vec<SonarrEpisode> = self.arr.calendar(window, "includeSeries=true").await?;
        Ok(map_calendar(episodes))
    }
}

fn map_calendar(episodes: Vec<SonarrEpisode>) -> Vec<ReleaseItem> {
    let mut orphans = 0;
    let items: Vec<ReleaseItem> = episodes
        .into_iter()
        .map(|mut e| {
            let series = e.series.take().unwrap_or_else(|| {
                orphans += 1;
                SonarrSeries::default()
            });
            map_episode(&series, e, false)
        })
        .collect();
    if orphans > 0 {
        warn!("{} calendar episodes came without series details", orphans);
    }
    items
}

fn map_history_record(record: SonarrHistoryRecord) -> Option<ReleaseItem> {
    let is_upgrade = arr::reason_is_upgrade(&record.data);
    let series = record.series?;
    let episode = record.episode?;
    let mut item = map_episode(&series, episode, true);
    item.is_upgrade = is_upgrade;
    Some(item)
}

/// Episode fields come from the episode; poster, overview, ids and rating
/// are the series' own.
fn map_episode(series: &SonarrSeries, episode: SonarrEpisode, from_history: bool) -> ReleaseItem {
    let overview = series
        .overview
        .clone()
        .filter(|o| !o.is_empty())
        .or(episode.overview)
        .unwrap_or_default();
    ReleaseItem {
        kind: MediaKind::Episode,
        series_title: series.title.clone(),
        title: episode.title.unwrap_or_default(),
        year: series.year.filter(|y| *y > 0),
        season: Some(episode.season_number),
        episode: Some(episode.episode_number),
        release_date: episode.air_date.unwrap_or_default(),
        downloaded: from_history || episode.has_file,
        is_upgrade: false,
        ids: ExternalIds {
            imdb: series.imdb_id.clone().filter(|i| !i.is_empty()),
            tmdb: series.tmdb_id.filter(|i| *i > 0),
            tvdb: series.tvdb_id.filter(|i| *i > 0),
        },
        poster_url: arr::poster_url(&series.images),
        overview,
        monitored: episode.monitored,
        rating: series.ratings.as_ref().and_then(|r| r.value).unwrap_or(0.0),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrHistoryRecord {
    event_type: String,
    date: String,
    #[serde(default)]
    data: HashMap<String, Value>,
    series: Option<SonarrSeries>,
    episode: Option<SonarrEpisode>,
}

impl HistoryRecord for SonarrHistoryRecord {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn date(&self) -> &str {
        &self.date
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeries {
    title: String,
    year: Option<i32>,
    overview: Option<String>,
    #[serde(default)]
    images: Vec<ArrImage>,
    imdb_id: Option<String>,
    tvdb_id: Option<i64>,
    tmdb_id: Option<i64>,
    ratings: Option<SeriesRatings>,
}

#[derive(Debug, Clone, Deserialize)]
struct SeriesRatings {
    value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrEpisode {
    season_number: i32,
    episode_number: i32,
    title: Option<String>,
    air_date: Option<String>,
    overview: Option<String>,
    #[serde(default)]
    monitored: bool,
    #[serde(default)]
    has_file: bool,
    series: Option<SonarrSeries>,
}
