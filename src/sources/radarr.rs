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

#[derive(Debug, Clone)]
pub struct RadarrClient {
    arr: ArrConnection,
}

impl RadarrClient {
    pub fn new(http: HttpClient, conn: Option<LibraryConnection>, page_size: u32) -> Result<Self, FetchError> {
        Ok(Self {
            arr: ArrConnection::new("radarr", http, conn, page_size)?,
        })
    }
}

#[async_trait]
impl LibraryApi for RadarrClient {
    fn service(&self) -> &'static str {
        "radarr"
    }

    fn identity(&self) -> String {
        self.arr.identity()
    }

    async fn history(&self, window: Window) -> Result<Vec<ReleaseItem>, FetchError> {
        let records: Vec<RadarrHistoryRecord> = self.arr.history(window, "includeMovie=true").await?;
        Ok(records
            .into_iter()
            .filter_map(|r| {
                let is_upgrade = arr::reason_is_upgrade(&r.data);
                let mut item = map_movie(r.movie?, &window, true);
                item.is_upgrade = is_upgrade;
                Some(item)
            })
            .collect())
    }

    async fn calendar(&self, window: Window) -> Result<Vec<ReleaseItem>, FetchError> {
        let movies: Vec<RadarrMovie> = self.arr.calendar(window, "").await?;
        Ok(movies
            .into_iter()
            .map(|m| map_movie(m, &window, false))
            .collect())
    }
}

fn map_movie(movie: RadarrMovie, window: &Window, from_history: bool) -> ReleaseItem {
    let release_date = release_date_for(&movie, window);
    let rating = movie.ratings.as_ref().map(RadarrRatings::best).unwrap_or(0.0);
    ReleaseItem {
        kind: MediaKind::Movie,
        series_title: String::new(),
        poster_url: arr::poster_url(&movie.images),
        title: movie.title,
        year: movie.year.filter(|y| *y > 0),
        season: None,
        episode: None,
        release_date,
        downloaded: from_history || movie.has_file,
        is_upgrade: false,
        ids: ExternalIds {
            imdb: movie.imdb_id.filter(|i| !i.is_empty()),
            tmdb: movie.tmdb_id.filter(|i| *i > 0),
            tvdb: None,
        },
        overview: movie.overview.unwrap_or_default(),
        monitored: movie.monitored,
        rating,
    }
}

/// Digital, then physical, then cinema release, preferring whichever lands in
/// the window; otherwise the earliest date known.
fn release_date_for(movie: &RadarrMovie, window: &Window) -> String {
    let candidates: Vec<String> = [
        movie.digital_release.as_deref(),
        movie.physical_release.as_deref(),
        movie.in_cinemas.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter_map(|d| d.get(..10))
    .map(str::to_string)
    .collect();

    candidates
        .iter()
        .find(|d| window.contains_date(d))
        .or_else(|| candidates.iter().min())
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrHistoryRecord {
    event_type: String,
    date: String,
    #[serde(default)]
    data: HashMap<String, Value>,
    movie: Option<RadarrMovie>,
}

impl HistoryRecord for RadarrHistoryRecord {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn date(&self) -> &str {
        &self.date
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovie {
    title: String,
    year: Option<i32>,
    overview: Option<String>,
    #[serde(default)]
    images: Vec<ArrImage>,
    imdb_id: Option<String>,
    tmdb_id: Option<i64>,
    ratings: Option<RadarrRatings>,
    #[serde(default)]
    monitored: bool,
    #[serde(default)]
    has_file: bool,
    in_cinemas: Option<String>,
    digital_release: Option<String>,
    physical_release: Option<String>,
}

/// Newer Radarr nests ratings per provider; older builds return a flat value.
#[derive(Debug, Deserialize)]
struct RadarrRatings {
    value: Option<f64>,
    imdb: Option<RatingValue>,
    tmdb: Option<RatingValue>,
}

#[derive(Debug, Deserialize)]
struct RatingValue {
    value: Option<f64>,
}

impl RadarrRatings {
    fn best(&self) -> f64 {
        self.imdb
            .as_ref()
            .and_then(|r| r.value)
            .or_else(|| self.tmdb.as_ref().and_then(|r| r.value))
            .or(self.value)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn window() -> Window {
        Window {
            start: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
        }
    }

    fn movie(value: Value) -> RadarrMovie {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn picks_release_date_inside_window() {
        let m = movie(json!({
            "title": "Dune: Part Two",
            "inCinemas": "2024-02-28T00:00:00Z",
            "digitalRelease": "2024-04-16T00:00:00Z",
            "physicalRelease": "2024-03-05T00:00:00Z"
        }));
        assert_eq!(release_date_for(&m, &window()), "2024-03-05");
    }

    #[test]
    fn falls_back_to_earliest_release_date() {
        let m = movie(json!({
            "title": "Later",
            "inCinemas": "2024-05-01T00:00:00Z",
            "digitalRelease": "2024-07-01T00:00:00Z"
        }));
        assert_eq!(release_date_for(&m, &window()), "2024-05-01");
        let bare = movie(json!({ "title": "Unknown" }));
        assert_eq!(release_date_for(&bare, &window()), "");
    }

    #[test]
    fn reads_nested_and_legacy_ratings() {
        let nested = movie(json!({
            "title": "A",
            "ratings": { "imdb": { "value": 7.9, "votes": 10 }, "tmdb": { "value": 7.1 } }
        }));
        assert_eq!(map_movie(nested, &window(), false).rating, 7.9);
        let tmdb_only = movie(json!({ "title": "B", "ratings": { "tmdb": { "value": 6.4 } } }));
        assert_eq!(map_movie(tmdb_only, &window(), false).rating, 6.4);
        let legacy = movie(json!({ "title": "C", "ratings": { "votes": 3, "value": 5.5 } }));
        assert_eq!(map_movie(legacy, &window(), false).rating, 5.5);
        let none = movie(json!({ "title": "D" }));
        assert_eq!(map_movie(none, &window(), false).rating, 0.0);
    }

    #[test]
    fn maps_calendar_movie() {
        let m = movie(json!({
            "title": "Civil War",
            "year": 2024,
            "tmdbId": 929590,
            "imdbId": "tt17279496",
            "monitored": true,
            "hasFile": false,
            "digitalRelease": "2024-03-08T00:00:00Z",
            "images": [{ "coverType": "poster", "remoteUrl": "https://img/cw.jpg" }]
        }));
        let item = map_movie(m, &window(), false);
        assert_eq!(item.kind, MediaKind::Movie);
        assert_eq!(item.year, Some(2024));
        assert!(item.monitored);
        assert!(!item.downloaded);
        assert_eq!(item.release_date, "2024-03-08");
        assert_eq!(item.ids.tmdb, Some(929590));
    }

    #[test]
    fn client_without_credentials_is_not_configured() {
        let http = HttpClient::new().unwrap();
        let err = RadarrClient::new(http, None, 50).unwrap_err();
        assert!(matches!(err, FetchError::NotConfigured("radarr")));
    }
}
