use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Episode,
    Movie,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub imdb: Option<String>,
    pub tmdb: Option<i64>,
    pub tvdb: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseItem {
    pub kind: MediaKind,
    pub series_title: String,
    pub title: String,
    pub year: Option<i32>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub release_date: String,
    pub downloaded: bool,
    pub is_upgrade: bool,
    pub ids: ExternalIds,
    pub poster_url: Option<String>,
    pub overview: String,
    pub monitored: bool,
    pub rating: f64,
}

impl ReleaseItem {
    pub fn dedup_key(&self) -> DedupKey {
        match self.kind {
            MediaKind::Episode => DedupKey::Episode {
                series: self.series_title.clone(),
                season: self.season.unwrap_or(0),
                episode: self.episode.unwrap_or(0),
            },
            MediaKind::Movie => DedupKey::Movie {
                title: self.title.clone(),
                year: self.year,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupKey {
    Episode {
        series: String,
        season: i32,
        episode: i32,
    },
    Movie {
        title: String,
        year: Option<i32>,
    },
}

pub trait Monitored {
    fn is_monitored(&self) -> bool;
}

impl Monitored for ReleaseItem {
    fn is_monitored(&self) -> bool {
        self.monitored
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesGroup {
    pub title: String,
    pub poster_url: Option<String>,
    pub overview: String,
    pub ids: ExternalIds,
    pub rating: f64,
    pub episodes: Vec<ReleaseItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingItem {
    pub title: String,
    pub year: Option<i32>,
    pub overview: String,
    pub poster_url: Option<String>,
    pub rating: Option<f64>,
    pub ids: ExternalIds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendingList {
    AnticipatedShows,
    WatchedShows,
    AnticipatedMovies,
    WatchedMovies,
}

impl TrendingList {
    pub const ALL: [TrendingList; 4] = [
        TrendingList::AnticipatedShows,
        TrendingList::WatchedShows,
        TrendingList::AnticipatedMovies,
        TrendingList::WatchedMovies,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            TrendingList::AnticipatedShows => "shows/anticipated",
            TrendingList::WatchedShows => "shows/watched/weekly",
            TrendingList::AnticipatedMovies => "movies/anticipated",
            TrendingList::WatchedMovies => "movies/watched/weekly",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            TrendingList::AnticipatedShows => "Most anticipated shows",
            TrendingList::WatchedShows => "Most watched shows this week",
            TrendingList::AnticipatedMovies => "Most anticipated movies",
            TrendingList::WatchedMovies => "Most watched movies this week",
        }
    }

    pub fn is_show_list(&self) -> bool {
        matches!(self, TrendingList::AnticipatedShows | TrendingList::WatchedShows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

impl Window {
    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }

    /// Whether an ISO date string falls inside the window. Comparison is on
    /// the `YYYY-MM-DD` prefix so full timestamps work too.
    pub fn contains_date(&self, date: &str) -> bool {
        let Some(day) = date.get(..10) else {
            return false;
        };
        let start = self.start_str();
        let end = self.end_str();
        day >= start.as_str() && day < end.as_str()
    }

    pub fn start_timestamp(&self) -> i64 {
        day_timestamp(self.start)
    }

    pub fn end_timestamp(&self) -> i64 {
        day_timestamp(self.end)
    }
}

fn day_timestamp(day: chrono::NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateResult {
    pub downloaded_shows: Vec<SeriesGroup>,
    pub upcoming_shows: Vec<SeriesGroup>,
    pub downloaded_movies: Vec<ReleaseItem>,
    pub upcoming_movies: Vec<ReleaseItem>,
    pub trending: Vec<(TrendingList, Vec<TrendingItem>)>,
    pub downloaded_from: String,
    pub downloaded_to: String,
    pub upcoming_from: String,
    pub upcoming_to: String,
}

impl AggregateResult {
    pub fn library_item_count(&self) -> usize {
        let episodes: usize = self
            .downloaded_shows
            .iter()
            .chain(self.upcoming_shows.iter())
            .map(|g| g.episodes.len())
            .sum();
        episodes + self.downloaded_movies.len() + self.upcoming_movies.len()
    }

    pub fn trending_item_count(&self) -> usize {
        self.trending.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.library_item_count() == 0 && self.trending_item_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn week() -> Window {
        Window {
            start: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
        }
    }

    #[test]
    fn window_is_half_open() {
        let w = week();
        assert!(w.contains_date("2024-03-04"));
        assert!(w.contains_date("2024-03-10T21:00:00Z"));
        assert!(!w.contains_date("2024-03-11"));
        assert!(!w.contains_date("2024-03-03"));
        assert!(!w.contains_date("2024"));
        assert!(!w.contains_date(""));
    }

    #[test]
    fn window_timestamps_are_day_aligned() {
        let w = week();
        assert_eq!(w.end_timestamp() - w.start_timestamp(), 7 * 86_400);
        assert_eq!(w.start_timestamp() % 86_400, 0);
    }
}
