use crate::config::Config;
use crate::error::FetchError;
use crate::model::{ReleaseItem, TrendingItem, TrendingList, Window};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

mod arr;
mod http;
mod radarr;
mod sonarr;
mod trakt;

pub use http::HttpClient;
pub use radarr::RadarrClient;
pub use sonarr::SonarrClient;
pub use trakt::TraktClient;

#[async_trait]
pub trait LibraryApi: Send + Sync {
    fn service(&self) -> &'static str;
    fn identity(&self) -> String;
    async fn history(&self, window: Window) -> Result<Vec<ReleaseItem>, FetchError>;
    async fn calendar(&self, window: Window) -> Result<Vec<ReleaseItem>, FetchError>;
}

#[async_trait]
pub trait TrendingApi: Send + Sync {
    fn identity(&self) -> String;
    async fn list(&self, list: TrendingList) -> Result<Vec<TrendingItem>, FetchError>;
}

/// The set of upstreams a run may call. A `None` slot is a source whose
/// credentials are missing; it is never launched.
#[derive(Clone, Default)]
pub struct Sources {
    pub tv: Option<Arc<dyn LibraryApi>>,
    pub movies: Option<Arc<dyn LibraryApi>>,
    pub trending: Option<Arc<dyn TrendingApi>>,
    pub trending_lists: Vec<TrendingList>,
}

impl Sources {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = HttpClient::new()?;
        let page_size = config.history_page_size;

        let tv = match SonarrClient::new(http.clone(), config.sonarr.clone(), page_size) {
            Ok(c) => Some(Arc::new(c) as Arc<dyn LibraryApi>),
            Err(e) => {
                info!("TV source disabled: {}", e);
                None
            }
        };
        let movies = match RadarrClient::new(http.clone(), config.radarr.clone(), page_size) {
            Ok(c) => Some(Arc::new(c) as Arc<dyn LibraryApi>),
            Err(e) => {
                info!("Movie source disabled: {}", e);
                None
            }
        };
        let trending = if config.trending.any() {
            match TraktClient::new(http, config.trakt_client_id.clone()) {
                Ok(c) => Some(Arc::new(c) as Arc<dyn TrendingApi>),
                Err(e) => {
                    info!("Trending source disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            tv,
            movies,
            trending,
            trending_lists: enabled_lists(config),
        })
    }
}

pub fn enabled_lists(config: &Config) -> Vec<TrendingList> {
    if !config.trending_enabled() {
        return Vec::new();
    }
    let t = config.trending;
    TrendingList::ALL
        .into_iter()
        .filter(|list| match list {
            TrendingList::AnticipatedShows => t.anticipated_shows,
            TrendingList::WatchedShows => t.watched_shows,
            TrendingList::AnticipatedMovies => t.anticipated_movies,
            TrendingList::WatchedMovies => t.watched_movies,
        })
        .collect()
}
