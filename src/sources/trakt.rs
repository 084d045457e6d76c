use super::http::HttpClient;
use super::TrendingApi;
use crate::cache::connection_identity;
use crate::config::TRENDING_LIMIT;
use crate::error::FetchError;
use crate::model::{ExternalIds, TrendingItem, TrendingList};
use async_trait::async_trait;
use serde::Deserialize;

const TRAKT_BASE: &str = "https://api.trakt.tv";
const TRAKT_API_VERSION: &str = "2";

#[derive(Debug, Clone)]
pub struct TraktClient {
    http: HttpClient,
    client_id: String,
    base_url: String,
}

impl TraktClient {
    pub fn new(http: HttpClient, client_id: Option<String>) -> Result<Self, FetchError> {
        let client_id = client_id
            .filter(|c| !c.is_empty())
            .ok_or(FetchError::NotConfigured("trakt"))?;
        Ok(Self {
            http,
            client_id,
            base_url: TRAKT_BASE.to_string(),
        })
    }

    fn list_url(&self, list: TrendingList) -> String {
        format!(
            "{}/{}?limit={TRENDING_LIMIT}&extended=full,images",
            self.base_url,
            list.path()
        )
    }
}

#[async_trait]
impl TrendingApi for TraktClient {
    fn identity(&self) -> String {
        connection_identity(&self.base_url, &self.client_id)
    }

    async fn list(&self, list: TrendingList) -> Result<Vec<TrendingItem>, FetchError> {
        let url = self.list_url(list);
        let entries: Vec<TraktEntry> = self
            .http
            .get_json(
                &url,
                &[
                    ("trakt-api-version", TRAKT_API_VERSION),
                    ("trakt-api-key", self.client_id.as_str()),
                    ("Content-Type", "application/json"),
                ],
            )
            .await?;
        Ok(map_entries(entries, list))
    }
}

/// Upstream may ignore `limit`, so the cap is applied here as well.
fn map_entries(entries: Vec<TraktEntry>, list: TrendingList) -> Vec<TrendingItem> {
    entries
        .into_iter()
        .filter_map(|e| if list.is_show_list() { e.show } else { e.movie })
        .take(TRENDING_LIMIT)
        .map(|m| TrendingItem {
            poster_url: m
                .images
                .and_then(|i| i.poster.into_iter().next())
                .map(|p| if p.starts_with("http") { p } else { format!("https://{p}") }),
            title: m.title,
            year: m.year,
            overview: m.overview.unwrap_or_default(),
            rating: m.rating.filter(|r| *r > 0.0),
            ids: ExternalIds {
                imdb: m.ids.imdb,
                tmdb: m.ids.tmdb,
                tvdb: m.ids.tvdb,
            },
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct TraktEntry {
    show: Option<TraktMedia>,
    movie: Option<TraktMedia>,
}

#[derive(Debug, Deserialize)]
struct TraktMedia {
    title: String,
    year: Option<i32>,
    overview: Option<String>,
    rating: Option<f64>,
    #[serde(default)]
    ids: TraktIds,
    images: Option<TraktImages>,
}

#[derive(Debug, Default, Deserialize)]
struct TraktIds {
    imdb: Option<String>,
    tmdb: Option<i64>,
    tvdb: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TraktImages {
    #[serde(default)]
    poster: Vec<String>,
}
