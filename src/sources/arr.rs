use super::http::HttpClient;
use crate::cache::connection_identity;
use crate::config::LibraryConnection;
use crate::error::FetchError;
use crate::model::Window;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

const MAX_HISTORY_PAGES: u32 = 40;

// Sonarr and Radarr share the v3 history and calendar API.
#[derive(Debug, Clone)]
pub(crate) struct ArrConnection {
    http: HttpClient,
    conn: LibraryConnection,
    page_size: u32,
}

impl ArrConnection {
    pub(crate) fn new(
        service: &'static str,
        http: HttpClient,
        conn: Option<LibraryConnection>,
        page_size: u32,
    ) -> Result<Self, FetchError> {
        let conn = conn.ok_or(FetchError::NotConfigured(service))?;
        Ok(Self {
            http,
            conn,
            page_size,
        })
    }

    pub(crate) fn identity(&self) -> String {
        connection_identity(&self.conn.url, &self.conn.api_key)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.http
            .get_json(url, &[("X-Api-Key", self.conn.api_key.as_str())])
            .await
    }

    pub(crate) async fn history<R>(&self, window: Window, include: &str) -> Result<Vec<R>, FetchError>
    where
        R: HistoryRecord + DeserializeOwned,
    {
        let since = window
            .start
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or_default();
        collect_history(self.page_size, since, |page| {
            let url = format!(
                "{}/api/v3/history?page={page}&pageSize={}&sortKey=date&sortDirection=descending&{include}",
                self.conn.url, self.page_size
            );
            async move { self.get::<HistoryPage<R>>(&url).await }
        })
        .await
    }

    pub(crate) async fn calendar<T>(&self, window: Window, include: &str) -> Result<Vec<T>, FetchError>
    where
        T: DeserializeOwned,
    {
        let mut url = format!(
            "{}/api/v3/calendar?start={}&end={}",
            self.conn.url,
            urlencoding::encode(&window.start_str()),
            urlencoding::encode(&window.end_str())
        );
        if !include.is_empty() {
            url.push('&');
            url.push_str(include);
        }
        self.get(&url).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryPage<R> {
    #[serde(default)]
    pub(crate) total_records: u32,
    #[serde(default = "Vec::new")]
    pub(crate) records: Vec<R>,
}

pub(crate) trait HistoryRecord {
    fn event_type(&self) -> &str;
    fn date(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArrImage {
    pub(crate) cover_type: String,
    pub(crate) remote_url: Option<String>,
    pub(crate) url: Option<String>,
}

pub(crate) fn is_import_event(event_type: &str) -> bool {
    event_type.to_ascii_lowercase().contains("imported")
}

pub(crate) fn reason_is_upgrade(data: &HashMap<String, Value>) -> bool {
    data.get("reason")
        .and_then(Value::as_str)
        .is_some_and(|r| r.to_ascii_lowercase().contains("upgrade"))
}

pub(crate) fn poster_url(images: &[ArrImage]) -> Option<String> {
    images
        .iter()
        .find(|i| i.cover_type.eq_ignore_ascii_case("poster"))
        .and_then(|i| i.remote_url.clone().or_else(|| i.url.clone()))
        .filter(|u| !u.is_empty())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Walks a date-descending history feed, keeping import events newer than
/// `since`. The first page holding any older record is the last page read;
/// only its old records are dropped.
pub(crate) async fn collect_history<R, F, Fut>(
    page_size: u32,
    since: DateTime<Utc>,
    mut fetch_page: F,
) -> Result<Vec<R>, FetchError>
where
    R: HistoryRecord,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<HistoryPage<R>, FetchError>>,
{
    let mut kept = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch_page(page).await?;
        if batch.records.is_empty() {
            break;
        }
        let mut reached_old = false;
        for record in batch.records {
            if parse_date(record.date()).is_some_and(|d| d < since) {
                reached_old = true;
                continue;
            }
            if is_import_event(record.event_type()) {
                kept.push(record);
            }
        }
        let seen = page.saturating_mul(page_size);
        if reached_old || seen >= batch.total_records || page >= MAX_HISTORY_PAGES {
            break;
        }
        page += 1;
    }
    debug!("History walk kept {} import records", kept.len());
    Ok(kept)
}
