use crate::model::{DedupKey, Monitored, ReleaseItem, SeriesGroup, Window};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    pub show_unmonitored: bool,
    pub show_upgraded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LibraryBuckets {
    pub downloaded_episodes: Vec<ReleaseItem>,
    pub upcoming_episodes: Vec<ReleaseItem>,
    pub downloaded_movies: Vec<ReleaseItem>,
    pub upcoming_movies: Vec<ReleaseItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedLibrary {
    pub downloaded_shows: Vec<SeriesGroup>,
    pub upcoming_shows: Vec<SeriesGroup>,
    pub downloaded_movies: Vec<ReleaseItem>,
    pub upcoming_movies: Vec<ReleaseItem>,
}

pub fn normalize(
    buckets: LibraryBuckets,
    options: NormalizeOptions,
    downloaded_window: &Window,
) -> NormalizedLibrary {
    let LibraryBuckets {
        mut downloaded_episodes,
        mut upcoming_episodes,
        mut downloaded_movies,
        mut upcoming_movies,
    } = buckets;

    if !options.show_unmonitored {
        upcoming_episodes = filter_monitored(upcoming_episodes);
        upcoming_movies = filter_monitored(upcoming_movies);
    }
    if !options.show_upgraded {
        downloaded_episodes = filter_upgrades(downloaded_episodes, downloaded_window);
        downloaded_movies = filter_upgrades(downloaded_movies, downloaded_window);
    }

    let downloaded_episodes = dedupe(downloaded_episodes);
    let upcoming_episodes = dedupe(upcoming_episodes);
    let mut downloaded_movies = dedupe(downloaded_movies);
    let mut upcoming_movies = dedupe(upcoming_movies);

    sort_by_release_date(&mut downloaded_movies);
    sort_by_release_date(&mut upcoming_movies);

    NormalizedLibrary {
        downloaded_shows: group_series(downloaded_episodes),
        upcoming_shows: group_series(upcoming_episodes),
        downloaded_movies,
        upcoming_movies,
    }
}

pub fn filter_monitored<T: Monitored>(items: Vec<T>) -> Vec<T> {
    items.into_iter().filter(|i| i.is_monitored()).collect()
}

pub fn filter_upgrades(items: Vec<ReleaseItem>, window: &Window) -> Vec<ReleaseItem> {
    items
        .into_iter()
        .filter(|i| !i.is_upgrade || window.contains_date(&i.release_date))
        .collect()
}

pub fn dedupe(items: Vec<ReleaseItem>) -> Vec<ReleaseItem> {
    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|i| seen.insert(i.dedup_key()))
        .collect()
}

pub fn sort_by_release_date(items: &mut [ReleaseItem]) {
    items.sort_by(|a, b| {
        a.release_date
            .cmp(&b.release_date)
            .then_with(|| a.title.cmp(&b.title))
    });
}

/// Folds episodes into one group per series. Series metadata comes from the
/// earliest-airing episode of each series; per-episode ratings (which
/// upstream fills with the series rating) are zeroed once harvested.
pub fn group_series(mut episodes: Vec<ReleaseItem>) -> Vec<SeriesGroup> {
    episodes.sort_by(|a, b| {
        a.release_date
            .cmp(&b.release_date)
            .then_with(|| a.series_title.cmp(&b.series_title))
            .then_with(|| a.season.cmp(&b.season))
            .then_with(|| a.episode.cmp(&b.episode))
    });

    let mut groups: Vec<SeriesGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for mut episode in episodes {
        let slot = match index.get(&episode.series_title) {
            Some(&i) => i,
            None => {
                groups.push(SeriesGroup {
                    title: episode.series_title.clone(),
                    poster_url: episode.poster_url.clone(),
                    overview: episode.overview.clone(),
                    ids: episode.ids.clone(),
                    rating: episode.rating,
                    episodes: Vec::new(),
                });
                index.insert(episode.series_title.clone(), groups.len() - 1);
                groups.len() - 1
            }
        };
        episode.rating = 0.0;
        groups[slot].episodes.push(episode);
    }

    for group in &mut groups {
        group.episodes.sort_by_key(|e| (e.season, e.episode));
    }
    groups
}
