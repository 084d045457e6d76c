use crate::model::{AggregateResult, ReleaseItem, SeriesGroup, TrendingItem};
use anyhow::Result;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write;

/// Turns a finished digest into an HTML document.
pub trait Renderer: Send + Sync {
    fn render(&self, digest: &AggregateResult) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, digest: &AggregateResult) -> Result<String> {
        let mut out = String::with_capacity(16 * 1024);
        out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Media digest</title></head>\n");
        out.push_str("<body style=\"font-family:sans-serif;max-width:720px;margin:auto\">\n");

        write!(
            out,
            "<h1>Downloaded {} to {}</h1>\n",
            text(&digest.downloaded_from),
            text(&digest.downloaded_to)
        )?;
        shows_section(&mut out, "Shows", &digest.downloaded_shows)?;
        movies_section(&mut out, "Movies", &digest.downloaded_movies)?;

        write!(
            out,
            "<h1>Coming up {} to {}</h1>\n",
            text(&digest.upcoming_from),
            text(&digest.upcoming_to)
        )?;
        shows_section(&mut out, "Shows", &digest.upcoming_shows)?;
        movies_section(&mut out, "Movies", &digest.upcoming_movies)?;

        for (list, items) in &digest.trending {
            trending_section(&mut out, list.heading(), items)?;
        }

        out.push_str("</body></html>\n");
        Ok(out)
    }
}

fn shows_section(out: &mut String, heading: &str, groups: &[SeriesGroup]) -> Result<()> {
    write!(out, "<h2>{}</h2>\n", text(heading))?;
    if groups.is_empty() {
        out.push_str("<p><em>No items</em></p>\n");
        return Ok(());
    }
    for group in groups {
        out.push_str("<div style=\"margin-bottom:16px\">\n");
        poster(out, group.poster_url.as_deref())?;
        write!(out, "<h3>{}", text(&group.title))?;
        if group.rating > 0.0 {
            write!(out, " <small>({:.1})</small>", group.rating)?;
        }
        out.push_str("</h3>\n");
        if !group.overview.is_empty() {
            write!(out, "<p>{}</p>\n", text(&group.overview))?;
        }
        out.push_str("<ul>\n");
        for ep in &group.episodes {
            write!(
                out,
                "<li>S{:02}E{:02} {} <small>{}</small></li>\n",
                ep.season.unwrap_or(0),
                ep.episode.unwrap_or(0),
                text(&ep.title),
                text(&ep.release_date)
            )?;
        }
        out.push_str("</ul>\n</div>\n");
    }
    Ok(())
}

fn movies_section(out: &mut String, heading: &str, movies: &[ReleaseItem]) -> Result<()> {
    write!(out, "<h2>{}</h2>\n", text(heading))?;
    if movies.is_empty() {
        out.push_str("<p><em>No items</em></p>\n");
        return Ok(());
    }
    for movie in movies {
        out.push_str("<div style=\"margin-bottom:16px\">\n");
        poster(out, movie.poster_url.as_deref())?;
        write!(out, "<h3>{}", text(&movie.title))?;
        if let Some(year) = movie.year {
            write!(out, " ({year})")?;
        }
        out.push_str("</h3>\n");
        write!(out, "<p><small>{}</small>", text(&movie.release_date))?;
        if movie.rating > 0.0 {
            write!(out, " <small>rated {:.1}</small>", movie.rating)?;
        }
        out.push_str("</p>\n");
        if !movie.overview.is_empty() {
            write!(out, "<p>{}</p>\n", text(&movie.overview))?;
        }
        out.push_str("</div>\n");
    }
    Ok(())
}

fn trending_section(out: &mut String, heading: &str, items: &[TrendingItem]) -> Result<()> {
    write!(out, "<h2>{}</h2>\n", text(heading))?;
    if items.is_empty() {
        out.push_str("<p><em>No items</em></p>\n");
        return Ok(());
    }
    out.push_str("<ol>\n");
    for item in items {
        write!(out, "<li><strong>{}</strong>", text(&item.title))?;
        if let Some(year) = item.year {
            write!(out, " ({year})")?;
        }
        if let Some(rating) = item.rating {
            write!(out, " <small>{rating:.1}</small>")?;
        }
        out.push_str("</li>\n");
    }
    out.push_str("</ol>\n");
    Ok(())
}

fn poster(out: &mut String, url: Option<&str>) -> Result<()> {
    if let Some(url) = url {
        write!(
            out,
            "<img src=\"{}\" alt=\"\" width=\"120\" style=\"float:left;margin-right:12px\">\n",
            attr(url)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExternalIds, MediaKind, TrendingList};

    #[test]
    fn escapes_text_and_marks_empty_sections() {
        let digest = AggregateResult {
            downloaded_movies: vec![ReleaseItem {
                kind: MediaKind::Movie,
                series_title: String::new(),
                title: "Tom & Jerry <Live>".to_string(),
                year: Some(2021),
                season: None,
                episode: None,
                release_date: "2024-03-05".to_string(),
                downloaded: true,
                is_upgrade: false,
                ids: ExternalIds::default(),
                poster_url: Some("https://img/a\".jpg".to_string()),
                overview: String::new(),
                monitored: true,
                rating: 0.0,
            }],
            trending: vec![(TrendingList::WatchedShows, Vec::new())],
            downloaded_from: "2024-03-01".to_string(),
            downloaded_to: "2024-03-08".to_string(),
            ..Default::default()
        };
        let html = HtmlRenderer.render(&digest).unwrap();
        assert!(html.contains("Tom &amp; Jerry &lt;Live&gt; (2021)"));
        assert!(html.contains("https://img/a&quot;.jpg"));
        assert!(html.contains("Most watched shows this week"));
        assert!(html.contains("<em>No items</em>"));
        assert!(!html.contains("rated"));
    }
}
