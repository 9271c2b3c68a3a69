//! Japanese box-office blog archive.
//!
//! One JSON file per calendar day under `YYYY/MM/<date>.json`. A day page
//! links to that day's posts; each post page carries a ranking table that
//! is pulled out of the page text with a regex.

use crate::app::ports::HttpRequest;
use crate::config::JapanConfig;
use crate::error::{Result, ScraperError};
use crate::pipeline::fetcher::RetryingFetcher;
use crate::pipeline::merge_store::persist;
use crate::pipeline::window::date_range;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

const RANKING_PATTERN: &str = r"(\d+)\s+([\d,]+)\s+([\d,]+)\s+([\d,]+)\s+([\d,]+)\s+([\d.%]+)\s+(.+)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: u64,
    pub movie_jp: String,
    pub sales: u64,
    pub seats: u64,
    pub showtimes: u64,
    pub theaters: u64,
    pub ratio_last_week: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogEntry {
    pub url: String,
    pub title_jp: String,
    pub page_title: String,
    pub rankings: Vec<RankingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayArchive {
    pub date: String,
    pub entries: Vec<BlogEntry>,
}

/// `<root>/YYYY/MM/YYYY-MM-DD.json`
pub fn day_file(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(format!("{}.json", date.format("%Y-%m-%d")))
}

/// Days since `start` without an archive file. Today is always included
/// because its page may still be growing.
pub fn days_to_fetch(root: &Path, start: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    date_range(start, today)
        .into_iter()
        .filter(|d| *d == today || !day_file(root, *d).exists())
        .collect()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::Api {
        message: format!("invalid selector {:?}: {}", css, e),
    })
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    }
}

/// `(post title, absolute link)` for every post on a day page.
pub fn parse_post_links(html: &str, base_url: &str) -> Result<Vec<(String, String)>> {
    let document = Html::parse_document(html);
    let links = document
        .select(&selector("h2.entry_header a")?)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let title = a.text().collect::<String>().trim().to_string();
            Some((title, absolute_url(base_url, href)))
        })
        .collect();
    Ok(links)
}

pub fn parse_page_title(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector("title")?)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default())
}

fn digits(raw: &str) -> u64 {
    raw.chars().filter(char::is_ascii_digit).collect::<String>().parse().unwrap_or(0)
}

fn ratio(raw: &str) -> Option<f64> {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect::<String>()
        .parse()
        .ok()
}

/// Ranking rows found anywhere in the page text.
pub fn parse_rankings(html: &str) -> Result<Vec<RankingEntry>> {
    let pattern = Regex::new(RANKING_PATTERN).map_err(|e| ScraperError::Api {
        message: format!("invalid ranking pattern: {}", e),
    })?;
    let text: String = Html::parse_document(html).root_element().text().collect();
    Ok(pattern
        .captures_iter(&text)
        .map(|caps| RankingEntry {
            rank: digits(&caps[1]),
            movie_jp: caps[7].trim().to_string(),
            sales: digits(&caps[2]),
            seats: digits(&caps[3]),
            showtimes: digits(&caps[4]),
            theaters: digits(&caps[5]),
            ratio_last_week: ratio(&caps[6]),
        })
        .collect())
}

pub struct MimorinClient {
    fetcher: RetryingFetcher,
    config: JapanConfig,
}

impl MimorinClient {
    pub fn new(fetcher: RetryingFetcher, config: JapanConfig) -> Self {
        Self { fetcher, config }
    }

    /// All posts of one day, or `None` when the day page is unavailable or empty.
    #[instrument(skip(self))]
    pub async fn scrape_day(&self, date: NaiveDate) -> Result<Option<DayArchive>> {
        let url = format!("{}/blog-date-{}.html", self.config.base_url.trim_end_matches('/'), date.format("%Y%m%d"));
        let page = match self.fetcher.fetch_text(&HttpRequest::get(url)).await {
            Ok(page) => page,
            Err(e) => {
                debug!(error = %e, "Day page unavailable");
                return Ok(None);
            }
        };
        let posts = parse_post_links(&page, &self.config.base_url)?;
        if posts.is_empty() {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(posts.len());
        for (title_jp, link) in posts {
            let body = match self.fetcher.fetch_text(&HttpRequest::get(link.clone())).await {
                Ok(body) => body,
                Err(e) => {
                    debug!(url = %link, error = %e, "Post unavailable, skipped");
                    continue;
                }
            };
            entries.push(BlogEntry {
                page_title: parse_page_title(&body)?,
                rankings: parse_rankings(&body)?,
                url: link,
                title_jp,
            });
        }

        Ok(Some(DayArchive {
            date: date.format("%Y-%m-%d").to_string(),
            entries,
        }))
    }

    /// Scrapes `date` and writes its archive file. Returns the path written, if any.
    pub async fn archive_day(&self, root: &Path, date: NaiveDate) -> Result<Option<PathBuf>> {
        match self.scrape_day(date).await? {
            Some(archive) => {
                let path = day_file(root, date);
                persist(&path, &archive)?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }
}
