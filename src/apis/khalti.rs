//! Khalti movie API (Nepal).
//!
//! Flow: token once, movie list, per-movie show list, then one
//! `showinfo-v2` POST per candidate show.

use crate::app::ports::HttpRequest;
use crate::config::NepalConfig;
use crate::error::{Result, ScraperError};
use crate::observability::metrics;
use crate::pipeline::extract::{key_string, seat_map};
use crate::pipeline::fetcher::RetryingFetcher;
use crate::pipeline::window::ShowWindow;
use crate::types::{RowOutcome, ShowIdentity};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieRef {
    pub id: String,
    pub name: String,
}

/// A show listed under a movie, before its seat map is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowRef {
    pub show_id: String,
    pub datetime: String,
}

impl ShowRef {
    pub fn identity(&self, movie: &MovieRef) -> ShowIdentity {
        ShowIdentity::new(
            movie.id.clone(),
            seat_map::venue_from_show_id(&self.show_id),
            self.show_id.clone(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct MovieListPayload {
    #[serde(default)]
    movies: Vec<MovieListEntry>,
}

#[derive(Debug, Deserialize)]
struct MovieListEntry {
    #[serde(default)]
    idx: Value,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MovieInfoPayload {
    #[serde(default)]
    theatres: Vec<TheatreEntry>,
}

#[derive(Debug, Deserialize)]
struct TheatreEntry {
    #[serde(default)]
    shows: Vec<ShowEntry>,
}

#[derive(Debug, Deserialize)]
struct ShowEntry {
    #[serde(default)]
    show_id: Option<Value>,
    #[serde(default)]
    datetime: Option<String>,
}

pub struct KhaltiClient {
    fetcher: RetryingFetcher,
    config: NepalConfig,
    token: String,
}

impl KhaltiClient {
    /// Fetches the bearer token once. The token is immutable for the rest of the run.
    #[instrument(skip_all)]
    pub async fn connect(fetcher: RetryingFetcher, config: NepalConfig) -> Result<Self> {
        info!("Fetching Khalti token");
        let token = fetcher
            .fetch_text(&HttpRequest::get(config.token_url.clone()))
            .await?
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(ScraperError::Api {
                message: "token endpoint returned an empty body".to_string(),
            });
        }
        info!("Token locked for this run");
        Ok(Self { fetcher, config, token })
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request.with_header("authorization", self.token.clone())
    }

    pub async fn fetch_movie_list(&self) -> Result<Vec<MovieRef>> {
        let request = self.authorized(HttpRequest::get(self.config.movie_list_url.clone()));
        let payload: MovieListPayload = self.fetcher.fetch_json(&request).await?;
        let movies: Vec<MovieRef> = payload
            .movies
            .into_iter()
            .filter(|m| !m.idx.is_null())
            .map(|m| MovieRef {
                id: key_string(&m.idx),
                name: m.name.unwrap_or_default(),
            })
            .collect();
        info!("Movies found: {}", movies.len());
        Ok(movies)
    }

    /// Every listed show of `movie` with a datetime.
    #[instrument(skip(self), fields(movie = %movie.name))]
    pub async fn fetch_movie_shows(&self, movie: &MovieRef) -> Result<Vec<ShowRef>> {
        let url = self.config.movie_info_url.replace("{movie_id}", &movie.id);
        let payload: MovieInfoPayload = self.fetcher.fetch_json(&self.authorized(HttpRequest::get(url))).await?;
        let shows = payload
            .theatres
            .into_iter()
            .flat_map(|t| t.shows)
            .filter_map(|s| match (s.show_id, s.datetime) {
                (Some(id), Some(datetime)) if !id.is_null() && !datetime.is_empty() => Some(ShowRef {
                    show_id: key_string(&id),
                    datetime,
                }),
                _ => None,
            })
            .collect::<Vec<_>>();
        debug!("{} listed shows", shows.len());
        Ok(shows)
    }

    /// Listed shows of `movie` that fall inside `window`. A movie whose info
    /// cannot be fetched contributes nothing.
    pub async fn candidate_shows(
        &self,
        movie: &MovieRef,
        window: &ShowWindow,
        now: &DateTime<FixedOffset>,
    ) -> Vec<ShowRef> {
        match self.fetch_movie_shows(movie).await {
            Ok(shows) => shows.into_iter().filter(|s| window.admits(&s.datetime, now)).collect(),
            Err(e) => {
                warn!(movie = %movie.name, error = %e, "Movie info unavailable, movie skipped");
                Vec::new()
            }
        }
    }

    /// Fetches and extracts one show. Failures come back as a skipped row.
    pub async fn fetch_show(&self, movie: &MovieRef, show: &ShowRef, fallback_date: &str) -> RowOutcome {
        let identity = show.identity(movie);
        let request = self.authorized(HttpRequest::post_json(
            self.config.showinfo_url.clone(),
            json!({ "show_id": show.show_id, "new_layout": false }),
        ));
        match self.fetcher.fetch(&request).await {
            Ok(response) => seat_map::extract(&response.body, &identity, &movie.name, fallback_date, self.config.price_unit),
            Err(e) => {
                metrics::extract::row_skipped();
                debug!(show = %identity, error = %e, "Showinfo fetch failed, show skipped");
                RowOutcome::Skipped {
                    identity,
                    movie_name: movie.name.clone(),
                    date: fallback_date.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }
}
