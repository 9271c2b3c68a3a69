use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound request, independent of the HTTP client that sends it.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            json_body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            json_body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn class(&self) -> ResponseClass {
        ResponseClass::of(self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(ScraperError::from)
    }
}

/// How the retrying fetcher should treat a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    RateLimited,
    Failed(u16),
}

impl ResponseClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => ResponseClass::Success,
            429 => ResponseClass::RateLimited,
            other => ResponseClass::Failed(other),
        }
    }
}

/// Sends a single HTTP request with no retry. Connection and timeout
/// failures surface as `ScraperError::Network`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Fleet-wide backpressure shared by every worker of a run.
#[async_trait]
pub trait CooldownPort: Send + Sync {
    /// Opens (or extends) the cooldown window after a rate-limit signal.
    fn trigger(&self);
    /// Returns once no cooldown window is open. Must precede every request attempt.
    async fn wait_if_active(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert_eq!(ResponseClass::of(200), ResponseClass::Success);
        assert_eq!(ResponseClass::of(204), ResponseClass::Success);
        assert_eq!(ResponseClass::of(429), ResponseClass::RateLimited);
        assert_eq!(ResponseClass::of(503), ResponseClass::Failed(503));
        assert_eq!(ResponseClass::of(302), ResponseClass::Failed(302));
    }

    #[test]
    fn decodes_json_body() {
        let resp = HttpResponse {
            status: 200,
            body: br#"{"movies": []}"#.to_vec(),
        };
        let value: serde_json::Value = resp.json().unwrap();
        assert!(value["movies"].as_array().unwrap().is_empty());
    }
}
