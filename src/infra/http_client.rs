use crate::app::ports::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::error::{Result, ScraperError};
use crate::infra::identity::IdentityProfile;
use async_trait::async_trait;
use std::time::Duration;

/// reqwest-backed transport that stamps a fresh identity on every request.
pub struct ReqwestTransport {
    client: reqwest::Client,
    profile: IdentityProfile,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, profile: IdentityProfile) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, profile })
    }
}

/// Identity headers first; explicit request headers replace any with the same name.
fn merge_headers(identity: Vec<(String, String)>, explicit: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = identity
        .into_iter()
        .filter(|(name, _)| !explicit.iter().any(|(e, _)| e.eq_ignore_ascii_case(name)))
        .collect();
    merged.extend(explicit.iter().cloned());
    merged
}

fn classify_reqwest_error(err: reqwest::Error) -> ScraperError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ScraperError::Network(err.to_string())
    } else {
        ScraperError::Http(err)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let identity = self.profile.headers(request.json_body.is_some());
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in merge_headers(identity, &request.headers) {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(classify_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(classify_reqwest_error)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
