#![allow(dead_code)]

use async_trait::async_trait;
use boxoffice_tracker::app::ports::{HttpRequest, HttpResponse, Transport};
use boxoffice_tracker::error::{Result, ScraperError};
use boxoffice_tracker::pipeline::clock::ManualClock;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply. The last reply of a route repeats forever.
#[derive(Clone, Debug)]
pub enum Reply {
    Json(u16, Value),
    Text(u16, String),
    NetworkDown,
}

struct Route {
    needle: String,
    replies: VecDeque<Reply>,
}

#[derive(Clone, Debug)]
pub struct Call {
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Virtual time of the call
    pub at: Duration,
}

/// In-memory transport answering by the first route whose needle occurs in the URL.
pub struct RoutedTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Call>>,
    clock: Arc<ManualClock>,
}

impl RoutedTransport {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            clock,
        }
    }

    pub fn on(&self, needle: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.needle == needle) {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                needle: needle.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, needle: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.url.contains(needle)).collect()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(Call {
            url: request.url.clone(),
            body: request.json_body.clone(),
            headers: request.headers.clone(),
            at: self.clock.elapsed(),
        });

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            let route = routes.iter_mut().find(|r| request.url.contains(&r.needle));
            match route {
                Some(route) if route.replies.len() > 1 => route.replies.pop_front(),
                Some(route) => route.replies.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Json(status, value)) => Ok(HttpResponse {
                status,
                body: serde_json::to_vec(&value)?,
            }),
            Some(Reply::Text(status, text)) => Ok(HttpResponse {
                status,
                body: text.into_bytes(),
            }),
            Some(Reply::NetworkDown) => Err(ScraperError::Network("connection reset".into())),
            None => Ok(HttpResponse {
                status: 404,
                body: Vec::new(),
            }),
        }
    }
}
