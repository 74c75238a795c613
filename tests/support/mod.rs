//! Shared fixtures for behaviour tests: a scripted in-memory HTTP client and
//! a gateway wired with zero delays.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use propgate_core::{
    Gateway, GatewayBuilder, GatewayConfig, HttpClient, HttpError, HttpFuture, HttpRequest,
    HttpResponse, UpstreamThrottle,
};
use serde_json::{json, Value};
use time::macros::date;
use time::Date;

pub const BASE_URL: &str = "https://upstream.test";
pub const API_KEY: &str = "test-key";

struct Route {
    needle: String,
    responses: VecDeque<Result<HttpResponse, HttpError>>,
}

/// Answers requests by the first route whose needle occurs in the URL. Each
/// route replays its queue in order and repeats its last response.
/// Unmatched requests get a 404.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Duration,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every response is delayed, keeping requests in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn route(self, needle: &str, response: HttpResponse) -> Self {
        self.push(needle, Ok(response));
        self
    }

    pub fn route_json(self, needle: &str, payload: Value) -> Self {
        self.route(needle, HttpResponse::ok_json(payload.to_string()))
    }

    pub fn route_error(self, needle: &str, message: &str) -> Self {
        self.push(needle, Err(HttpError::new(message)));
        self
    }

    fn push(&self, needle: &str, response: Result<HttpResponse, HttpError>) {
        let mut routes = self.routes.lock().expect("routes should not be poisoned");
        match routes.iter_mut().find(|route| route.needle == needle) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                needle: needle.to_owned(),
                responses: VecDeque::from([response]),
            }),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.url).collect()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.urls().iter().filter(|url| url.contains(needle)).count()
    }

    pub fn last_url(&self, needle: &str) -> Option<String> {
        self.urls().into_iter().rev().find(|url| url.contains(needle))
    }

    fn respond(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let mut routes = self.routes.lock().expect("routes should not be poisoned");
        let Some(route) = routes.iter_mut().find(|route| url.contains(&route.needle)) else {
            return Ok(HttpResponse::new(404, r#"{"status":{"code":404,"msg":"no route"}}"#));
        };
        if route.responses.len() > 1 {
            route
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(HttpError::new("empty route")))
        } else {
            route
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| Err(HttpError::new("empty route")))
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let response = self.respond(&request.url);
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .push(request);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }
}

/// Configuration with a test key and no waiting anywhere.
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        api_key: Some(API_KEY.to_owned()),
        base_url: BASE_URL.to_owned(),
        max_retries: 0,
        retry_base: Duration::ZERO,
        resolver_attempts: 3,
        resolver_delay: Duration::ZERO,
        quota_per_minute: 0,
        ..GatewayConfig::default()
    }
}

pub fn fixed_today() -> Date {
    date!(2026 - 10 - 18)
}

pub fn gateway_with(client: &Arc<ScriptedHttpClient>, config: GatewayConfig) -> Gateway {
    GatewayBuilder::new()
        .with_config(config)
        .with_http_client(Arc::clone(client) as Arc<dyn HttpClient>)
        .with_throttle(UpstreamThrottle::unlimited())
        .with_today(fixed_today)
        .build()
        .expect("test gateway should build")
}

pub fn gateway(client: &Arc<ScriptedHttpClient>) -> Gateway {
    gateway_with(client, test_config())
}

/// Property-detail payload with one record.
pub fn property_record(id: u64, location: Value) -> Value {
    json!({
        "status": {"code": 0, "msg": "SuccessWithResult"},
        "property": [{
            "identifier": {"attomId": id},
            "location": location
        }]
    })
}

pub fn empty_result() -> Value {
    json!({"status": {"code": 0, "msg": "SuccessWithoutResult"}, "property": []})
}

pub fn no_record_response() -> HttpResponse {
    HttpResponse::new(
        400,
        r#"{"status":{"code":-1,"msg":"Unable to locate a property record"}}"#,
    )
}
