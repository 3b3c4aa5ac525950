use crate::clock::FixedClock;
use crate::config::Config;
use crate::http::{OutboundRequest, RawResponse, RetryPolicy, Transport, TransportFailure};
use async_trait::async_trait;
use chrono::NaiveDate;
use hyper::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted transport that records every attempt.
///
/// Answers are handed out in the order they were pushed. Once the script runs
/// dry every further attempt fails to connect.
#[derive(Default)]
pub struct StubTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportFailure>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Result<RawResponse, TransportFailure>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::Connect("no scripted response".into())))
    }
}

pub fn raw_response(status: u16, body: &str) -> RawResponse {
    RawResponse::new(
        StatusCode::from_u16(status).unwrap(),
        body.as_bytes().to_vec(),
    )
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
    }
}

pub const TEST_SECRET: &str = "s3cret";

/// Secured config with a `TATA` shed key and a millisecond backoff
pub fn test_config() -> Config {
    let mut config = Config {
        proxy_secret: TEST_SECRET.into(),
        shed_keys: HashMap::from([("TATA".to_string(), "key-tata".to_string())]),
        ..Config::default()
    };
    config.retry.base_delay_ms = 1;
    config
}

/// 19-10-2026 14:30:00
pub fn fixed_clock() -> FixedClock {
    FixedClock(
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap(),
    )
}
