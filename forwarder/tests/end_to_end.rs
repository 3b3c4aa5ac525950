use chrono::NaiveDate;
use forwarder::clock::FixedClock;
use forwarder::config::Config;
use forwarder::http::ReqwestTransport;
use forwarder::router::Forwarder;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::AUTHORIZATION;
use hyper::{Method, Request, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "integration-secret";

fn config(irrms: &MockServer, arc: &MockServer) -> Config {
    let mut config = Config {
        proxy_secret: SECRET.into(),
        shed_keys: HashMap::from([("TATA".to_string(), "tata-key".to_string())]),
        ..Config::default()
    };
    config.irrms.login_url = Url::parse(&format!("{}/login", irrms.uri())).unwrap();
    config.irrms.data_url = Url::parse(&format!("{}/realtime", irrms.uri())).unwrap();
    config.arc.login_url = Url::parse(&format!("{}/api/login", arc.uri())).unwrap();
    config.arc.live_url = Url::parse(&format!("{}/api/live", arc.uri())).unwrap();
    config.retry.base_delay_ms = 10;
    config
}

fn forwarder(config: &Config) -> Forwarder {
    let clock = FixedClock(
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap(),
    );
    Forwarder::new(
        config,
        Arc::new(ReqwestTransport::new().unwrap()),
        Arc::new(clock),
    )
}

fn authorized(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

async fn call(forwarder: &Forwarder, req: Request<Full<Bytes>>) -> (StatusCode, Value) {
    let response = forwarder.route(req).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_irrms_login_then_fetch() {
    let irrms = MockServer::start().await;
    let arc = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_partial_json(json!({
            "authenticateKey": "tata-key",
            "sessionType": "login",
            "shed_name": "TATA",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&irrms)
        .await;

    Mock::given(method("POST"))
        .and(path("/realtime"))
        .and(header("authorization", "tata-key"))
        .and(body_partial_json(json!({
            "fromDateTime": "19-10-2026 07:45:00",
            "toDateTime": "19-10-2026 08:05:00",
            "refId": "GetSearchData",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"locos": []})))
        .expect(1)
        .mount(&irrms)
        .await;

    let forwarder = forwarder(&config(&irrms, &arc));
    let (status, body) = call(
        &forwarder,
        authorized(Method::POST, "/api/irrms/fetch", r#"{"shed_name":"TATA"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status_code": 200, "json": {"locos": []}}));
}

#[tokio::test]
async fn test_irrms_login_rejected_stops_before_fetch() {
    let irrms = MockServer::start().await;
    let arc = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&irrms)
        .await;

    Mock::given(method("POST"))
        .and(path("/realtime"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&irrms)
        .await;

    let forwarder = forwarder(&config(&irrms, &arc));
    let (status, body) = call(
        &forwarder,
        authorized(Method::POST, "/api/irrms/fetch", r#"{"shed_name":"TATA"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status_code": 401,
            "json": {"error": "IRRMS login failed", "body": "bad key"},
        })
    );
}

#[tokio::test]
async fn test_arc_fetch_recovers_from_transient_errors() {
    let irrms = MockServer::start().await;
    let arc = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/live"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&arc)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/live"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&arc)
        .await;

    let forwarder = forwarder(&config(&irrms, &arc));
    let (status, body) = call(
        &forwarder,
        authorized(Method::POST, "/api/arc/fetch", r#"{"page":2}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status_code": 200, "text": "not json"}));
}

#[tokio::test]
async fn test_arc_fetch_gives_up_after_retries() {
    let irrms = MockServer::start().await;
    let arc = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/live"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&arc)
        .await;

    let forwarder = forwarder(&config(&irrms, &arc));
    let (status, body) = call(&forwarder, authorized(Method::POST, "/api/arc/fetch", "")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status_code"], 502);
}

#[tokio::test]
async fn test_upstream_probes() {
    let irrms = MockServer::start().await;
    let arc = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("arc home"))
        .mount(&arc)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no root"))
        .mount(&irrms)
        .await;

    let forwarder = forwarder(&config(&irrms, &arc));
    let (status, body) = call(
        &forwarder,
        authorized(Method::GET, "/api/debug/upstreams", ""),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "arc": {"status": 200, "body": "arc home"},
            "irrms": {"status": 404, "body": "no root"},
        })
    );
}
