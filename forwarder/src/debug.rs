//! Operator diagnostics: who are we, can we reach a URL, are the upstreams up.

use crate::config::Config;
use crate::errors::ForwarderError;
use crate::http::{HttpClient, OutboundRequest, RawResponse};
use crate::normalizer::{DEBUG_TEXT_LIMIT, truncate_chars};
use hyper::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Body cap for the upstream reachability probes
pub const PROBE_BODY_LIMIT: usize = 300;

#[derive(Debug, PartialEq, Serialize)]
pub struct Identity {
    pub hostname: Option<String>,
    pub public_ip: Option<String>,
}

/// Query of a passthrough check, e.g. `?url=http://host/path&method=POST`
#[derive(Debug, PartialEq)]
pub struct PassthroughQuery {
    pub url: Url,
    pub method: Method,
}

impl PassthroughQuery {
    pub fn parse(query: Option<&str>) -> Result<Self, ForwarderError> {
        let mut url = None;
        let mut method = None;
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "url" => url = Some(value.into_owned()),
                "method" => method = Some(value.into_owned()),
                _ => {}
            }
        }

        let url = url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ForwarderError::InvalidQuery("missing url".into()))?;
        let url = Url::parse(&url)
            .map_err(|e| ForwarderError::InvalidQuery(format!("url {url:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ForwarderError::InvalidQuery(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }

        let method = match method.filter(|m| !m.is_empty()) {
            None => Method::GET,
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| ForwarderError::InvalidQuery(format!("method {m:?}")))?,
        };

        Ok(Self { url, method })
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct PassthroughReport {
    pub status_code: u16,
    pub snippet: String,
    pub headers: BTreeMap<String, String>,
}

impl PassthroughReport {
    fn from_response(response: &RawResponse) -> Self {
        Self {
            status_code: response.status.as_u16(),
            snippet: truncate_chars(&response.text(), DEBUG_TEXT_LIMIT),
            headers: header_map(&response.headers),
        }
    }
}

/// Repeated headers are joined with `, `
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Probe {
    Reached { status: u16, body: String },
    Failed { error: String },
}

#[derive(Debug, PartialEq, Serialize)]
pub struct UpstreamsReport {
    pub arc: Probe,
    pub irrms: Probe,
}

#[derive(Deserialize)]
struct IpEcho {
    ip: String,
}

/// Root of the service serving `url`
pub fn origin_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}

#[derive(Clone)]
pub struct DebugTools {
    client: HttpClient,
    ip_echo_url: Url,
    arc_root: Url,
    irrms_root: Url,
    identity_timeout: Duration,
    passthrough_timeout: Duration,
    probe_timeout: Duration,
}

impl DebugTools {
    pub fn new(client: HttpClient, config: &Config) -> Self {
        Self {
            client,
            ip_echo_url: config.ip_echo_url.clone(),
            arc_root: origin_root(&config.arc.login_url),
            irrms_root: origin_root(&config.irrms.login_url),
            identity_timeout: config.timeouts.identity(),
            passthrough_timeout: config.timeouts.passthrough(),
            probe_timeout: config.timeouts.probe(),
        }
    }

    /// Never fails; unknown parts are reported as `null`.
    pub async fn identity(&self) -> Identity {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok());

        Identity {
            hostname,
            public_ip: self.public_ip().await,
        }
    }

    async fn public_ip(&self) -> Option<String> {
        let request = OutboundRequest::get(self.ip_echo_url.clone(), self.identity_timeout);
        let response = match self.client.request(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "public IP lookup failed");
                return None;
            }
        };

        if !response.status.is_success() {
            tracing::debug!(status = %response.status, "public IP lookup rejected");
            return None;
        }

        serde_json::from_slice::<IpEcho>(&response.body)
            .ok()
            .map(|echo| echo.ip)
    }

    pub async fn passthrough(
        &self,
        query: PassthroughQuery,
    ) -> Result<PassthroughReport, ForwarderError> {
        tracing::info!(method = %query.method, url = %query.url, "passthrough check");
        let request = OutboundRequest::new(query.method, query.url, self.passthrough_timeout);
        let response = self
            .client
            .request(request)
            .await
            .map_err(ForwarderError::Probe)?;

        Ok(PassthroughReport::from_response(&response))
    }

    pub async fn upstreams(&self) -> UpstreamsReport {
        let (arc, irrms) = tokio::join!(self.probe(&self.arc_root), self.probe(&self.irrms_root));
        UpstreamsReport { arc, irrms }
    }

    async fn probe(&self, url: &Url) -> Probe {
        match self
            .client
            .request(OutboundRequest::get(url.clone(), self.probe_timeout))
            .await
        {
            Ok(response) => Probe::Reached {
                status: response.status.as_u16(),
                body: truncate_chars(&response.text(), PROBE_BODY_LIMIT),
            },
            Err(e) => Probe::Failed {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{StubTransport, fast_retry, raw_response, test_config};
    use hyper::header::{HeaderValue, SET_COOKIE};
    use serde_json::json;
    use std::sync::Arc;

    fn tools(stub: &Arc<StubTransport>) -> DebugTools {
        DebugTools::new(HttpClient::new(stub.clone(), fast_retry()), &test_config())
    }

    #[test]
    fn test_parse_passthrough_query() {
        let query = PassthroughQuery::parse(Some("url=http%3A%2F%2Fexample.com%2Fa%3Fb%3D1")).unwrap();
        assert_eq!(query.url.as_str(), "http://example.com/a?b=1");
        assert_eq!(query.method, Method::GET);

        let query = PassthroughQuery::parse(Some("method=post&url=https://example.com/")).unwrap();
        assert_eq!(query.method, Method::POST);
    }

    #[test]
    fn test_parse_passthrough_query_rejects() {
        for raw in [
            None,
            Some(""),
            Some("url="),
            Some("url=not%20a%20url"),
            Some("url=ftp://example.com/"),
            Some("url=http://example.com/&method=GE%20T"),
        ] {
            let err = PassthroughQuery::parse(raw).unwrap_err();
            assert!(matches!(err, ForwarderError::InvalidQuery(_)), "{raw:?}");
        }
    }

    #[test]
    fn test_origin_root() {
        let url = Url::parse("https://irrms-service.example.com/RMS/save/login?x=1").unwrap();
        assert_eq!(origin_root(&url).as_str(), "https://irrms-service.example.com/");

        let url = Url::parse("http://10.0.0.1:5000/api/login").unwrap();
        assert_eq!(origin_root(&url).as_str(), "http://10.0.0.1:5000/");
    }

    #[test]
    fn test_header_map_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        let map = header_map(&headers);
        assert_eq!(map["set-cookie"], "a=1, b=2");
    }

    #[tokio::test]
    async fn test_identity() {
        let stub = StubTransport::new();
        stub.push(Ok(raw_response(200, r#"{"ip":"203.0.113.7"}"#)));

        let identity = tools(&stub).identity().await;

        assert_eq!(identity.public_ip.as_deref(), Some("203.0.113.7"));
        let sent = stub.requests();
        assert_eq!(sent[0].url.as_str(), "https://api.ipify.org/?format=json");
        assert_eq!(sent[0].timeout, Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_identity_without_public_ip() {
        // Unreachable echo service
        let identity = tools(&StubTransport::new()).identity().await;
        assert_eq!(identity.public_ip, None);

        // Echo service answering garbage
        let stub = StubTransport::new();
        stub.push(Ok(raw_response(200, "<html>")));
        assert_eq!(tools(&stub).identity().await.public_ip, None);

        let serialized = serde_json::to_value(&identity).unwrap();
        assert_eq!(serialized["public_ip"], json!(null));
    }

    #[tokio::test]
    async fn test_passthrough() {
        let stub = StubTransport::new();
        let mut response = raw_response(404, &"y".repeat(1000));
        response
            .headers
            .insert("x-upstream", HeaderValue::from_static("arc"));
        stub.push(Ok(response));

        let query = PassthroughQuery {
            url: Url::parse("http://target.test/x").unwrap(),
            method: Method::DELETE,
        };
        let report = tools(&stub).passthrough(query).await.unwrap();

        assert_eq!(report.status_code, 404);
        assert_eq!(report.snippet.len(), DEBUG_TEXT_LIMIT);
        assert_eq!(report.headers["x-upstream"], "arc");

        let sent = stub.requests();
        assert_eq!(sent[0].method, Method::DELETE);
        assert_eq!(sent[0].timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_passthrough_unreachable() {
        let query = PassthroughQuery {
            url: Url::parse("http://target.test/").unwrap(),
            method: Method::GET,
        };
        let err = tools(&StubTransport::new())
            .passthrough(query)
            .await
            .unwrap_err();

        assert!(matches!(err, ForwarderError::Probe(_)));
        assert!(err.to_string().starts_with("Error during fetch: "));
    }

    #[tokio::test]
    async fn test_upstreams() {
        let stub = StubTransport::new();
        stub.push(Ok(raw_response(200, &"z".repeat(400))));
        stub.push(Ok(raw_response(200, &"z".repeat(400))));

        let report = tools(&stub).upstreams().await;

        for probe in [&report.arc, &report.irrms] {
            match probe {
                Probe::Reached { status, body } => {
                    assert_eq!(*status, 200);
                    assert_eq!(body.len(), PROBE_BODY_LIMIT);
                }
                Probe::Failed { error } => panic!("probe failed: {error}"),
            }
        }

        let mut probed: Vec<String> = stub
            .requests()
            .iter()
            .map(|r| r.url.to_string())
            .collect();
        probed.sort();
        assert_eq!(
            probed,
            vec![
                "http://49.249.49.218:5000/".to_string(),
                "https://irrms-service.locomatrice.com/".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_upstreams_unreachable() {
        let report = tools(&StubTransport::new()).upstreams().await;

        assert!(matches!(report.arc, Probe::Failed { .. }));
        assert!(matches!(report.irrms, Probe::Failed { .. }));
    }

    #[test]
    fn test_probe_serialization() {
        let report = UpstreamsReport {
            arc: Probe::Reached {
                status: 200,
                body: "ok".into(),
            },
            irrms: Probe::Failed {
                error: "timed out".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "arc": {"status": 200, "body": "ok"},
                "irrms": {"error": "timed out"},
            })
        );
    }
}
