//! IRRMS real-time data: login, then fetch with the same key.
//!
//! Nothing from the login survives the call; every fetch logs in again.

use crate::clock::Clock;
use crate::config::{IrrmsConfig, Timeouts};
use crate::credentials::CredentialStore;
use crate::errors::{CredentialError, ForwarderError};
use crate::http::{HttpClient, OutboundRequest};
use crate::metrics_defs::IRRMS_LOGIN_REJECTED;
use crate::normalizer::{DATA_TEXT_LIMIT, ResponseEnvelope, normalize, truncate_chars};
use crate::upstreams::unavailable;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, REFERER};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::counter;
use std::sync::Arc;

pub const UPSTREAM_NAME: &str = "IRRMS";

/// IRRMS only accepts day-month-year with a 24-hour clock
pub const DATE_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Cap on the login body echoed back when IRRMS rejects a login
pub const LOGIN_ERROR_BODY_LIMIT: usize = 500;

const CONTENT_TYPE_JSON_UTF8: &str = "application/json; charset=UTF-8";
const ACCEPT_ANY_JSON: &str = "application/json, text/plain, */*";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct IrrmsFetchRequest {
    pub shed_name: String,
    #[serde(rename = "shedId", default)]
    pub shed_id: Option<i64>,
    /// Caller-supplied key, bypassing the configured table
    #[serde(rename = "authenticateKey", default)]
    pub authenticate_key: Option<String>,
    /// Replaces the computed window start, sent verbatim
    #[serde(rename = "fromDateTime", default)]
    pub from_date_time: Option<String>,
    /// Replaces the computed window end, sent verbatim
    #[serde(rename = "toDateTime", default)]
    pub to_date_time: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload<'a> {
    authenticate_key: &'a str,
    session_type: &'static str,
    unique_code: &'static str,
    user_id: &'static str,
    #[serde(rename = "shed_name")]
    shed_name: &'a str,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPayload {
    pub loco_id: i64,
    pub loco_type_id: i64,
    pub shed_id: i64,
    pub vendor_id: i64,
    pub start_date: String,
    pub end_date: String,
    pub action_mode: &'static str,
    pub from_date_time: String,
    pub to_date_time: String,
    pub loco_no: &'static str,
    pub ref_id: &'static str,
}

/// Query window anchored on `now`. The date bounds span the current day,
/// from midnight to the next midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl TimeWindow {
    pub fn around(now: NaiveDateTime) -> Self {
        let today = now.date().and_time(NaiveTime::MIN);
        Self {
            start_date: today,
            end_date: today + ChronoDuration::days(1),
            from: now - ChronoDuration::minutes(15),
            to: now + ChronoDuration::minutes(5),
        }
    }
}

fn format_time(t: NaiveDateTime) -> String {
    t.format(DATE_TIME_FORMAT).to_string()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl DataPayload {
    pub fn new(request: &IrrmsFetchRequest, now: NaiveDateTime) -> Self {
        let window = TimeWindow::around(now);

        Self {
            loco_id: 0,
            loco_type_id: 0,
            shed_id: request.shed_id.unwrap_or(0),
            vendor_id: 0,
            start_date: format_time(window.start_date),
            end_date: format_time(window.end_date),
            action_mode: "temperatureventilation",
            from_date_time: non_empty(&request.from_date_time)
                .unwrap_or_else(|| format_time(window.from)),
            to_date_time: non_empty(&request.to_date_time)
                .unwrap_or_else(|| format_time(window.to)),
            loco_no: "All",
            ref_id: "GetSearchData",
        }
    }
}

#[derive(Clone)]
pub struct IrrmsAdapter {
    client: HttpClient,
    credentials: CredentialStore,
    config: IrrmsConfig,
    timeouts: Timeouts,
    clock: Arc<dyn Clock>,
}

impl IrrmsAdapter {
    pub fn new(
        client: HttpClient,
        credentials: CredentialStore,
        config: IrrmsConfig,
        timeouts: Timeouts,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            credentials,
            config,
            timeouts,
            clock,
        }
    }

    /// Headers IRRMS expects from its own web front end
    fn browser_headers(&self) -> Result<HeaderMap, ForwarderError> {
        let invalid_origin = |_| {
            ForwarderError::InternalError(format!(
                "invalid IRRMS web origin {:?}",
                self.config.web_origin
            ))
        };
        let origin = HeaderValue::from_str(&self.config.web_origin).map_err(invalid_origin)?;
        let referer = HeaderValue::from_str(&format!(
            "{}/",
            self.config.web_origin.trim_end_matches('/')
        ))
        .map_err(invalid_origin)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON_UTF8));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_ANY_JSON));
        headers.insert(ORIGIN, origin);
        headers.insert(REFERER, referer);
        Ok(headers)
    }

    pub async fn fetch(&self, request: &IrrmsFetchRequest) -> Result<ResponseEnvelope, ForwarderError> {
        let shed = request.shed_name.as_str();
        let key = self
            .credentials
            .resolve(shed, request.authenticate_key.as_deref())?;
        let key_header = HeaderValue::from_str(&key)
            .map_err(|_| CredentialError::MalformedKey(shed.to_string()))?;
        let headers = self.browser_headers()?;

        // Phase 1: login
        let login = LoginPayload {
            authenticate_key: &key,
            session_type: "login",
            unique_code: "",
            user_id: "",
            shed_name: shed,
        };
        let mut login_request = OutboundRequest::post_json(
            self.config.login_url.clone(),
            &login,
            self.timeouts.irrms_login(),
        )
        .map_err(|e| ForwarderError::InternalError(e.to_string()))?;
        login_request.headers.extend(headers.clone());

        let login_response = self
            .client
            .request(login_request)
            .await
            .map_err(unavailable(UPSTREAM_NAME))?;

        if login_response.status != StatusCode::OK {
            counter!(IRRMS_LOGIN_REJECTED).increment(1);
            tracing::warn!(shed, status = %login_response.status, "IRRMS login rejected");
            return Ok(ResponseEnvelope::json(
                login_response.status.as_u16(),
                json!({
                    "error": "IRRMS login failed",
                    "body": truncate_chars(&login_response.text(), LOGIN_ERROR_BODY_LIMIT),
                }),
            ));
        }

        // Phase 2: fetch, authorized by the raw key
        let payload = DataPayload::new(request, self.clock.now());
        tracing::debug!(
            shed,
            from = %payload.from_date_time,
            to = %payload.to_date_time,
            "fetching IRRMS real-time data"
        );

        let mut data_request = OutboundRequest::post_json(
            self.config.data_url.clone(),
            &payload,
            self.timeouts.irrms_data(),
        )
        .map_err(|e| ForwarderError::InternalError(e.to_string()))?;
        data_request.headers.extend(headers);
        data_request.headers.insert(AUTHORIZATION, key_header);

        let response = self
            .client
            .request(data_request)
            .await
            .map_err(unavailable(UPSTREAM_NAME))?;

        Ok(normalize(&response, DATA_TEXT_LIMIT))
    }
}
