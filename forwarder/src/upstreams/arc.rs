//! ARC live data: a single GET with a `page` query parameter.
//!
//! ARC grants access by source address, so no credential is attached.

use crate::errors::ForwarderError;
use crate::http::{HttpClient, OutboundRequest};
use crate::normalizer::{DATA_TEXT_LIMIT, ResponseEnvelope, normalize};
use crate::upstreams::unavailable;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const UPSTREAM_NAME: &str = "ARC";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ArcFetchRequest {
    #[serde(default)]
    pub page: Option<i64>,
}

impl ArcFetchRequest {
    /// Requested page; missing or non-positive means the first page.
    pub fn page(&self) -> i64 {
        self.page.filter(|page| *page >= 1).unwrap_or(1)
    }
}

#[derive(Clone)]
pub struct ArcAdapter {
    client: HttpClient,
    live_url: Url,
    timeout: Duration,
}

impl ArcAdapter {
    pub fn new(client: HttpClient, live_url: Url, timeout: Duration) -> Self {
        Self {
            client,
            live_url,
            timeout,
        }
    }

    pub fn page_url(&self, page: i64) -> Url {
        let mut url = self.live_url.clone();
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    pub async fn fetch(&self, request: &ArcFetchRequest) -> Result<ResponseEnvelope, ForwarderError> {
        let page = request.page();
        let url = self.page_url(page);
        tracing::debug!(page, "fetching ARC live data");

        let response = self
            .client
            .request(OutboundRequest::get(url, self.timeout))
            .await
            .map_err(unavailable(UPSTREAM_NAME))?;

        Ok(normalize(&response, DATA_TEXT_LIMIT))
    }
}
