use crate::auth::Authenticator;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::debug::{DebugTools, PassthroughQuery};
use crate::errors::ForwarderError;
use crate::http::{HttpClient, ReqwestTransport, RetryPolicy, Transport};
use crate::metrics_defs::{AUTH_REJECTED, INBOUND_REQUESTS};
use crate::upstreams::arc::{ArcAdapter, ArcFetchRequest};
use crate::upstreams::irrms::{IrrmsAdapter, IrrmsFetchRequest};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::counter;
use shared::http::make_json_response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type ForwarderBody = BoxBody<Bytes, ForwarderError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    IrrmsFetch,
    ArcFetch,
    Identity,
    Passthrough,
    Upstreams,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::IrrmsFetch => "irrms_fetch",
            Operation::ArcFetch => "arc_fetch",
            Operation::Identity => "debug_ip",
            Operation::Passthrough => "debug_check",
            Operation::Upstreams => "debug_upstreams",
        }
    }
}

/// Maps a method and path to an operation
pub fn resolve(method: &Method, path: &str) -> Result<Operation, ForwarderError> {
    let (expected, operation) = match path {
        "/api/irrms/fetch" => (Method::POST, Operation::IrrmsFetch),
        "/api/arc/fetch" => (Method::POST, Operation::ArcFetch),
        "/api/debug/ip" => (Method::GET, Operation::Identity),
        "/api/debug/check" => (Method::POST, Operation::Passthrough),
        "/api/debug/upstreams" => (Method::GET, Operation::Upstreams),
        _ => return Err(ForwarderError::NotFound),
    };

    if *method != expected {
        return Err(ForwarderError::MethodNotAllowed);
    }
    Ok(operation)
}

#[derive(Serialize)]
struct ErrorBody {
    status_code: u16,
    detail: String,
}

fn error_response(e: &ForwarderError) -> Response<ForwarderBody> {
    let status = e.status_code();
    if status.is_server_error() {
        tracing::warn!(error = %e, "request failed");
    } else {
        tracing::debug!(error = %e, "request rejected");
    }

    make_json_response(
        status,
        &ErrorBody {
            status_code: status.as_u16(),
            detail: e.to_string(),
        },
    )
}

async fn read_body<B>(body: B) -> Result<Bytes, ForwarderError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ForwarderError::RequestBodyError(e.to_string()))
}

/// Deserializes a JSON request body; a blank body falls back to `empty`.
fn deserialize_body<T: DeserializeOwned>(
    bytes: &[u8],
    empty: Option<T>,
) -> Result<T, ForwarderError> {
    if bytes.iter().all(u8::is_ascii_whitespace)
        && let Some(value) = empty
    {
        return Ok(value);
    }
    serde_json::from_slice(bytes).map_err(|e| ForwarderError::InvalidBody(e.to_string()))
}

/// Everything an inbound request needs, built once at startup
#[derive(Clone)]
pub struct Forwarder {
    authenticator: Authenticator,
    irrms: IrrmsAdapter,
    arc: ArcAdapter,
    debug: DebugTools,
}

impl Forwarder {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let client = HttpClient::new(transport, RetryPolicy::from(&config.retry));

        Self {
            authenticator: Authenticator::new(config.proxy_secret.clone()),
            irrms: IrrmsAdapter::new(
                client.clone(),
                CredentialStore::new(&config.shed_keys),
                config.irrms.clone(),
                config.timeouts.clone(),
                clock,
            ),
            arc: ArcAdapter::new(
                client.clone(),
                config.arc.live_url.clone(),
                config.timeouts.arc(),
            ),
            debug: DebugTools::new(client, config),
        }
    }

    /// Production wiring: pooled `reqwest` transport and the host clock
    pub fn from_config(config: &Config) -> Result<Self, ForwarderError> {
        let transport =
            ReqwestTransport::new().map_err(|e| ForwarderError::InternalError(e.to_string()))?;
        Ok(Self::new(config, Arc::new(transport), Arc::new(SystemClock)))
    }

    /// Routes an inbound request. Failures become JSON error responses.
    pub async fn route<B>(&self, req: Request<B>) -> Response<ForwarderBody>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let (operation, result) = match resolve(&method, &path) {
            Ok(operation) => (Some(operation), self.handle(operation, req).await),
            Err(e) => (None, Err(e)),
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => error_response(&e),
        };

        let operation = operation.map(|o| o.name()).unwrap_or("unknown");
        let status = response.status();
        counter!(INBOUND_REQUESTS, "operation" => operation, "status" => status.as_u16().to_string())
            .increment(1);
        tracing::info!(%method, %path, operation, status = status.as_u16(), "handled request");

        response
    }

    async fn handle<B>(
        &self,
        operation: Operation,
        req: Request<B>,
    ) -> Result<Response<ForwarderBody>, ForwarderError>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        // The gate runs before any outbound call
        if let Err(e) = self.authenticator.authenticate_headers(req.headers()) {
            counter!(AUTH_REJECTED).increment(1);
            return Err(e.into());
        }

        match operation {
            Operation::IrrmsFetch => {
                let bytes = read_body(req.into_body()).await?;
                let request: IrrmsFetchRequest = deserialize_body(&bytes, None)?;
                let envelope = self.irrms.fetch(&request).await?;
                Ok(make_json_response(StatusCode::OK, &envelope))
            }
            Operation::ArcFetch => {
                let bytes = read_body(req.into_body()).await?;
                let request: ArcFetchRequest =
                    deserialize_body(&bytes, Some(ArcFetchRequest::default()))?;
                let envelope = self.arc.fetch(&request).await?;
                Ok(make_json_response(StatusCode::OK, &envelope))
            }
            Operation::Identity => {
                let identity = self.debug.identity().await;
                Ok(make_json_response(StatusCode::OK, &identity))
            }
            Operation::Passthrough => {
                let query = PassthroughQuery::parse(req.uri().query())?;
                let report = self.debug.passthrough(query).await?;
                Ok(make_json_response(StatusCode::OK, &report))
            }
            Operation::Upstreams => {
                let report = self.debug.upstreams().await;
                Ok(make_json_response(StatusCode::OK, &report))
            }
        }
    }
}

/// Main listener service
pub struct ForwarderService {
    forwarder: Arc<Forwarder>,
}

impl ForwarderService {
    pub fn new(forwarder: Forwarder) -> Self {
        Self {
            forwarder: Arc::new(forwarder),
        }
    }
}

impl Service<Request<Incoming>> for ForwarderService {
    type Response = Response<ForwarderBody>;
    type Error = ForwarderError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let forwarder = self.forwarder.clone();
        Box::pin(async move { Ok(forwarder.route(req).await) })
    }
}
