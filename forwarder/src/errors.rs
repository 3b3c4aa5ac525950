use hyper::StatusCode;
use thiserror::Error;

/// Result type alias for forwarder operations
pub type Result<T, E = ForwarderError> = std::result::Result<T, E>;

/// Rejections produced by the shared-secret gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    Missing,

    #[error("Invalid proxy secret")]
    Invalid,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No authenticateKey provided and no configured key found for shed {0:?}")]
    UnknownShed(String),

    #[error("authenticateKey for shed {0:?} cannot be sent as an HTTP header")]
    MalformedKey(String),
}

/// Failures of the outbound HTTP layer, after retries have been applied
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("could not connect to {url}: {cause}")]
    ConnectFailed { url: String, cause: String },

    #[error("{url} kept answering {status} after {attempts} attempts")]
    Exhausted {
        url: String,
        status: StatusCode,
        attempts: u32,
    },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("request to {url} failed: {cause}")]
    Failed { url: String, cause: String },

    #[error("could not build HTTP client: {0}")]
    ClientBuild(String),
}

/// Errors that end an inbound request with a non-envelope response
#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("{upstream} unavailable: {source}")]
    UpstreamUnavailable {
        upstream: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Error during fetch: {0}")]
    Probe(#[source] TransportError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForwarderError {
    /// Status code reported to the inbound caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwarderError::Auth(AuthError::Missing) => StatusCode::UNAUTHORIZED,
            ForwarderError::Auth(AuthError::Invalid) => StatusCode::FORBIDDEN,
            ForwarderError::Credential(_) => StatusCode::BAD_REQUEST,
            ForwarderError::UpstreamUnavailable { .. } | ForwarderError::Probe(_) => {
                StatusCode::BAD_GATEWAY
            }
            ForwarderError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ForwarderError::InvalidQuery(_) | ForwarderError::RequestBodyError(_) => {
                StatusCode::BAD_REQUEST
            }
            ForwarderError::NotFound => StatusCode::NOT_FOUND,
            ForwarderError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ForwarderError::InternalError(_) | ForwarderError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
