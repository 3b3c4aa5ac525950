//! Shared-secret gate in front of every forwarding and debug endpoint.
//!
//! Callers present `Authorization: Bearer <secret>`. The `Bearer ` prefix is
//! mandatory: a bare secret is rejected like a wrong one.

use crate::errors::AuthError;
use hyper::HeaderMap;
use hyper::header::AUTHORIZATION;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone)]
pub struct Authenticator {
    proxy_secret: String,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(proxy_secret: impl Into<String>) -> Self {
        Self {
            proxy_secret: proxy_secret.into(),
        }
    }

    /// Checks the raw `Authorization` header value, if any.
    pub fn authenticate(&self, header: Option<&str>) -> Result<(), AuthError> {
        let header = header.ok_or(AuthError::Missing)?;

        let token = header
            .strip_prefix(BEARER_PREFIX)
            .ok_or(AuthError::Invalid)?;

        if token.as_bytes() != self.proxy_secret.as_bytes() {
            return Err(AuthError::Invalid);
        }

        Ok(())
    }

    /// Same as [`Authenticator::authenticate`], reading the header from a request.
    /// A header that is not valid UTF-8 counts as present but invalid.
    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        match headers.get(AUTHORIZATION) {
            None => self.authenticate(None),
            Some(value) => {
                let value = value.to_str().map_err(|_| AuthError::Invalid)?;
                self.authenticate(Some(value))
            }
        }
    }
}
