//! Per-upstream protocol adapters.

pub mod arc;
pub mod irrms;

use crate::errors::{ForwarderError, TransportError};

fn unavailable(upstream: &'static str) -> impl Fn(TransportError) -> ForwarderError {
    move |source| ForwarderError::UpstreamUnavailable { upstream, source }
}
