pub mod auth;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod debug;
pub mod errors;
pub mod http;
pub mod metrics_defs;
pub mod normalizer;
pub mod router;
pub mod upstreams;

#[cfg(test)]
mod testutils;

use crate::credentials::CredentialStore;
use crate::errors::ForwarderError;
use crate::router::{Forwarder, ForwarderService};
use shared::admin_service::AdminService;
use shared::http::run_http_service;

pub async fn run(config: config::Config) -> Result<(), ForwarderError> {
    let forwarder = Forwarder::from_config(&config)?;

    let credentials = CredentialStore::new(&config.shed_keys);
    if credentials.is_empty() {
        tracing::warn!("no shed keys configured, IRRMS fetches need a caller-supplied authenticateKey");
    }
    tracing::info!(
        sheds = credentials.len(),
        arc = %config.arc.live_url,
        irrms = %config.irrms.data_url,
        "starting forwarder"
    );

    let forwarder_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        ForwarderService::new(forwarder),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, ForwarderError>::new(|| true),
    );

    tokio::try_join!(forwarder_task, admin_task)?;
    Ok(())
}
