//! Master runtime: the Registry Service (C2) wired around [`taskd_registry::Store`].

#![warn(missing_docs, clippy::pedantic)]

mod service;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use taskd_config::MasterConfig;
use taskd_registry::{SledStore, Store, StoreError};
use taskd_transport::{Endpoint, TransportError};
use thiserror::Error;
use tracing::info;

pub use service::RegistryService;

/// Opens the durable store and runs the Registry Service until the process is killed.
///
/// # Errors
///
/// Returns [`MasterError`] if the store cannot be opened, the listener cannot
/// be bound, or startup GC fails.
pub async fn run(config: MasterConfig) -> Result<(), MasterError> {
    let active_window = chrono::Duration::seconds(config.active_window_secs);
    let store: Arc<dyn Store> = Arc::new(SledStore::open(Path::new(&config.data_dir), active_window)?);
    let service = Arc::new(RegistryService::new(store, config.active_window_secs));

    service.gc_once(config.gc_retention_hours).await?;
    if config.gc_periodic {
        service.spawn_periodic_gc(config.gc_retention_hours);
    }

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.listen_port)
        .parse()
        .expect("0.0.0.0:<port> always parses");
    let endpoint = Endpoint::bind(bind_addr)?;
    endpoint.spawn(Some(service));
    info!(addr = %endpoint.local_addr(), "Master Registry Service listening");

    std::future::pending::<()>().await;
    Ok(())
}

/// Errors surfaced while starting or running the Master.
#[derive(Debug, Error)]
pub enum MasterError {
    /// The registry store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The RPC listener could not be bound.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
