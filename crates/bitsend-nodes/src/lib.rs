//! Regtest wallet backend for bitsend.
//!
//! Accounts are bitcoind wallets and Lightning goes through LND, both
//! reached by running their CLIs inside the node containers.

mod bitcoind;
mod lnd;

use std::sync::Arc;

use bitsend_core::{Backend, Config, EventBus, Result};
use bitsend_docker::ContainerManager;

pub use bitcoind::BitcoindWallet;
pub use lnd::LndWallet;

/// Whether Docker answers and which node containers are up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub bitcoind: bool,
    /// `None` when no LND container is configured.
    pub lnd: Option<bool>,
}

/// Check the containers named in `config` without touching any wallet.
pub async fn node_status(config: &Config) -> Result<NodeStatus> {
    let containers = ContainerManager::connect(config.docker_socket.as_deref())?;
    containers.ping().await?;

    let bitcoind = containers.is_running(&config.bitcoind.container).await?;
    let lnd = match &config.lnd {
        Some(lnd) => Some(containers.is_running(&lnd.container).await?),
        None => None,
    };
    Ok(NodeStatus { bitcoind, lnd })
}

/// Wire up a [`Backend`] for the containers named in `config`.
pub fn regtest_backend(config: &Config) -> Result<Backend> {
    let containers = Arc::new(ContainerManager::connect(config.docker_socket.as_deref())?);
    let events = EventBus::new();

    let wallet = Arc::new(BitcoindWallet::new(
        Arc::clone(&containers),
        config,
        events.clone(),
    ));
    let lightning = config.lnd.clone().map(|lnd| {
        tracing::debug!(container = %lnd.container, "lightning enabled");
        Arc::new(LndWallet::new(Arc::clone(&containers), lnd)) as Arc<dyn bitsend_core::LightningApi>
    });

    Ok(Backend {
        accounts: wallet.clone(),
        devices: wallet,
        lightning,
        events,
    })
}
