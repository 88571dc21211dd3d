use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use crate::Error;
use crate::config::{ConfigStore, Configuration};

pub mod identity;
pub mod keys;
pub mod routes;
pub mod server;
pub mod userdata;

fn warn_if_default_key_unset(config: &Configuration) {
    if config.default_key_unset() {
        warn!("Default public key not set, serving placeholder to all clients");
    }
}

fn reload(store: &ConfigStore) {
    match store.reload() {
        Ok(config) => {
            info!("supervisor: configuration reloaded");
            warn_if_default_key_unset(&config);
        }
        Err(e) => error!("supervisor: reload failed, keeping previous configuration: {}", e),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("supervisor: interrupted, shutting down"),
        Err(e) => {
            error!("supervisor: unable to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await
        }
    }
}

/// Serve metadata until interrupted. SIGHUP reloads the configuration file.
pub async fn run(store: Arc<ConfigStore>) -> Result<(), Error> {
    let config = store.snapshot();
    warn_if_default_key_unset(&config);
    let listen = config.listen_address()?;

    let mut hangup = signal(SignalKind::hangup()).map_err(Error::Signal)?;
    let reload_task = tokio::task::spawn({
        let store = store.clone();
        async move {
            while hangup.recv().await.is_some() {
                reload(&store);
            }
        }
    });

    let result = server::serve(store, listen, shutdown_signal()).await;
    reload_task.abort();
    result
}
