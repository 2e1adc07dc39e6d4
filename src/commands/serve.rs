//! Serve command - run the session worker with stdin/stdout as the host channel.

use anyhow::Result;
use std::sync::Arc;

use crate::channel::stdio;
use crate::config::Config;
use crate::transport::relay::RelayTransport;

/// Run the worker until the host closes stdin.
pub async fn run(config: &Config) -> Result<()> {
    if Config::save_default_if_missing()? {
        log::info!("[Serve] Wrote default config.json");
    }

    let store = super::open_store(config)?;
    let transport = RelayTransport::new(&config.relay_url, config.request_timeout())?;

    log::info!(
        "[Serve] Store {:?}, relay {}",
        store.path(),
        config.relay_url
    );

    stdio::serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        Box::new(store),
        Arc::new(transport),
    )
    .await
}
