//! zingy: loyalty program host
//!
//! Opens the points database, applies the schema, seeds the referral settings
//! and runs the webhook outbox relay until Ctrl+C or SIGTERM.
//!
//! ## Configuration
//! ```yaml
//! storage:
//!   path: data/zingy.db
//! tiers:
//!   silver: 500
//!   gold: 2000
//!   vip: 5000
//! referrals:
//!   monthly_cap: 10
//!   lifetime_cap: 100
//! webhooks:
//!   interval_secs: 5
//!   max_attempts: 8
//! ```

use std::sync::Arc;

use tracing::{error, info};

use zingy::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};
use zingy::webhook::{spawn_relay_task, TracingSender};
use zingy::{Config, Loyalty};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(path = %config.storage.path, "Starting zingy");

    let loyalty = Loyalty::open(config).await.map_err(|e| {
        error!("Failed to open storage: {}", e);
        e
    })?;
    info!("Storage initialized");

    let relay = Arc::new(loyalty.relay(Arc::new(TracingSender)));
    let relay_task = spawn_relay_task(relay);

    shutdown_signal().await;

    relay_task.shutdown().await;
    loyalty.pool().close().await;
    info!("zingy stopped");
    Ok(())
}
