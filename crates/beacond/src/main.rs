//! beacond — BLE GATT peripheral daemon.

mod device_info;
mod gatt;
mod server;

use anyhow::Result;

use beacon_core::config::BeaconConfig;
use gatt::BluerTransport;
use server::BeaconServer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=debug beacond
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BeaconConfig::load()?;
    tracing::info!(advertise_name = %config.device.advertise_name, "beacond starting");

    let transport = BluerTransport::new().await?;
    let mut server = BeaconServer::new(transport, config);
    server.run().await
}
