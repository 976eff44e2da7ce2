use anyhow::{Context, Result};
use helloworld::core::interrupt_signal;
use helloworld::server::{DevServerOptions, Server};
use helloworld::tracing_setup::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let options = DevServerOptions::from_env();
    tracing::info!(host_port = %options.host_port, "Dev server starting");

    Server::with_options(options)
        .run(interrupt_signal())
        .await
        .context("Dev server failed")?;

    tracing::info!("Dev server stopped");
    Ok(())
}
