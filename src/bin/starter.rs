use anyhow::{Context, Result};
use helloworld::core::{Client, ClientOptions};
use helloworld::sample::{run, TASK_QUEUE};
use helloworld::tracing_setup::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // The client is a heavyweight handle; create it once per process.
    let client = Client::dial(ClientOptions::from_env())
        .await
        .context("Unable to create client")?;

    let result = run(&client, TASK_QUEUE)
        .await
        .context("Workflow run failed")?;
    tracing::info!(result = %result, "Workflow result");

    client.close();
    Ok(())
}
