use anyhow::{Context, Result};
use helloworld::core::{interrupt_signal, Client, ClientOptions, Worker, WorkerOptions};
use helloworld::sample::{GreetingActivity, GreetingWorkflow, TASK_QUEUE};
use helloworld::tracing_setup::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let client = Client::dial(ClientOptions::from_env())
        .await
        .context("Unable to create client")?;

    let worker = Worker::new(client.clone(), TASK_QUEUE, WorkerOptions::default());
    worker.register_workflow(GreetingWorkflow).await;
    worker.register_activity(GreetingActivity).await;

    // Blocks until Ctrl-C.
    worker.run(interrupt_signal()).await;

    client.close();
    Ok(())
}
