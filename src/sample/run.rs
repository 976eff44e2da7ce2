use thiserror::Error;
use tracing::info;

use crate::core::{Client, ClientError, StartWorkflowOptions, WorkflowId};
use crate::sample::GreetingWorkflow;

pub const WORKFLOW_ID: &str = "hello_world_workflowID";
pub const WORKFLOW_INPUT: &str = "Temporal";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("unable to execute workflow: {0}")]
    Start(#[source] ClientError),

    #[error("unable to get workflow result: {0}")]
    Result(#[source] ClientError),
}

/// Start [`GreetingWorkflow`] on `task_queue` and wait for its result.
pub async fn run(client: &Client, task_queue: &str) -> Result<String, RunError> {
    let options = StartWorkflowOptions {
        id: WorkflowId::new(WORKFLOW_ID),
        task_queue: task_queue.to_string(),
    };

    let workflow_run = client
        .execute_workflow(options, &GreetingWorkflow, WORKFLOW_INPUT)
        .await
        .map_err(RunError::Start)?;

    info!(
        workflow_id = %workflow_run.id(),
        run_id = %workflow_run.run_id(),
        "Started workflow"
    );

    workflow_run.get().await.map_err(RunError::Result)
}
