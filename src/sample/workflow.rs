use std::time::Duration;

use tracing::info;

use crate::core::{AbstractWorkflowHandler, ActivityOptions, WorkflowContext, WorkflowError};
use crate::sample::GreetingActivity;

/// Calls [`GreetingActivity`] with its input and returns the greeting unchanged.
pub struct GreetingWorkflow;

#[async_trait::async_trait]
impl AbstractWorkflowHandler for GreetingWorkflow {
    async fn run(
        &self,
        mut context: WorkflowContext,
        name: String,
    ) -> Result<String, WorkflowError> {
        context.with_activity_options(ActivityOptions {
            start_to_close_timeout: Duration::from_secs(10),
        });

        info!(name = %name, "HelloWorld workflow started");

        let result = context.execute_activity(GreetingActivity, name).await?;

        info!(result = %result, "HelloWorld workflow completed");
        Ok(result)
    }
}
