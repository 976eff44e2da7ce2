use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::core::activity::{AbstractActivityHandler, ActivityName};
use crate::core::error::WorkflowError;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct WorkflowName(String);
impl WorkflowName {
    pub fn new(name: impl Into<String>) -> Self {
        WorkflowName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl<H> From<&H> for WorkflowName
where
    H: AbstractWorkflowHandler,
{
    fn from(_value: &H) -> Self {
        let name_string: String = std::any::type_name::<H>()
            .rsplit("::")
            .next()
            .unwrap_or("")
            .to_string();

        WorkflowName(name_string)
    }
}
impl fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-chosen identifier of a workflow execution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct WorkflowId(String);
impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        WorkflowId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        WorkflowId(value.to_string())
    }
}
impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-assigned identifier of a single run of a workflow id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct WorkflowRunId(Uuid);
impl Default for WorkflowRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRunId {
    pub fn new() -> Self {
        WorkflowRunId(Uuid::new_v4())
    }
}
impl fmt::Display for WorkflowRunId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A workflow run as the engine stores it.
#[derive(Debug, Clone)]
pub struct WorkflowExecution {
    pub workflow_id: WorkflowId,
    pub run_id: WorkflowRunId,
    pub name: WorkflowName,
    pub task_queue: String,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEventType {
    Pending,
    Started,
    Succeeded,
    Failed,
}

impl WorkflowEventType {
    pub fn is_closed(&self) -> bool {
        matches!(self, WorkflowEventType::Succeeded | WorkflowEventType::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowEvent {
    pub run_id: WorkflowRunId,
    pub event_type: WorkflowEventType,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WorkflowInfo {
    pub workflow_id: WorkflowId,
    pub run_id: WorkflowRunId,
    pub name: WorkflowName,
    pub task_queue: String,
}

#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Upper bound on how long the workflow waits for one activity call.
    pub start_to_close_timeout: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(60),
        }
    }
}

/// Carries out activity calls on behalf of a running workflow.
///
/// The worker implements this by scheduling the call on the engine; the
/// test environment implements it with mocks and in-process handlers.
#[async_trait::async_trait]
pub trait ActivityExecutor: Send + Sync {
    async fn execute(
        &self,
        info: &WorkflowInfo,
        name: ActivityName,
        input: String,
        options: &ActivityOptions,
    ) -> Result<String, WorkflowError>;
}

pub struct WorkflowContext {
    info: WorkflowInfo,
    activities: Arc<dyn ActivityExecutor>,
    activity_options: ActivityOptions,
}

impl WorkflowContext {
    pub fn new(info: WorkflowInfo, activities: Arc<dyn ActivityExecutor>) -> Self {
        Self {
            info,
            activities,
            activity_options: ActivityOptions::default(),
        }
    }

    pub fn info(&self) -> &WorkflowInfo {
        &self.info
    }

    pub fn with_activity_options(&mut self, activity_options: ActivityOptions) {
        self.activity_options = activity_options;
    }

    pub async fn execute_activity<H>(
        &mut self,
        handler: H,
        input: String,
    ) -> Result<String, WorkflowError>
    where
        H: AbstractActivityHandler + 'static,
    {
        let name = ActivityName::from(&handler);
        tracing::debug!(
            workflow_id = %self.info.workflow_id,
            run_id = %self.info.run_id,
            activity = %name,
            "Executing activity"
        );
        self.activities
            .execute(&self.info, name, input, &self.activity_options)
            .await
    }
}

#[async_trait::async_trait]
pub trait AbstractWorkflowHandler: Send + Sync {
    async fn run(&self, context: WorkflowContext, input: String) -> Result<String, WorkflowError>;
}
