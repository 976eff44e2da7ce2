use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::ActivityError;
use crate::core::workflow::WorkflowRunId;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ActivityName(String);
impl ActivityName {
    pub fn new(name: impl Into<String>) -> Self {
        ActivityName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl<H> From<&H> for ActivityName
where
    H: AbstractActivityHandler,
{
    fn from(_value: &H) -> Self {
        let name_string: String = std::any::type_name::<H>()
            .rsplit("::")
            .next()
            .unwrap_or("")
            .to_string();
        ActivityName(name_string)
    }
}
impl fmt::Display for ActivityName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ActivityRunId(Uuid);
impl Default for ActivityRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityRunId {
    pub fn new() -> Self {
        ActivityRunId(Uuid::new_v4())
    }
}
impl fmt::Display for ActivityRunId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An activity invocation scheduled by a workflow run.
#[derive(Debug, Clone)]
pub struct ActivityExecution {
    pub activity_run_id: ActivityRunId,
    pub workflow_run_id: WorkflowRunId,
    pub name: ActivityName,
    pub task_queue: String,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEventType {
    Pending,
    Started,
    Succeeded,
    Failed,
}

impl ActivityEventType {
    pub fn is_closed(&self) -> bool {
        matches!(self, ActivityEventType::Succeeded | ActivityEventType::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub activity_run_id: ActivityRunId,
    pub event_type: ActivityEventType,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait AbstractActivityHandler: Send + Sync {
    async fn run(&self, input: String) -> Result<String, ActivityError>;
}
