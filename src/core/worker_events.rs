use serde::{Deserialize, Serialize};

use crate::core::{
    activity::{ActivityName, ActivityRunId},
    workflow::{WorkflowId, WorkflowName, WorkflowRunId},
};

/// How a workflow or activity run closed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed(String),
    Failed(String),
}

#[derive(Serialize, Deserialize, Debug)]
pub enum WorkerEvent {
    StartWorkflow {
        workflow_id: WorkflowId,
        task_queue: String,
        name: WorkflowName,
        input: String,
    },
    PollWorkflow {
        task_queue: String,
        names: Vec<WorkflowName>,
        identity: String,
    },
    CompleteWorkflow {
        workflow_run_id: WorkflowRunId,
        outcome: Outcome,
    },
    PollWorkflowCompletion {
        workflow_run_id: WorkflowRunId,
    },
    ScheduleActivity {
        workflow_run_id: WorkflowRunId,
        task_queue: String,
        name: ActivityName,
        input: String,
    },
    PollActivity {
        task_queue: String,
        names: Vec<ActivityName>,
        identity: String,
    },
    CompleteActivity {
        activity_run_id: ActivityRunId,
        outcome: Outcome,
    },
    PollActivityCompletion {
        activity_run_id: ActivityRunId,
    },
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PollWorkflowResponse {
    pub workflow_id: WorkflowId,
    pub workflow_run_id: WorkflowRunId,
    pub name: WorkflowName,
    pub task_queue: String,
    pub input: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PollActivityResponse {
    pub activity_run_id: ActivityRunId,
    pub workflow_run_id: WorkflowRunId,
    pub name: ActivityName,
    pub input: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PollWorkflowCompletion {
    pub workflow_run_id: WorkflowRunId,
    pub outcome: Outcome,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PollActivityCompletion {
    pub activity_run_id: ActivityRunId,
    pub outcome: Outcome,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum ServerEvent {
    WorkflowStarted {
        workflow_id: WorkflowId,
        workflow_run_id: WorkflowRunId,
    },
    ActivityScheduled {
        activity_run_id: ActivityRunId,
    },
    PollWorkflowResponse(PollWorkflowResponse),
    PollActivityResponse(PollActivityResponse),
    PollWorkflowCompletion(PollWorkflowCompletion),
    PollActivityCompletion(PollActivityCompletion),
    GeneralSuccess { success: bool },
    /// A long poll expired without work.
    NoTask,
    Rejected { reason: String },
}
