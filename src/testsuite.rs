//! In-process environments for unit-testing workflows and activities
//! without an engine.
//!
//! [`TestWorkflowEnvironment`] runs a workflow handler directly and answers
//! its activity calls from mocks or from registered handlers.
//! [`TestActivityEnvironment`] runs a single registered activity.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::core::{
    activity::{AbstractActivityHandler, ActivityName},
    error::{ActivityError, WorkflowError},
    workflow::{
        AbstractWorkflowHandler, ActivityExecutor, ActivityOptions, WorkflowContext, WorkflowId,
        WorkflowInfo, WorkflowName, WorkflowRunId,
    },
};

pub const TEST_TASK_QUEUE: &str = "test-task-queue";

type MockKey = (ActivityName, String);

#[derive(Default)]
struct TestActivities {
    registered: DashMap<ActivityName, Arc<dyn AbstractActivityHandler>>,
    mocks: DashMap<MockKey, Result<String, ActivityError>>,
    executed: Mutex<Vec<ActivityName>>,
}

impl TestActivities {
    fn executed(&self) -> Vec<ActivityName> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn run(&self, name: ActivityName, input: String) -> Result<String, WorkflowError> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.clone());

        let mocked = self
            .mocks
            .get(&(name.clone(), input.clone()))
            .map(|mock| mock.value().clone());
        let result = match mocked {
            Some(result) => result,
            None => {
                let handler = self
                    .registered
                    .get(&name)
                    .map(|handler| Arc::clone(handler.value()))
                    .ok_or_else(|| WorkflowError::ActivityNotRegistered(name.clone()))?;
                handler.run(input).await
            }
        };

        result.map_err(|err| WorkflowError::ActivityFailed {
            name,
            message: err.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ActivityExecutor for TestActivities {
    async fn execute(
        &self,
        _info: &WorkflowInfo,
        name: ActivityName,
        input: String,
        _options: &ActivityOptions,
    ) -> Result<String, WorkflowError> {
        self.run(name, input).await
    }
}

/// Expectation created by [`TestWorkflowEnvironment::on_activity`].
pub struct ActivityMock<'a> {
    activities: &'a TestActivities,
    key: MockKey,
}

impl ActivityMock<'_> {
    /// Answer every matching call with `result`.
    pub fn returns(self, result: Result<String, ActivityError>) {
        self.activities.mocks.insert(self.key, result);
    }
}

pub struct TestWorkflowEnvironment {
    activities: Arc<TestActivities>,
    outcome: Option<Result<String, WorkflowError>>,
}

impl TestWorkflowEnvironment {
    pub fn new() -> Self {
        Self {
            activities: Arc::new(TestActivities::default()),
            outcome: None,
        }
    }

    /// Make a real activity available to unmocked calls.
    pub fn register_activity<H>(&mut self, activity_handler: H)
    where
        H: AbstractActivityHandler + 'static,
    {
        let name = ActivityName::from(&activity_handler);
        self.activities
            .registered
            .insert(name, Arc::new(activity_handler));
    }

    /// Mock the activity `handler` for calls with exactly `input`.
    pub fn on_activity<H>(&mut self, handler: &H, input: impl Into<String>) -> ActivityMock<'_>
    where
        H: AbstractActivityHandler + 'static,
    {
        ActivityMock {
            activities: &self.activities,
            key: (ActivityName::from(handler), input.into()),
        }
    }

    /// Run `workflow` to completion; inspect the outcome with the accessors below.
    pub async fn execute_workflow<W>(&mut self, workflow: &W, input: impl Into<String>)
    where
        W: AbstractWorkflowHandler + 'static,
    {
        let name = WorkflowName::from(workflow);
        let info = WorkflowInfo {
            workflow_id: WorkflowId::new(format!("test-{name}")),
            run_id: WorkflowRunId::new(),
            name,
            task_queue: TEST_TASK_QUEUE.to_string(),
        };
        let activities: Arc<dyn ActivityExecutor> = self.activities.clone();
        let context = WorkflowContext::new(info, activities);

        self.outcome = Some(workflow.run(context, input.into()).await);
    }

    pub fn is_workflow_completed(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn workflow_error(&self) -> Option<&WorkflowError> {
        self.outcome.as_ref()?.as_ref().err()
    }

    /// Result of a workflow that completed successfully.
    pub fn workflow_result(&self) -> Option<&str> {
        self.outcome.as_ref()?.as_deref().ok()
    }

    /// Activities called by the workflow, in call order.
    pub fn executed_activities(&self) -> Vec<ActivityName> {
        self.activities.executed()
    }
}

impl Default for TestWorkflowEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct TestActivityEnvironment {
    activities: TestActivities,
}

impl TestActivityEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_activity<H>(&mut self, activity_handler: H)
    where
        H: AbstractActivityHandler + 'static,
    {
        let name = ActivityName::from(&activity_handler);
        self.activities
            .registered
            .insert(name, Arc::new(activity_handler));
    }

    /// Run the registered activity matching `handler`.
    pub async fn execute_activity<H>(
        &self,
        handler: &H,
        input: impl Into<String>,
    ) -> Result<String, WorkflowError>
    where
        H: AbstractActivityHandler + 'static,
    {
        self.activities
            .run(ActivityName::from(handler), input.into())
            .await
    }
}
