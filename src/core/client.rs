use std::env;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::{
    activity::{ActivityName, ActivityRunId},
    error::ClientError,
    worker_events::{
        Outcome, PollActivityCompletion, PollActivityResponse, PollWorkflowCompletion,
        PollWorkflowResponse, ServerEvent, WorkerEvent,
    },
    workflow::{AbstractWorkflowHandler, WorkflowId, WorkflowName, WorkflowRunId},
};

pub const DEFAULT_HOST_PORT: &str = "127.0.0.1:7233";

/// Connection settings for [`Client::dial`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Engine address in `host:port` form (default: "127.0.0.1:7233")
    pub host_port: String,
    /// Per-request timeout; must outlast the engine's long-poll timeout (default: 90s)
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host_port: DEFAULT_HOST_PORT.to_string(),
            request_timeout: Duration::from_secs(90),
        }
    }
}

impl ClientOptions {
    /// Load options from the environment.
    ///
    /// - `HELLOWORLD_HOST_PORT` - engine address (default: "127.0.0.1:7233")
    /// - `HELLOWORLD_REQUEST_TIMEOUT_MS` - request timeout (default: 90000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host_port = env::var("HELLOWORLD_HOST_PORT")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.host_port);

        let request_timeout = env::var("HELLOWORLD_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);

        Self {
            host_port,
            request_timeout,
        }
    }

    pub fn with_host_port(mut self, host_port: impl Into<String>) -> Self {
        self.host_port = host_port.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn base_url(&self) -> String {
        if self.host_port.starts_with("http://") || self.host_port.starts_with("https://") {
            self.host_port.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.host_port)
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    pub id: WorkflowId,
    pub task_queue: String,
}

/// Handle to a started workflow run.
#[derive(Clone)]
pub struct WorkflowRun {
    id: WorkflowId,
    run_id: WorkflowRunId,
    client: Client,
}

impl WorkflowRun {
    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn run_id(&self) -> WorkflowRunId {
        self.run_id
    }

    /// Wait for the run to close and return its result.
    pub async fn get(&self) -> Result<String, ClientError> {
        loop {
            if let Some(completion) = self.client.poll_workflow_completion(self.run_id).await? {
                return match completion.outcome {
                    Outcome::Completed(result) => Ok(result),
                    Outcome::Failed(error) => Err(ClientError::WorkflowFailed(error)),
                };
            }
        }
    }
}

/// Long-lived handle to the engine. Create once per process and pass it
/// around; clones share the underlying connection pool.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Build a client and check that the engine answers.
    pub async fn dial(options: ClientOptions) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        let base_url = options.base_url();

        client
            .get(format!("{}/health", &base_url))
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|source| ClientError::Connect {
                host_port: options.host_port.clone(),
                source,
            })?;

        debug!(base_url = %base_url, "Connected to engine");
        Ok(Self { client, base_url })
    }

    /// Release the handle. Other clones stay usable.
    pub fn close(self) {
        debug!(base_url = %self.base_url, "Closing client");
    }

    async fn send(&self, event: &WorkerEvent) -> Result<ServerEvent, ClientError> {
        let text_res = self
            .client
            .post(format!("{}/worker_event", &self.base_url))
            .json(event)
            .send()
            .await?
            .text()
            .await?;

        match serde_json::from_str::<ServerEvent>(&text_res)? {
            ServerEvent::Rejected { reason } => Err(ClientError::Rejected(reason)),
            server_event => Ok(server_event),
        }
    }

    pub async fn execute_workflow<W>(
        &self,
        options: StartWorkflowOptions,
        workflow: &W,
        input: impl Into<String>,
    ) -> Result<WorkflowRun, ClientError>
    where
        W: AbstractWorkflowHandler + 'static,
    {
        let name = WorkflowName::from(workflow);
        info!(
            workflow = %name,
            workflow_id = %options.id,
            task_queue = %options.task_queue,
            "Executing workflow"
        );

        let event = WorkerEvent::StartWorkflow {
            workflow_id: options.id,
            task_queue: options.task_queue,
            name,
            input: input.into(),
        };

        match self.send(&event).await? {
            ServerEvent::WorkflowStarted {
                workflow_id,
                workflow_run_id,
            } => Ok(WorkflowRun {
                id: workflow_id,
                run_id: workflow_run_id,
                client: self.clone(),
            }),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn poll_workflow_completion(
        &self,
        workflow_run_id: WorkflowRunId,
    ) -> Result<Option<PollWorkflowCompletion>, ClientError> {
        let event = WorkerEvent::PollWorkflowCompletion { workflow_run_id };

        match self.send(&event).await? {
            ServerEvent::PollWorkflowCompletion(poll_response) => Ok(Some(poll_response)),
            ServerEvent::NoTask => Ok(None),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn poll_workflow(
        &self,
        task_queue: &str,
        names: Vec<WorkflowName>,
        identity: &str,
    ) -> Result<Option<PollWorkflowResponse>, ClientError> {
        let event = WorkerEvent::PollWorkflow {
            task_queue: task_queue.to_string(),
            names,
            identity: identity.to_string(),
        };

        match self.send(&event).await? {
            ServerEvent::PollWorkflowResponse(poll_response) => Ok(Some(poll_response)),
            ServerEvent::NoTask => Ok(None),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn complete_workflow(
        &self,
        workflow_run_id: WorkflowRunId,
        outcome: Outcome,
    ) -> Result<(), ClientError> {
        let event = WorkerEvent::CompleteWorkflow {
            workflow_run_id,
            outcome,
        };

        self.send(&event).await.map(|_| ())
    }

    pub async fn schedule_activity(
        &self,
        workflow_run_id: WorkflowRunId,
        task_queue: &str,
        name: ActivityName,
        input: String,
    ) -> Result<ActivityRunId, ClientError> {
        let event = WorkerEvent::ScheduleActivity {
            workflow_run_id,
            task_queue: task_queue.to_string(),
            name,
            input,
        };

        match self.send(&event).await? {
            ServerEvent::ActivityScheduled { activity_run_id } => Ok(activity_run_id),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn poll_activity_completion(
        &self,
        activity_run_id: ActivityRunId,
    ) -> Result<Option<PollActivityCompletion>, ClientError> {
        let event = WorkerEvent::PollActivityCompletion { activity_run_id };

        match self.send(&event).await? {
            ServerEvent::PollActivityCompletion(poll_response) => Ok(Some(poll_response)),
            ServerEvent::NoTask => Ok(None),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn poll_activity(
        &self,
        task_queue: &str,
        names: Vec<ActivityName>,
        identity: &str,
    ) -> Result<Option<PollActivityResponse>, ClientError> {
        let event = WorkerEvent::PollActivity {
            task_queue: task_queue.to_string(),
            names,
            identity: identity.to_string(),
        };

        match self.send(&event).await? {
            ServerEvent::PollActivityResponse(poll_response) => Ok(Some(poll_response)),
            ServerEvent::NoTask => Ok(None),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    pub async fn complete_activity(
        &self,
        activity_run_id: ActivityRunId,
        outcome: Outcome,
    ) -> Result<(), ClientError> {
        let event = WorkerEvent::CompleteActivity {
            activity_run_id,
            outcome,
        };

        self.send(&event).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_point_at_local_engine() {
        let options = ClientOptions::default();
        assert_eq!(options.host_port, "127.0.0.1:7233");
        assert_eq!(options.base_url(), "http://127.0.0.1:7233");
    }

    #[test]
    fn base_url_keeps_explicit_scheme() {
        let options = ClientOptions::default().with_host_port("https://engine.local:9000/");
        assert_eq!(options.base_url(), "https://engine.local:9000");
    }

    #[test]
    fn builder_setters_override_defaults() {
        let options = ClientOptions::default()
            .with_host_port("10.0.0.1:8000")
            .with_request_timeout(Duration::from_millis(250));
        assert_eq!(options.host_port, "10.0.0.1:8000");
        assert_eq!(options.request_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn dial_fails_when_engine_is_unreachable() {
        // Port 9 (discard) is not expected to host an HTTP service.
        let options = ClientOptions::default()
            .with_host_port("127.0.0.1:9")
            .with_request_timeout(Duration::from_secs(2));

        let err = Client::dial(options).await.err().unwrap();
        assert!(matches!(err, ClientError::Connect { .. }));
    }
}
