use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, RwLock};
use tracing::{debug, error, info, warn};

use crate::core::{
    activity::{AbstractActivityHandler, ActivityName},
    client::Client,
    error::{ClientError, WorkflowError},
    worker_events::{Outcome, PollActivityResponse, PollWorkflowResponse},
    workflow::{
        AbstractWorkflowHandler, ActivityExecutor, ActivityOptions, WorkflowContext, WorkflowInfo,
        WorkflowName,
    },
};

type WorkflowHandlers = Arc<RwLock<HashMap<WorkflowName, Arc<dyn AbstractWorkflowHandler>>>>;
type ActivityHandlers = Arc<RwLock<HashMap<ActivityName, Arc<dyn AbstractActivityHandler>>>>;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Sent with every poll so the engine can tell workers apart in its logs.
    pub identity: String,
    /// Pause after a failed poll before trying again.
    pub poll_error_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            identity: format!("{}@helloworld", std::process::id()),
            poll_error_backoff: Duration::from_millis(200),
        }
    }
}

impl WorkerOptions {
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_poll_error_backoff(mut self, backoff: Duration) -> Self {
        self.poll_error_backoff = backoff;
        self
    }
}

/// Polls one task queue and runs the workflows and activities registered on it.
///
/// Handlers can be registered before or after [`Worker::run`] starts. An idle
/// poller wakes up on registration; a poll already in flight is left to
/// finish and the new names go out with the next one.
#[derive(Clone)]
pub struct Worker {
    workflow_handlers: WorkflowHandlers,
    activity_handlers: ActivityHandlers,
    registered: Arc<Notify>,
    client: Client,
    task_queue: String,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(client: Client, task_queue: impl Into<String>, options: WorkerOptions) -> Self {
        Worker {
            workflow_handlers: Arc::new(RwLock::new(HashMap::new())),
            activity_handlers: Arc::new(RwLock::new(HashMap::new())),
            registered: Arc::new(Notify::new()),
            client,
            task_queue: task_queue.into(),
            options,
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub async fn register_workflow<W>(&self, workflow_handler: W) -> &Self
    where
        W: AbstractWorkflowHandler + 'static,
    {
        let name = WorkflowName::from(&workflow_handler);
        info!(workflow = %name, task_queue = %self.task_queue, "Registered workflow");
        self.workflow_handlers
            .write()
            .await
            .insert(name, Arc::new(workflow_handler));
        self.registered.notify_waiters();
        self
    }

    pub async fn register_activity<H>(&self, activity_handler: H) -> &Self
    where
        H: AbstractActivityHandler + 'static,
    {
        let name = ActivityName::from(&activity_handler);
        info!(activity = %name, task_queue = %self.task_queue, "Registered activity");
        self.activity_handlers
            .write()
            .await
            .insert(name, Arc::new(activity_handler));
        self.registered.notify_waiters();
        self
    }

    pub async fn workflow_names(&self) -> Vec<WorkflowName> {
        self.workflow_handlers.read().await.keys().cloned().collect()
    }

    pub async fn activity_names(&self) -> Vec<ActivityName> {
        self.activity_handlers.read().await.keys().cloned().collect()
    }

    /// Poll the task queue until `interrupt` resolves.
    pub async fn run<F>(&self, interrupt: F)
    where
        F: Future<Output = ()>,
    {
        info!(task_queue = %self.task_queue, identity = %self.options.identity, "Starting worker");
        let (stop_tx, stop_rx) = watch::channel(false);

        let workflows = tokio::task::spawn(self.clone().poll_workflow_tasks(stop_rx.clone()));
        let activities = tokio::task::spawn(self.clone().poll_activity_tasks(stop_rx));

        interrupt.await;
        info!(task_queue = %self.task_queue, "Stopping worker");
        let _ = stop_tx.send(true);

        let (workflows, activities) = tokio::join!(workflows, activities);
        for joined in [workflows, activities] {
            if let Err(e) = joined {
                error!(error = %e, "Poller task ended abnormally");
            }
        }
        info!(task_queue = %self.task_queue, "Worker stopped");
    }

    async fn poll_workflow_tasks(self, mut stop: watch::Receiver<bool>) {
        while !stop_requested(&stop) {
            let registered = self.registered.notified();
            let names = self.workflow_names().await;
            if names.is_empty() {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = registered => {}
                }
                continue;
            }

            let poll = self
                .client
                .poll_workflow(&self.task_queue, names, &self.options.identity);
            tokio::select! {
                _ = stop.changed() => break,
                polled = poll => match polled {
                    Ok(Some(task)) => {
                        let worker = self.clone();
                        tokio::task::spawn(async move {
                            worker.process_workflow_task(task).await
                        });
                    }
                    Ok(None) => {}
                    Err(e) => self.back_off("workflow", e).await,
                },
            }
        }
    }

    async fn poll_activity_tasks(self, mut stop: watch::Receiver<bool>) {
        while !stop_requested(&stop) {
            let registered = self.registered.notified();
            let names = self.activity_names().await;
            if names.is_empty() {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = registered => {}
                }
                continue;
            }

            let poll = self
                .client
                .poll_activity(&self.task_queue, names, &self.options.identity);
            tokio::select! {
                _ = stop.changed() => break,
                polled = poll => match polled {
                    Ok(Some(task)) => {
                        let worker = self.clone();
                        tokio::task::spawn(async move {
                            worker.process_activity_task(task).await
                        });
                    }
                    Ok(None) => {}
                    Err(e) => self.back_off("activity", e).await,
                },
            }
        }
    }

    async fn back_off(&self, kind: &str, e: ClientError) {
        warn!(task_queue = %self.task_queue, kind, error = %e, "Poll failed");
        tokio::time::sleep(self.options.poll_error_backoff).await;
    }

    async fn process_workflow_task(&self, task: PollWorkflowResponse) {
        let handler = self.workflow_handlers.read().await.get(&task.name).cloned();

        let outcome = match handler {
            Some(handler) => {
                debug!(
                    workflow_id = %task.workflow_id,
                    run_id = %task.workflow_run_id,
                    "Running workflow task"
                );
                let info = WorkflowInfo {
                    workflow_id: task.workflow_id.clone(),
                    run_id: task.workflow_run_id,
                    name: task.name.clone(),
                    task_queue: task.task_queue.clone(),
                };
                let activities = Arc::new(EngineActivities {
                    client: self.client.clone(),
                });
                let context = WorkflowContext::new(info, activities);
                match handler.run(context, task.input).await {
                    Ok(result) => Outcome::Completed(result),
                    Err(e) => {
                        warn!(workflow_id = %task.workflow_id, error = %e, "Workflow failed");
                        Outcome::Failed(e.to_string())
                    }
                }
            }
            None => Outcome::Failed(format!("workflow {} is not registered", task.name)),
        };

        if let Err(e) = self
            .client
            .complete_workflow(task.workflow_run_id, outcome)
            .await
        {
            error!(
                run_id = %task.workflow_run_id,
                error = %e,
                "Could not report workflow completion"
            );
        }
    }

    async fn process_activity_task(&self, task: PollActivityResponse) {
        let handler = self.activity_handlers.read().await.get(&task.name).cloned();

        let outcome = match handler {
            Some(handler) => {
                debug!(
                    activity = %task.name,
                    activity_run_id = %task.activity_run_id,
                    "Running activity task"
                );
                match handler.run(task.input).await {
                    Ok(result) => Outcome::Completed(result),
                    Err(e) => Outcome::Failed(e.to_string()),
                }
            }
            None => Outcome::Failed(format!("activity {} is not registered", task.name)),
        };

        if let Err(e) = self
            .client
            .complete_activity(task.activity_run_id, outcome)
            .await
        {
            error!(
                activity_run_id = %task.activity_run_id,
                error = %e,
                "Could not report activity completion"
            );
        }
    }
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

/// Resolves when the process receives Ctrl-C.
pub async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for interrupt");
    }
}

/// Runs activity calls by scheduling them on the engine and waiting for
/// whichever worker picks them up.
struct EngineActivities {
    client: Client,
}

#[async_trait::async_trait]
impl ActivityExecutor for EngineActivities {
    async fn execute(
        &self,
        info: &WorkflowInfo,
        name: ActivityName,
        input: String,
        options: &ActivityOptions,
    ) -> Result<String, WorkflowError> {
        let activity_run_id = self
            .client
            .schedule_activity(info.run_id, &info.task_queue, name.clone(), input)
            .await?;

        let wait = async {
            loop {
                if let Some(completion) = self
                    .client
                    .poll_activity_completion(activity_run_id)
                    .await?
                {
                    return Ok::<Outcome, ClientError>(completion.outcome);
                }
            }
        };

        match tokio::time::timeout(options.start_to_close_timeout, wait).await {
            Err(_) => Err(WorkflowError::ActivityTimedOut(name)),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(Outcome::Completed(result))) => Ok(result),
            Ok(Ok(Outcome::Failed(message))) => {
                Err(WorkflowError::ActivityFailed { name, message })
            }
        }
    }
}
