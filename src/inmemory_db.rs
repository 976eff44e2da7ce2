use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::activity::{
    ActivityEvent, ActivityEventType, ActivityExecution, ActivityName, ActivityRunId,
};
use crate::core::worker_events::Outcome;
use crate::core::workflow::{
    WorkflowEvent, WorkflowEventType, WorkflowExecution, WorkflowId, WorkflowName, WorkflowRunId,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DbError {
    #[error("workflow execution already started: {0}")]
    AlreadyStarted(WorkflowId),

    #[error("unknown workflow run: {0}")]
    UnknownWorkflowRun(WorkflowRunId),

    #[error("unknown activity run: {0}")]
    UnknownActivityRun(ActivityRunId),
}

/// Engine state: run records, their event histories and one FIFO per task queue.
#[derive(Clone)]
pub struct Db {
    pub workflow_executions: Arc<DashMap<WorkflowRunId, WorkflowExecution>>,
    pub workflow_events: Arc<DashMap<WorkflowRunId, Vec<WorkflowEvent>>>,
    pub latest_runs: Arc<DashMap<WorkflowId, WorkflowRunId>>,
    pub workflow_queues: Arc<DashMap<String, VecDeque<WorkflowRunId>>>,

    pub activity_executions: Arc<DashMap<ActivityRunId, ActivityExecution>>,
    pub activity_events: Arc<DashMap<ActivityRunId, Vec<ActivityEvent>>>,
    pub activity_queues: Arc<DashMap<String, VecDeque<ActivityRunId>>>,
}

impl Db {
    pub fn new() -> Self {
        Self {
            workflow_executions: Arc::new(DashMap::new()),
            workflow_events: Arc::new(DashMap::new()),
            latest_runs: Arc::new(DashMap::new()),
            workflow_queues: Arc::new(DashMap::new()),

            activity_executions: Arc::new(DashMap::new()),
            activity_events: Arc::new(DashMap::new()),
            activity_queues: Arc::new(DashMap::new()),
        }
    }

    /// Create a new run for `workflow_id` unless its latest run is still open.
    pub async fn start_workflow(
        &self,
        workflow_id: WorkflowId,
        name: WorkflowName,
        task_queue: String,
        input: String,
    ) -> Result<WorkflowRunId, DbError> {
        let run_id = WorkflowRunId::new();

        match self.latest_runs.entry(workflow_id.clone()) {
            Entry::Occupied(mut latest) => {
                if !self.workflow_closed(*latest.get()) {
                    return Err(DbError::AlreadyStarted(workflow_id));
                }
                latest.insert(run_id);
            }
            Entry::Vacant(latest) => {
                latest.insert(run_id);
            }
        }

        self.workflow_executions.insert(
            run_id,
            WorkflowExecution {
                workflow_id,
                run_id,
                name,
                task_queue: task_queue.clone(),
                input: input.clone(),
            },
        );
        self.add_workflow_event(WorkflowEvent {
            run_id,
            event_type: WorkflowEventType::Pending,
            payload: input,
            created_at: Utc::now(),
        })
        .await;
        self.workflow_queues
            .entry(task_queue)
            .or_default()
            .push_back(run_id);

        Ok(run_id)
    }

    /// Pop the oldest pending run on `task_queue` whose workflow is in `names`
    /// and mark it started.
    pub async fn take_pending_workflow(
        &self,
        task_queue: &str,
        names: &[WorkflowName],
    ) -> Option<WorkflowExecution> {
        let execution = {
            let mut queue = self.workflow_queues.get_mut(task_queue)?;
            let position = queue.iter().position(|run_id| {
                self.workflow_executions
                    .get(run_id)
                    .is_some_and(|execution| names.contains(&execution.name))
            })?;
            let run_id = queue.remove(position)?;
            self.workflow_executions.get(&run_id)?.clone()
        };

        self.add_workflow_event(WorkflowEvent {
            run_id: execution.run_id,
            event_type: WorkflowEventType::Started,
            payload: "".to_string(),
            created_at: Utc::now(),
        })
        .await;

        Some(execution)
    }

    /// Record the outcome of a run. Reports for a run that already closed are ignored.
    pub async fn complete_workflow(
        &self,
        run_id: WorkflowRunId,
        outcome: Outcome,
    ) -> Result<(), DbError> {
        if !self.workflow_executions.contains_key(&run_id) {
            return Err(DbError::UnknownWorkflowRun(run_id));
        }

        // Check and append under one guard so concurrent reports close the run once.
        let mut events = self.workflow_events.entry(run_id).or_default();
        if events.iter().any(|we| we.event_type.is_closed()) {
            return Ok(());
        }

        let (event_type, payload) = match outcome {
            Outcome::Completed(result) => (WorkflowEventType::Succeeded, result),
            Outcome::Failed(error) => (WorkflowEventType::Failed, error),
        };
        events.push(WorkflowEvent {
            run_id,
            event_type,
            payload,
            created_at: Utc::now(),
        });

        Ok(())
    }

    pub async fn workflow_run_exists(&self, run_id: WorkflowRunId) -> bool {
        self.workflow_executions.contains_key(&run_id)
    }

    fn workflow_closed(&self, run_id: WorkflowRunId) -> bool {
        self.workflow_events
            .get(&run_id)
            .is_some_and(|events| events.iter().any(|we| we.event_type.is_closed()))
    }

    pub async fn add_workflow_event(&self, event: WorkflowEvent) {
        self.workflow_events
            .entry(event.run_id)
            .and_modify(|events| events.push(event.clone()))
            .or_insert(vec![event]);
    }

    pub async fn get_completed_workflow(&self, run_id: WorkflowRunId) -> Option<WorkflowEvent> {
        let workflow_events = self.workflow_events.get(&run_id)?;

        workflow_events
            .iter()
            .find(|we| we.event_type.is_closed())
            .cloned()
    }

    pub async fn get_last_workflow_run_event(
        &self,
        run_id: WorkflowRunId,
    ) -> Option<WorkflowEvent> {
        self.workflow_events.get(&run_id)?.last().cloned()
    }

    pub async fn workflow_history(&self, run_id: WorkflowRunId) -> Vec<WorkflowEvent> {
        self.workflow_events
            .get(&run_id)
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub async fn schedule_activity(
        &self,
        workflow_run_id: WorkflowRunId,
        name: ActivityName,
        task_queue: String,
        input: String,
    ) -> Result<ActivityRunId, DbError> {
        if !self.workflow_run_exists(workflow_run_id).await {
            return Err(DbError::UnknownWorkflowRun(workflow_run_id));
        }

        let activity_run_id = ActivityRunId::new();
        self.activity_executions.insert(
            activity_run_id,
            ActivityExecution {
                activity_run_id,
                workflow_run_id,
                name,
                task_queue: task_queue.clone(),
                input: input.clone(),
            },
        );
        self.add_activity_event(ActivityEvent {
            activity_run_id,
            event_type: ActivityEventType::Pending,
            payload: input,
            created_at: Utc::now(),
        })
        .await;
        self.activity_queues
            .entry(task_queue)
            .or_default()
            .push_back(activity_run_id);

        Ok(activity_run_id)
    }

    pub async fn take_pending_activity(
        &self,
        task_queue: &str,
        names: &[ActivityName],
    ) -> Option<ActivityExecution> {
        let execution = {
            let mut queue = self.activity_queues.get_mut(task_queue)?;
            let position = queue.iter().position(|run_id| {
                self.activity_executions
                    .get(run_id)
                    .is_some_and(|execution| names.contains(&execution.name))
            })?;
            let activity_run_id = queue.remove(position)?;
            self.activity_executions.get(&activity_run_id)?.clone()
        };

        self.add_activity_event(ActivityEvent {
            activity_run_id: execution.activity_run_id,
            event_type: ActivityEventType::Started,
            payload: "".to_string(),
            created_at: Utc::now(),
        })
        .await;

        Some(execution)
    }

    pub async fn complete_activity(
        &self,
        activity_run_id: ActivityRunId,
        outcome: Outcome,
    ) -> Result<(), DbError> {
        if !self.activity_executions.contains_key(&activity_run_id) {
            return Err(DbError::UnknownActivityRun(activity_run_id));
        }

        let mut events = self.activity_events.entry(activity_run_id).or_default();
        if events.iter().any(|ae| ae.event_type.is_closed()) {
            return Ok(());
        }

        let (event_type, payload) = match outcome {
            Outcome::Completed(result) => (ActivityEventType::Succeeded, result),
            Outcome::Failed(error) => (ActivityEventType::Failed, error),
        };
        events.push(ActivityEvent {
            activity_run_id,
            event_type,
            payload,
            created_at: Utc::now(),
        });

        Ok(())
    }

    pub async fn activity_run_exists(&self, activity_run_id: ActivityRunId) -> bool {
        self.activity_executions.contains_key(&activity_run_id)
    }

    pub async fn add_activity_event(&self, event: ActivityEvent) {
        self.activity_events
            .entry(event.activity_run_id)
            .and_modify(|events| events.push(event.clone()))
            .or_insert(vec![event]);
    }

    pub async fn get_completed_activity(
        &self,
        activity_run_id: ActivityRunId,
    ) -> Option<ActivityEvent> {
        let activity_events = self.activity_events.get(&activity_run_id)?;

        activity_events
            .iter()
            .find(|ae| ae.event_type.is_closed())
            .cloned()
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting() -> WorkflowName {
        WorkflowName::new("GreetingWorkflow")
    }

    #[tokio::test]
    async fn start_then_take_marks_run_started() {
        let db = Db::new();
        let run_id = db
            .start_workflow(
                WorkflowId::new("wf-1"),
                greeting(),
                "hello-world".to_string(),
                "Temporal".to_string(),
            )
            .await
            .unwrap();

        let taken = db
            .take_pending_workflow("hello-world", &[greeting()])
            .await
            .unwrap();
        assert_eq!(taken.run_id, run_id);
        assert_eq!(taken.input, "Temporal");

        let last = db.get_last_workflow_run_event(run_id).await.unwrap();
        assert_eq!(last.event_type, WorkflowEventType::Started);

        // Handed out once only.
        assert!(db
            .take_pending_workflow("hello-world", &[greeting()])
            .await
            .is_none());
    }

    #[tokio::test]
    async fn take_respects_task_queue_and_names() {
        let db = Db::new();
        db.start_workflow(
            WorkflowId::new("wf-1"),
            greeting(),
            "hello-world".to_string(),
            "x".to_string(),
        )
        .await
        .unwrap();

        assert!(db
            .take_pending_workflow("other-queue", &[greeting()])
            .await
            .is_none());
        assert!(db
            .take_pending_workflow("hello-world", &[WorkflowName::new("Other")])
            .await
            .is_none());
        assert!(db
            .take_pending_workflow("hello-world", &[greeting()])
            .await
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takers_get_a_task_once() {
        let db = Db::new();
        db.start_workflow(
            WorkflowId::new("wf-1"),
            greeting(),
            "hello-world".to_string(),
            "x".to_string(),
        )
        .await
        .unwrap();

        let takers: Vec<_> = (0..16)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.take_pending_workflow("hello-world", &[greeting()])
                        .await
                        .is_some()
                })
            })
            .collect();

        let mut taken = 0;
        for taker in takers {
            if taker.await.unwrap() {
                taken += 1;
            }
        }
        assert_eq!(taken, 1);
    }

    #[tokio::test]
    async fn open_workflow_id_cannot_be_started_twice() {
        let db = Db::new();
        let id = WorkflowId::new("hello_world_workflowID");
        let first = db
            .start_workflow(id.clone(), greeting(), "q".to_string(), "a".to_string())
            .await
            .unwrap();

        let err = db
            .start_workflow(id.clone(), greeting(), "q".to_string(), "b".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, DbError::AlreadyStarted(id.clone()));

        db.complete_workflow(first, Outcome::Completed("done".to_string()))
            .await
            .unwrap();
        let second = db
            .start_workflow(id, greeting(), "q".to_string(), "c".to_string())
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn completion_is_recorded_once() {
        let db = Db::new();
        let run_id = db
            .start_workflow(
                WorkflowId::new("wf"),
                greeting(),
                "q".to_string(),
                "".to_string(),
            )
            .await
            .unwrap();

        db.complete_workflow(run_id, Outcome::Failed("boom".to_string()))
            .await
            .unwrap();
        db.complete_workflow(run_id, Outcome::Completed("late".to_string()))
            .await
            .unwrap();

        let completed = db.get_completed_workflow(run_id).await.unwrap();
        assert_eq!(completed.event_type, WorkflowEventType::Failed);
        assert_eq!(completed.payload, "boom");
        assert_eq!(db.workflow_history(run_id).await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_close_a_run_once() {
        let db = Db::new();
        let run_id = db
            .start_workflow(
                WorkflowId::new("wf"),
                greeting(),
                "q".to_string(),
                "World".to_string(),
            )
            .await
            .unwrap();
        let activity_run_id = db
            .schedule_activity(
                run_id,
                ActivityName::new("GreetingActivity"),
                "q".to_string(),
                "World".to_string(),
            )
            .await
            .unwrap();

        let reporters: Vec<_> = (0..16)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.complete_activity(activity_run_id, Outcome::Completed(format!("a{i}")))
                        .await
                        .unwrap();
                    db.complete_workflow(run_id, Outcome::Completed(format!("w{i}")))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for reporter in reporters {
            reporter.await.unwrap();
        }

        let closed_workflow_events = db
            .workflow_history(run_id)
            .await
            .iter()
            .filter(|we| we.event_type.is_closed())
            .count();
        assert_eq!(closed_workflow_events, 1);

        let closed_activity_events = db
            .activity_events
            .get(&activity_run_id)
            .unwrap()
            .iter()
            .filter(|ae| ae.event_type.is_closed())
            .count();
        assert_eq!(closed_activity_events, 1);
    }

    #[tokio::test]
    async fn unknown_runs_are_rejected() {
        let db = Db::new();
        let missing = WorkflowRunId::new();
        assert_eq!(
            db.complete_workflow(missing, Outcome::Completed("x".to_string()))
                .await,
            Err(DbError::UnknownWorkflowRun(missing))
        );
        assert_eq!(
            db.schedule_activity(
                missing,
                ActivityName::new("GreetingActivity"),
                "q".to_string(),
                "x".to_string()
            )
            .await,
            Err(DbError::UnknownWorkflowRun(missing))
        );
    }

    #[tokio::test]
    async fn activity_lifecycle() {
        let db = Db::new();
        let run_id = db
            .start_workflow(
                WorkflowId::new("wf"),
                greeting(),
                "q".to_string(),
                "World".to_string(),
            )
            .await
            .unwrap();
        let name = ActivityName::new("GreetingActivity");
        let activity_run_id = db
            .schedule_activity(run_id, name.clone(), "q".to_string(), "World".to_string())
            .await
            .unwrap();
        assert!(db.get_completed_activity(activity_run_id).await.is_none());

        let taken = db
            .take_pending_activity("q", std::slice::from_ref(&name))
            .await
            .unwrap();
        assert_eq!(taken.activity_run_id, activity_run_id);
        assert_eq!(taken.workflow_run_id, run_id);

        db.complete_activity(activity_run_id, Outcome::Completed("Hello World!".to_string()))
            .await
            .unwrap();
        let completed = db.get_completed_activity(activity_run_id).await.unwrap();
        assert_eq!(completed.event_type, ActivityEventType::Succeeded);
        assert_eq!(completed.payload, "Hello World!");
    }
}
