use std::time::{Duration, Instant};

use helloworld::core::{
    AbstractActivityHandler, AbstractWorkflowHandler, ActivityError, ActivityOptions,
    ClientError, StartWorkflowOptions, WorkerOptions, WorkflowContext, WorkflowError, WorkflowId,
};
use helloworld::sample::{run, GreetingActivity, GreetingWorkflow, RunError, WORKFLOW_ID};
use helloworld::testserver::Env;
use helloworld::testsuite::{TestActivityEnvironment, TestWorkflowEnvironment};
use helloworld::tracing_setup::init_test_tracing;

struct RefusingActivity;
#[async_trait::async_trait]
impl AbstractActivityHandler for RefusingActivity {
    async fn run(&self, input: String) -> Result<String, ActivityError> {
        Err(ActivityError::Application(format!("refusing {input}")))
    }
}

struct RefusingWorkflow;
#[async_trait::async_trait]
impl AbstractWorkflowHandler for RefusingWorkflow {
    async fn run(
        &self,
        mut context: WorkflowContext,
        input: String,
    ) -> Result<String, WorkflowError> {
        context.execute_activity(RefusingActivity, input).await
    }
}

struct Slow;
#[async_trait::async_trait]
impl AbstractActivityHandler for Slow {
    async fn run(&self, input: String) -> Result<String, ActivityError> {
        Ok(input)
    }
}

/// Gives its activity 300ms; nothing in these tests ever runs `Slow`.
struct ImpatientWorkflow;
#[async_trait::async_trait]
impl AbstractWorkflowHandler for ImpatientWorkflow {
    async fn run(
        &self,
        mut context: WorkflowContext,
        input: String,
    ) -> Result<String, WorkflowError> {
        context.with_activity_options(ActivityOptions {
            start_to_close_timeout: Duration::from_millis(300),
        });
        context.execute_activity(Slow, input).await
    }
}

/// Echoes the id it was started under.
struct WhoAmI;
#[async_trait::async_trait]
impl AbstractWorkflowHandler for WhoAmI {
    async fn run(&self, context: WorkflowContext, _input: String) -> Result<String, WorkflowError> {
        let info = context.info();
        Ok(format!("{} on {}", info.workflow_id, info.task_queue))
    }
}

#[tokio::test]
async fn test_workflow() {
    let mut env = TestWorkflowEnvironment::new();

    // Mock activity implementation
    env.on_activity(&GreetingActivity, "Temporal")
        .returns(Ok("Hello Temporal!".to_string()));

    env.execute_workflow(&GreetingWorkflow, "Temporal").await;

    assert!(env.is_workflow_completed());
    assert!(env.workflow_error().is_none());
    assert_eq!(env.workflow_result(), Some("Hello Temporal!"));
}

#[tokio::test]
async fn test_activity() {
    let mut env = TestActivityEnvironment::new();
    env.register_activity(GreetingActivity);

    let result = env.execute_activity(&GreetingActivity, "World").await.unwrap();
    assert_eq!(result, "Hello World!");
}

#[tokio::test]
async fn workflow_returns_activity_result_unchanged() {
    for name in ["World", "Temporal", "", "Ada Lovelace"] {
        let mut env = TestWorkflowEnvironment::new();
        env.register_activity(GreetingActivity);

        env.execute_workflow(&GreetingWorkflow, name).await;

        let expected = GreetingActivity.run(name.to_string()).await.unwrap();
        assert_eq!(env.workflow_result(), Some(expected.as_str()));
    }
}

#[tokio::test]
async fn workflow_propagates_activity_failure() {
    let mut env = TestWorkflowEnvironment::new();
    env.on_activity(&GreetingActivity, "Temporal")
        .returns(Err(ActivityError::Application("boom".to_string())));

    env.execute_workflow(&GreetingWorkflow, "Temporal").await;

    assert!(env.is_workflow_completed());
    assert!(env.workflow_result().is_none());
    match env.workflow_error() {
        Some(WorkflowError::ActivityFailed { name, message }) => {
            assert_eq!(name.as_str(), "GreetingActivity");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected workflow error: {other:?}"),
    }
}

#[tokio::test]
async fn test_using_dev_server() {
    init_test_tracing();
    let mut env = Env::new("", "hello-world");
    env.start().await.unwrap();

    let worker = env.worker().unwrap();
    worker.register_workflow(GreetingWorkflow).await;
    worker.register_activity(GreetingActivity).await;

    let client = env.client().unwrap();

    let result = run(&client, &env.task_queue).await.unwrap();
    assert_eq!(result, "Hello Temporal!");

    env.stop().await.unwrap();
}

#[tokio::test]
async fn closed_workflow_id_can_run_again() {
    init_test_tracing();
    let mut env = Env::new("", "hello-world-rerun");
    env.start().await.unwrap();

    let worker = env.worker().unwrap();
    worker.register_workflow(GreetingWorkflow).await;
    worker.register_activity(GreetingActivity).await;
    let client = env.client().unwrap();

    assert_eq!(run(&client, &env.task_queue).await.unwrap(), "Hello Temporal!");
    assert_eq!(run(&client, &env.task_queue).await.unwrap(), "Hello Temporal!");

    env.stop().await.unwrap();
}

#[tokio::test]
async fn failing_activity_fails_the_run() {
    init_test_tracing();
    let mut env = Env::new("", "refusals");
    env.start().await.unwrap();

    let worker = env.worker().unwrap();
    worker.register_workflow(RefusingWorkflow).await;
    worker.register_activity(RefusingActivity).await;
    let client = env.client().unwrap();

    let options = StartWorkflowOptions {
        id: WorkflowId::new("refusing_workflowID"),
        task_queue: env.task_queue.clone(),
    };
    let workflow_run = client
        .execute_workflow(options, &RefusingWorkflow, "Temporal")
        .await
        .unwrap();

    match workflow_run.get().await {
        Err(ClientError::WorkflowFailed(message)) => {
            assert!(message.contains("refusing Temporal"), "{message}");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    env.stop().await.unwrap();
}

#[tokio::test]
async fn runner_wraps_result_errors() {
    init_test_tracing();
    let mut env = Env::new("", "refusing-greetings");
    env.start().await.unwrap();

    // The greeting workflow runs, but its activity is answered by a worker
    // that only knows how to refuse.
    struct GreetingActivity;
    #[async_trait::async_trait]
    impl AbstractActivityHandler for GreetingActivity {
        async fn run(&self, _input: String) -> Result<String, ActivityError> {
            Err(ActivityError::Application("no greetings today".to_string()))
        }
    }

    let worker = env.worker().unwrap();
    worker.register_workflow(GreetingWorkflow).await;
    worker.register_activity(GreetingActivity).await;
    let client = env.client().unwrap();

    let err = run(&client, &env.task_queue).await.unwrap_err();
    assert!(matches!(err, RunError::Result(ClientError::WorkflowFailed(_))));
    assert!(err.to_string().starts_with("unable to get workflow result"));

    env.stop().await.unwrap();
}

#[tokio::test]
async fn open_workflow_id_is_rejected() {
    init_test_tracing();
    let mut env = Env::new("", "nobody-polls-this");
    env.start().await.unwrap();
    let client = env.client().unwrap();

    // No workflow is registered on the worker, so the first run stays open.
    let options = StartWorkflowOptions {
        id: WorkflowId::new(WORKFLOW_ID),
        task_queue: env.task_queue.clone(),
    };
    client
        .execute_workflow(options, &GreetingWorkflow, "Temporal")
        .await
        .unwrap();

    let err = run(&client, &env.task_queue).await.unwrap_err();
    match err {
        RunError::Start(ClientError::Rejected(reason)) => {
            assert!(reason.contains("already started"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    env.stop().await.unwrap();
}

#[tokio::test]
async fn unanswered_activity_times_out_the_workflow() {
    init_test_tracing();
    let mut env = Env::new("", "impatient");
    env.start().await.unwrap();

    let worker = env.worker().unwrap();
    worker.register_workflow(ImpatientWorkflow).await;
    let client = env.client().unwrap();

    let options = StartWorkflowOptions {
        id: WorkflowId::new("impatient_workflowID"),
        task_queue: env.task_queue.clone(),
    };
    let started = Instant::now();
    let workflow_run = client
        .execute_workflow(options, &ImpatientWorkflow, "Temporal")
        .await
        .unwrap();

    match workflow_run.get().await {
        Err(ClientError::WorkflowFailed(message)) => {
            assert!(message.contains("activity Slow timed out"), "{message}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));

    env.stop().await.unwrap();
}

#[tokio::test]
async fn runner_reports_activity_timeout_as_result_error() {
    init_test_tracing();
    let mut env = Env::new("", "greetings-nobody-answers");
    env.start().await.unwrap();

    // The greeting activity is never registered, so the workflow's 10s
    // start-to-close timeout fires.
    let worker = env.worker().unwrap();
    worker.register_workflow(GreetingWorkflow).await;
    let client = env.client().unwrap();

    let err = run(&client, &env.task_queue).await.unwrap_err();
    match err {
        RunError::Result(ClientError::WorkflowFailed(ref message)) => {
            assert!(message.contains("timed out"), "{message}");
        }
        ref other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().starts_with("unable to get workflow result"));

    env.stop().await.unwrap();
}

#[tokio::test]
async fn workflow_registered_while_polling_is_picked_up() {
    init_test_tracing();
    let mut env = Env::new("", "late-registration");
    env.server_options = env
        .server_options
        .clone()
        .with_poll_timeout(Duration::from_millis(200));
    env.worker_options = WorkerOptions::default()
        .with_identity("late-registration-worker")
        .with_poll_error_backoff(Duration::from_millis(20));
    env.start().await.unwrap();
    assert_ne!(env.server().unwrap().address().port(), 0);

    // The workflow poller is already waiting on the engine when WhoAmI arrives.
    let worker = env.worker().unwrap();
    worker.register_workflow(GreetingWorkflow).await;
    let client = env.client().unwrap();

    let options = StartWorkflowOptions {
        id: WorkflowId::new("who_am_i_workflowID"),
        task_queue: env.task_queue.clone(),
    };
    let workflow_run = client
        .execute_workflow(options, &WhoAmI, "")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    worker.register_workflow(WhoAmI).await;

    let result = tokio::time::timeout(Duration::from_secs(5), workflow_run.get())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, "who_am_i_workflowID on late-registration");

    env.stop().await.unwrap();
}
