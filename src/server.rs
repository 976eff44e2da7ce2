use std::env;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::core::activity::ActivityEventType;
use crate::core::client::{Client, ClientOptions, DEFAULT_HOST_PORT};
use crate::core::error::ClientError;
use crate::core::worker_events::{
    Outcome, PollActivityCompletion, PollActivityResponse, PollWorkflowCompletion,
    PollWorkflowResponse, ServerEvent, WorkerEvent,
};
use crate::core::workflow::WorkflowEventType;
use crate::inmemory_db::{Db, DbError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server failed: {0}")]
    Serve(#[from] io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("server task ended abnormally: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct DevServerOptions {
    /// Address to listen on; empty picks a free local port.
    pub host_port: String,
    /// How long a poll is held open before answering `NoTask`.
    pub poll_timeout: Duration,
    /// How often a held poll re-checks the store.
    pub poll_interval: Duration,
}

impl Default for DevServerOptions {
    fn default() -> Self {
        Self {
            host_port: String::new(),
            poll_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl DevServerOptions {
    /// Load options from the environment.
    ///
    /// - `HELLOWORLD_DEVSERVER_ADDR` - listen address (default: "127.0.0.1:7233")
    /// - `HELLOWORLD_POLL_TIMEOUT_MS` - long-poll timeout (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host_port = env::var("HELLOWORLD_DEVSERVER_ADDR")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST_PORT.to_string());

        let poll_timeout = env::var("HELLOWORLD_POLL_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_timeout);

        Self {
            host_port,
            poll_timeout,
            ..defaults
        }
    }

    pub fn with_host_port(mut self, host_port: impl Into<String>) -> Self {
        self.host_port = host_port.into();
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn bind_addr(&self) -> &str {
        if self.host_port.is_empty() {
            "127.0.0.1:0"
        } else {
            &self.host_port
        }
    }
}

pub struct Server {
    state: ServerState,
    options: DevServerOptions,
}

#[derive(Clone)]
pub struct ServerState {
    db: Db,
    poll_timeout: Duration,
    poll_interval: Duration,
}

impl ServerState {
    /// Re-run `check` until it yields a value or the poll timeout passes.
    async fn long_poll<T, F, Fut>(&self, mut check: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            if let Some(found) = check().await {
                return Some(found);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn rejected(err: DbError) -> (StatusCode, Json<ServerEvent>) {
    let status = match err {
        DbError::AlreadyStarted(_) => StatusCode::CONFLICT,
        DbError::UnknownWorkflowRun(_) | DbError::UnknownActivityRun(_) => StatusCode::NOT_FOUND,
    };
    (
        status,
        Json(ServerEvent::Rejected {
            reason: err.to_string(),
        }),
    )
}

fn ok(event: ServerEvent) -> (StatusCode, Json<ServerEvent>) {
    (StatusCode::OK, Json(event))
}

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_worker_event(
    State(state): State<ServerState>,
    Json(event): Json<WorkerEvent>,
) -> (StatusCode, Json<ServerEvent>) {
    let db = &state.db;
    match event {
        WorkerEvent::StartWorkflow {
            workflow_id,
            task_queue,
            name,
            input,
        } => match db
            .start_workflow(workflow_id.clone(), name, task_queue, input)
            .await
        {
            Ok(workflow_run_id) => {
                info!(workflow_id = %workflow_id, run_id = %workflow_run_id, "Started workflow");
                ok(ServerEvent::WorkflowStarted {
                    workflow_id,
                    workflow_run_id,
                })
            }
            Err(err) => rejected(err),
        },
        WorkerEvent::PollWorkflow {
            task_queue,
            names,
            identity,
        } => {
            debug!(task_queue = %task_queue, identity = %identity, "Workflow poll");
            let (task_queue, names) = (task_queue.as_str(), names.as_slice());
            let task = state
                .long_poll(move || db.take_pending_workflow(task_queue, names))
                .await;

            match task {
                Some(execution) => ok(ServerEvent::PollWorkflowResponse(PollWorkflowResponse {
                    workflow_id: execution.workflow_id,
                    workflow_run_id: execution.run_id,
                    name: execution.name,
                    task_queue: execution.task_queue,
                    input: execution.input,
                })),
                None => ok(ServerEvent::NoTask),
            }
        }
        WorkerEvent::CompleteWorkflow {
            workflow_run_id,
            outcome,
        } => {
            info!(run_id = %workflow_run_id, "Completed workflow");
            match db.complete_workflow(workflow_run_id, outcome).await {
                Ok(()) => ok(ServerEvent::GeneralSuccess { success: true }),
                Err(err) => rejected(err),
            }
        }
        WorkerEvent::PollWorkflowCompletion { workflow_run_id } => {
            if !db.workflow_run_exists(workflow_run_id).await {
                return rejected(DbError::UnknownWorkflowRun(workflow_run_id));
            }
            let completed = state
                .long_poll(move || db.get_completed_workflow(workflow_run_id))
                .await;

            match completed {
                Some(event) => {
                    let outcome = match event.event_type {
                        WorkflowEventType::Failed => Outcome::Failed(event.payload),
                        _ => Outcome::Completed(event.payload),
                    };
                    ok(ServerEvent::PollWorkflowCompletion(PollWorkflowCompletion {
                        workflow_run_id,
                        outcome,
                    }))
                }
                None => ok(ServerEvent::NoTask),
            }
        }
        WorkerEvent::ScheduleActivity {
            workflow_run_id,
            task_queue,
            name,
            input,
        } => match db
            .schedule_activity(workflow_run_id, name, task_queue, input)
            .await
        {
            Ok(activity_run_id) => ok(ServerEvent::ActivityScheduled { activity_run_id }),
            Err(err) => rejected(err),
        },
        WorkerEvent::PollActivity {
            task_queue,
            names,
            identity,
        } => {
            debug!(task_queue = %task_queue, identity = %identity, "Activity poll");
            let (task_queue, names) = (task_queue.as_str(), names.as_slice());
            let task = state
                .long_poll(move || db.take_pending_activity(task_queue, names))
                .await;

            match task {
                Some(execution) => ok(ServerEvent::PollActivityResponse(PollActivityResponse {
                    activity_run_id: execution.activity_run_id,
                    workflow_run_id: execution.workflow_run_id,
                    name: execution.name,
                    input: execution.input,
                })),
                None => ok(ServerEvent::NoTask),
            }
        }
        WorkerEvent::CompleteActivity {
            activity_run_id,
            outcome,
        } => match db.complete_activity(activity_run_id, outcome).await {
            Ok(()) => ok(ServerEvent::GeneralSuccess { success: true }),
            Err(err) => rejected(err),
        },
        WorkerEvent::PollActivityCompletion { activity_run_id } => {
            if !db.activity_run_exists(activity_run_id).await {
                return rejected(DbError::UnknownActivityRun(activity_run_id));
            }
            let completed = state
                .long_poll(move || db.get_completed_activity(activity_run_id))
                .await;

            match completed {
                Some(event) => {
                    let outcome = match event.event_type {
                        ActivityEventType::Failed => Outcome::Failed(event.payload),
                        _ => Outcome::Completed(event.payload),
                    };
                    ok(ServerEvent::PollActivityCompletion(PollActivityCompletion {
                        activity_run_id,
                        outcome,
                    }))
                }
                None => ok(ServerEvent::NoTask),
            }
        }
    }
}

impl Server {
    pub fn new() -> Self {
        Self::with_options(DevServerOptions::default())
    }

    pub fn with_options(options: DevServerOptions) -> Self {
        Self {
            state: ServerState {
                db: Db::new(),
                poll_timeout: options.poll_timeout,
                poll_interval: options.poll_interval,
            },
            options,
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/health", axum::routing::get(handle_health))
            .route("/worker_event", axum::routing::post(handle_worker_event))
            .with_state(self.state.clone())
    }

    async fn bind(&self) -> Result<tokio::net::TcpListener, ServerError> {
        let addr = self.options.bind_addr();
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        let address = listener.local_addr()?;
        info!(address = %address, "Starting engine");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    /// Bind, serve on a background task and return a handle with a
    /// connected client.
    pub async fn start(self) -> Result<DevServer, ServerError> {
        let listener = self.bind().await?;
        let address = listener.local_addr()?;
        let router = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::task::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        info!(address = %address, "Started dev server");

        let options = ClientOptions::default().with_host_port(address.to_string());
        let client = match Client::dial(options).await {
            Ok(client) => client,
            Err(e) => {
                handle.abort();
                return Err(e.into());
            }
        };

        Ok(DevServer {
            address,
            client,
            db: self.state.db,
            shutdown: Some(shutdown_tx),
            handle,
        })
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// A running local engine.
pub struct DevServer {
    address: SocketAddr,
    client: Client,
    db: Db,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<io::Result<()>>,
}

impl DevServer {
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Client connected to this server.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Stop accepting requests and wait for the serve task to finish.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.await??;
        info!(address = %self.address, "Stopped dev server");
        Ok(())
    }
}
