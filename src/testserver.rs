//! Self-contained test environment: a local engine plus an in-process worker.
//!
//! Usage:
//!   - [`Env::new`] to create the environment
//!   - [`Env::start`] to start the engine and the worker
//!   - register handlers on [`Env::worker`] and run workflows with [`Env::client`]
//!     as one would against a deployed engine
//!   - [`Env::stop`] to stop the worker and the engine

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use crate::core::{interrupt_signal, Client, Worker, WorkerOptions};
use crate::server::{DevServer, DevServerOptions, Server, ServerError};

#[derive(Debug, Error)]
pub enum EnvError {
    /// An accessor was called before the matching start step ran.
    #[error("{0} not started")]
    NotStarted(&'static str),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("worker task exited before handing over the worker")]
    WorkerStartup,

    #[error("worker task ended abnormally: {0}")]
    WorkerJoin(#[from] JoinError),
}

pub struct Env {
    pub server_options: DevServerOptions,
    pub worker_options: WorkerOptions,
    pub task_queue: String,

    server: Option<DevServer>,
    worker: Option<Worker>,
    worker_task: Option<JoinHandle<()>>,
    interrupt: Option<oneshot::Sender<()>>,
}

impl Env {
    /// - `host_port`: "host:port" to listen on; "" picks a free local port
    /// - `task_queue`: task queue the worker polls
    pub fn new(host_port: &str, task_queue: &str) -> Self {
        Self {
            server_options: DevServerOptions::default().with_host_port(host_port),
            worker_options: WorkerOptions::default(),
            task_queue: task_queue.to_string(),
            server: None,
            worker: None,
            worker_task: None,
            interrupt: None,
        }
    }

    async fn start_server(&mut self) -> Result<(), EnvError> {
        let server = Server::with_options(self.server_options.clone())
            .start()
            .await?;
        self.server = Some(server);
        Ok(())
    }

    async fn start_worker(&mut self) -> Result<(), EnvError> {
        let client = self.client()?;
        let task_queue = self.task_queue.clone();
        let options = self.worker_options.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();

        let worker_task = tokio::task::spawn(async move {
            let worker = Worker::new(client, task_queue, options);
            if ready_tx.send(worker.clone()).is_err() {
                return;
            }

            worker
                .run(async {
                    tokio::select! {
                        _ = interrupt_rx => {}
                        _ = interrupt_signal() => {}
                    }
                })
                .await;
        });

        let worker = ready_rx.await.map_err(|_| EnvError::WorkerStartup)?;
        self.worker = Some(worker);
        self.worker_task = Some(worker_task);
        self.interrupt = Some(interrupt_tx);
        Ok(())
    }

    /// Start the engine, then the worker. Returns once the worker exists;
    /// its polling loop keeps running in the background.
    pub async fn start(&mut self) -> Result<(), EnvError> {
        if self.server.is_none() {
            self.start_server().await?;
        }
        if self.worker.is_none() {
            self.start_worker().await?;
        }
        Ok(())
    }

    /// Client connected to the local engine.
    pub fn client(&self) -> Result<Client, EnvError> {
        self.server
            .as_ref()
            .map(DevServer::client)
            .ok_or(EnvError::NotStarted("server"))
    }

    /// The in-process worker polling [`Env::task_queue`].
    pub fn worker(&self) -> Result<Worker, EnvError> {
        self.worker.clone().ok_or(EnvError::NotStarted("worker"))
    }

    pub fn server(&self) -> Option<&DevServer> {
        self.server.as_ref()
    }

    /// Stop the worker, then the engine if one was started.
    pub async fn stop(&mut self) -> Result<(), EnvError> {
        if let Some(interrupt) = self.interrupt.take() {
            let _ = interrupt.send(());
        }
        if let Some(worker_task) = self.worker_task.take() {
            worker_task.await?;
        }
        self.worker = None;

        if let Some(server) = self.server.take() {
            server.stop().await?;
        }
        debug!(task_queue = %self.task_queue, "Test environment stopped");
        Ok(())
    }
}
