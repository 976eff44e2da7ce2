pub mod activity;
pub mod client;
pub mod error;
/// Handler registries follow the type-driven registry pattern:
/// see: https://willcrichton.net/rust-api-type-patterns/registries.html
/// Handlers are named after their type and shared with pollers through an Arc.
pub mod worker;
pub mod worker_events;
pub mod workflow;

pub use activity::{AbstractActivityHandler, ActivityName, ActivityRunId};
pub use client::{Client, ClientOptions, StartWorkflowOptions, WorkflowRun};
pub use error::{ActivityError, ClientError, WorkflowError};
pub use worker::{interrupt_signal, Worker, WorkerOptions};
pub use workflow::{
    AbstractWorkflowHandler, ActivityOptions, WorkflowContext, WorkflowId, WorkflowInfo,
    WorkflowName, WorkflowRunId,
};
