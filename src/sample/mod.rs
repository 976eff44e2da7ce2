//! The hello-world sample: one workflow calling one activity.
//!
//! [`run`] starts [`GreetingWorkflow`] through a [`Client`](crate::core::Client)
//! and waits for its result. The `worker` binary (or the test harness in
//! [`crate::testserver`]) must be polling the same task queue.

mod activity;
mod run;
mod workflow;

pub use activity::GreetingActivity;
pub use run::{run, RunError, WORKFLOW_ID, WORKFLOW_INPUT};
pub use workflow::GreetingWorkflow;

/// Task queue used by the `starter` and `worker` binaries.
pub const TASK_QUEUE: &str = "hello-world";
