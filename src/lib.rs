pub mod core;
pub mod sample;
pub mod inmemory_db;
pub mod server;
pub mod testserver;
pub mod testsuite;
pub mod tracing_setup;
