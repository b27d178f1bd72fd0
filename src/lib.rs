//! Signflow server library
//!
//! Background task scheduling plus a multi-party e-signature workflow.
//! The modules are exposed for the binary, integration tests and reuse.

pub mod alerts;
pub mod background_jobs;
pub mod config;
pub mod notifications;
pub mod pipeline;
pub mod provider_error;
pub mod runtime;
pub mod server;
pub mod signing;
pub mod sqlite_persistence;
pub mod task_store;
pub mod webhooks;
pub mod workflow_store;

pub use runtime::{Providers, ServiceRuntime};
pub use server::{make_app, run_server, RequestsLoggingLevel};
