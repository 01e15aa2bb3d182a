//! Domain logic for the demo2apk build service.
//!
//! Everything in this crate is independent of the HTTP layer and the queue
//! backend so it can be used by the API, the worker, and any future CLI
//! tooling. Modules that orchestrate external processes (`subprocess`) do so
//! through a command value object; no module here talks to the job store.

pub mod android;
pub mod config;
pub mod error;
pub mod html;
pub mod icon;
pub mod ids;
pub mod naming;
pub mod progress;
pub mod project;
pub mod repair;
pub mod subprocess;
pub mod types;

pub use error::{CoreError, CoreResult};
