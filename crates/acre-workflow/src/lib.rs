//! The farm's lifecycle and request workflow.
//!
//! Builds on any [`acre_core::store::FarmStore`] backend:
//!
//! - [`WikiEditor`] — load one wiki, mutate it through typed setters, commit
//!   the accumulated diff atomically with event publication and cache rebuild;
//! - [`RequestWorkflow`] — the state machine from submission through triage to
//!   approval or decline;
//! - [`JobRunner`] — drains the job outbox, performing provisioning and
//!   container-access work;
//! - [`WikiCache`] — per-wiki derived snapshots for the hot
//!   "is this wiki private/closed?" check.

pub mod cache;
pub mod editor;
pub mod error;
pub mod notify;
pub mod provision;
pub mod workflow;

pub use cache::{WikiCache, WikiSnapshot};
pub use editor::WikiEditor;
pub use error::{Error, Result};
pub use provision::JobRunner;
pub use workflow::RequestWorkflow;
