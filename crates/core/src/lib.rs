//! Domain types shared by the import console crates.
//!
//! - [`types`]: identifiers and timestamps.
//! - [`import`]: job status payloads and the terminal-status rules.
//! - [`history`]: rows returned by the import history endpoint.
//! - [`selection`]: client-side upload file selection and validation.
//! - [`session`]: explicit user identity passed to operations.
//! - [`view_state`]: persisted record table state (page, sort, filter).

pub mod error;
pub mod history;
pub mod import;
pub mod selection;
pub mod session;
pub mod types;
pub mod view_state;

mod serde_util;
