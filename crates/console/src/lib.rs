//! Terminal front end for the import tracker.
//!
//! The binary wires [`hb_importer::ImportTracker`] to a terminal
//! presenter, the push channel and the REST API, configured from the
//! environment.

pub mod cli;
pub mod config;
pub mod presenter;
pub mod view;
