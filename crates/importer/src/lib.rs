//! Import job tracking and live-update client.
//!
//! Talks to the record service's import REST endpoints, listens to its
//! STOMP push channel, and keeps one consistent view of every in-flight
//! import job by reconciling poll responses with push notifications.
//!
//! The entry point is [`tracker::ImportTracker`]; the push side is
//! started with [`channel::PushChannel::spawn`] and feeds the tracker
//! through an `mpsc` channel of [`messages::UpdateEvent`]s.

pub mod api;
pub mod backoff;
pub mod channel;
pub mod client;
pub mod events;
pub mod messages;
pub mod poller;
pub mod presenter;
pub mod processor;
pub mod reconciler;
pub mod reconnect;
pub mod registry;
pub mod stomp;
pub mod tracker;

pub use api::{ImportApi, ImportApiError, ImportBackend};
pub use events::TrackerEvent;
pub use presenter::{ProgressPresenter, RecordView};
pub use tracker::{ImportTracker, TrackerConfig, TrackerError};
