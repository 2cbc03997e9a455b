//! Refresh scheduling.
//!
//! - [`RefreshSchedule`] turns the configured weekdays and time into a cron schedule
//! - [`RefreshScheduler`] runs the pipeline at start, on schedule and on demand
//! - [`RefreshEvent`] reports each refresh to subscribers

mod events;
mod schedule;
mod service;

pub use events::{RefreshEvent, RefreshEventBroadcaster};
pub use schedule::RefreshSchedule;
pub use service::RefreshScheduler;
