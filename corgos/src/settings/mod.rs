//! Persistent key/value settings.
//!
//! - [`Settings`] is a lock-guarded JSON mapping with write-through persistence
//! - [`SettingsRegistry`] hands out exactly one [`Settings`] per backing path
//! - [`config`] holds the key names and typed views read by the services

pub mod config;
mod registry;
mod store;

pub use config::{AcquisitionConfig, LimiterConfig, RedditCredentials, ScheduleConfig};
pub use registry::SettingsRegistry;
pub use store::{Settings, SettingsMap};
