//! corgos library crate.
//!
//! The content core of a picture bot: it harvests image posts from a set of
//! subreddits, validates them concurrently and serves the accepted URLs from
//! a rotating queue that is swapped atomically on every refresh.

pub mod acquisition;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod queue;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod utils;

pub use error::{Error, Result};
