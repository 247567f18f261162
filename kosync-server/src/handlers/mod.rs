//! HTTP request handlers
//!
//! This module contains all the request handlers for the sync protocol.

pub mod health;
pub mod progress;
pub mod users;

pub use crate::state::AppState;
pub use health::healthcheck;
pub use progress::{get_progress, update_progress};
pub use users::authorize;
