//! # Route Handlers
//!
//! This module re-exports the Axum handlers for the `sqlask-server`.

pub mod general;

pub use self::general::*;

pub use crate::{errors::AppError, state::AppState};
