//! Core types for the guard
//!
//! This module provides the fundamental types used throughout the crate:
//! - `GuardError` - Error types
//! - `race_cancellation` - The outer/inner/deadline race used by every blocking call

pub mod cancel;
pub mod error;

pub use cancel::race_cancellation;
pub use error::{GuardError, GuardResult};
