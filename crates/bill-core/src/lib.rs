//! Core types for the electricity bill tracker.
//!
//! Holds the bill record model, billing-period normalization, contract view
//! modes, cost comparison, display formatting and the CLI settings shared by
//! every other crate in the workspace.

pub mod calculations;
pub mod contracts;
pub mod error;
pub mod formatting;
pub mod models;
pub mod period;
pub mod settings;
pub mod time_utils;

pub use error::{BillError, Result};
