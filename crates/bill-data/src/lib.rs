//! Data layer for the electricity bill tracker.
//!
//! Projects stored bills into view-mode lists, persists them behind the
//! [`store::BillStore`] trait with live subscriptions, exports CSV and keeps
//! the operation history log.

pub mod aggregator;
pub mod export;
pub mod history;
pub mod store;

pub use bill_core as core;
