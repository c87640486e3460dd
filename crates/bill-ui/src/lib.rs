//! Terminal UI layer for the electricity bill tracker.
//!
//! Provides themes, the bill table, the latest-bill comparison panel and the
//! application event loop built on [`ratatui`].

pub mod app;
pub mod comparison_view;
pub mod table_view;
pub mod themes;

pub use bill_core as core;
