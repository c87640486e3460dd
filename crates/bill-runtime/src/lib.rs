//! Runtime layer for the electricity bill tracker.
//!
//! Talks to the OCR service with retry and back-off, and keeps projected
//! bill views current by re-deriving them from the store subscription.

pub mod ocr;
pub mod orchestrator;
pub mod retry;

pub use bill_core as core;
pub use bill_data as data;
