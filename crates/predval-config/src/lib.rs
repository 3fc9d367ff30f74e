//! Process-environment configuration loader for the prediction-validation worker pool, per
//! SPEC_FULL.md §4.12.

pub mod settings;

pub use settings::{Settings, load};
