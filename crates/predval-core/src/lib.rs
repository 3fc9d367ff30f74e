#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Scheduling-and-validation engine for the prediction-validation worker pool: the concurrent
//! claim loop, at-most-once job leasing, the multi-stage validation pipeline, cost/telemetry
//! aggregation, and the Supervisor lifecycle.

pub mod api;
pub mod chat;
pub mod cost;
pub mod db;
pub mod enhancer;
pub mod error;
pub mod goal_text;
pub mod judge;
pub mod keywords;
pub mod model;
pub mod outcome;
pub mod pipeline;
pub mod prefilter;
pub mod search;
pub mod settings;
pub mod worker;

pub use api::{
    StatusSnapshot, SupervisorConfig, SupervisorEvent, SupervisorHandle, WorkerSnapshot,
    start_supervisor,
};
pub use error::{Error, Result};
