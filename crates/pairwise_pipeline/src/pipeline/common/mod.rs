//! Utilities shared by the pipeline stages.

pub mod thread;
