//! # Mosaic Worker Library
//!
//! Wiring for the mosaic render worker process: building the worker pool
//! around the render pipeline, feeding it jobs and shutting it down.

pub mod app;
pub mod intake;
pub mod startup;
