//! # Mosaic Core
//!
//! Shared error type, result aliases and tracing initialisation used by
//! every crate of the mosaic render job system.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};
