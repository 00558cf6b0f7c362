//! Bootstrap layer: runs before any agent starts.
//!
//! - **logger**: tracing-subscriber initialisation.

pub mod logger;
