//! Configuration helpers shared by devfeedback binaries.
//!
//! - Environment variable parsing with type safety
//! - Source tracking for debugging overrides
//! - Collector endpoint resolution

pub mod endpoints;
pub mod env;
pub mod source;

pub use endpoints::EndpointTable;
pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};
