//! Utility modules shared across the crate

pub mod error;

pub use error::{GatewayError, Result};
