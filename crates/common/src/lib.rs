//! Common utilities and types shared across podscout crates.

pub mod error;
pub mod naming;

pub use error::{Error, Result};
