// Core infrastructure modules
pub mod config;
pub mod core;

// Tabular transfer modules
pub mod bulk;
pub mod codec;
pub mod tabular;

// Interactive front end
pub mod repl;

#[cfg(test)]
pub mod test_utils;

pub use crate::core::db::Session;
pub use crate::core::{AdminError, Result};
