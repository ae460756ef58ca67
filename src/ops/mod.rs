//! High-level operations.
//!
//! This module contains the implementation of kiln commands.

pub mod check;
pub mod configure;
pub mod generate;
pub mod refresh;

pub use check::check;
pub use configure::{configure, ConfigureOptions};
pub use generate::{generate, GenerateOptions, GenerateReport};
pub use refresh::{load_environment, refresh};
