//! Configuration, environment overrides, and validation.

pub mod settings;

pub use settings::*;
