//! CLI subcommand implementations.

pub mod argv;
pub mod host;
pub mod input;
pub mod instances;
pub mod join;
pub mod supervise;
pub mod token;
