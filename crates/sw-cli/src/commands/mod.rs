//! CLI subcommands.

pub mod catalog;
pub mod filter;
pub mod tune;
pub mod validate;

pub use filter::FilterArgs;
pub use tune::TuneArgs;
