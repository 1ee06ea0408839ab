pub mod cli;
pub mod load_config;
pub mod schedule;

pub use cli::{run, Cli, Commands};
