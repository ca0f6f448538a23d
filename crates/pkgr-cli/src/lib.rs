pub mod cli;
pub mod commands;
pub mod tracing_setup;
