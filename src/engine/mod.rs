//! CLI engine: argument parsing, command handlers and progress output

pub mod arg_parser;
pub mod handlers;
pub mod progress;

pub use arg_parser::{Cli, Commands};
pub use handlers::handle_run;
