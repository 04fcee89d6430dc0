pub mod config;
pub mod fd_limit;
pub mod logger;
pub(crate) mod settings_toml;
pub mod tempfiles;

pub use config::*;
pub use fd_limit::{FDS_PER_WORKER, max_open_fds, max_workers_by_fd_limit};
pub use logger::setup_logging;
pub use tempfiles::{copy_to_temp_content_file, create_temp_content_file, remove_content_file};
