use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Install the binary's logger. Library code only emits through `log` and never calls this.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let installed = Builder::from_default_env()
        .filter_level(LevelFilter::Warn) // Default: only warnings from dependencies
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        _ => "ERROR".red(),
                    };
                    let target = record.target().to_string().white();
                    format!("[{} {} {}] {}", name.cyan(), level_str, target, record.args())
                }
                Level::Debug | Level::Trace => {
                    // Decode thread and pool workers are named; tag their lines.
                    let current = std::thread::current();
                    let thread = current.name().unwrap_or("main");
                    format!(
                        "[{} {} {}] {}",
                        name.cyan(),
                        "debug".dimmed(),
                        thread.dimmed(),
                        record.args()
                    )
                }
                _ => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
    if let Err(e) = installed {
        log::warn!("keeping the existing logger: {}", e);
    }
}
