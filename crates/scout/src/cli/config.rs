use dotenvy::dotenv;
use eyre::Result;
use scout_core::utils::paths::AppPaths;
use scout_core::utils::tracing::LogOptions;

pub fn load_env() -> Result<()> {
    dotenv().ok();
    Ok(())
}

/// Logs go to a timestamped file in the user data directory unless stderr
/// was requested or no such directory exists.
pub fn log_options(debug: bool, log_stderr: bool) -> LogOptions {
    LogOptions {
        debug,
        log_dir: if log_stderr {
            None
        } else {
            AppPaths::log_dir()
        },
    }
}
