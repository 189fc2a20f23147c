// Application state module
// Read-only per-process state shared by every connection

use super::types::Config;

/// Application state
///
/// Built once in `main` and handed to the server loop behind an `Arc`.
/// Nothing in it changes after startup.
pub struct AppState {
    pub config: Config,
}

impl AppState {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    pub const fn access_log(&self) -> bool {
        self.config.logging.access_log
    }
}
