pub mod analysis;
pub mod clock;
pub mod commands;
pub mod error;
pub mod models;
pub mod store;

pub use analysis::achievements::AchievementEngine;
pub use analysis::catalog::{IssueCatalog, IssuePattern};
pub use analysis::classroom::ClassroomAggregator;
pub use analysis::progression::ProgressionEngine;
pub use analysis::scanner::IssueScanner;
pub use commands::session::{Session, SessionUpdate};
pub use error::{EcoError, Result};

use env_logger::Env;

/// Installs the global logger. `RUST_LOG` overrides the default `info` level.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    if env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialized");
    }
}
