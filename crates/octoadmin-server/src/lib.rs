pub mod app;
pub mod config;
pub mod observability;

pub use app::AdminCore;
pub use config::AppConfig;
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
