pub use app_error::{AppError, AppResult};
pub use self::config::{global_config, GeneralConfig, PoolConfig, RecordsConfig, GLOBAL_CONFIG};
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod tracing_config;
