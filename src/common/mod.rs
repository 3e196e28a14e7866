pub mod config;
pub mod dev_mode;
pub mod error;
pub mod paths;

pub use config::Config;
pub use dev_mode::DevMode;
pub use error::{DoorError, Result};
pub use paths::{resolve_config_file, resolve_data_dir, resolve_store_file, system_config_file};
