pub mod config;
pub mod ls;

use std::path::PathBuf;

use crate::output::OutputFormat;

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: PathBuf,
}
