pub mod toml_config;

use clap::Parser;
use serde::{Deserialize, Serialize};

pub use toml_config::TomlConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "fo-scanner")]
#[command(about = "F&O stock scanner: ranks liquid F&O names from screener scans")]
pub struct CliArgs {
    #[arg(long, short = 'c', default_value = "scanner-config.toml")]
    pub config: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Validate the configuration and exit")]
    pub check: bool,
}
