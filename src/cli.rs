//! Command line arguments

use crate::config::ConfigOverrides;
use clap::Parser;
use std::path::PathBuf;

/// Serve a directory over HTTP/1.1
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Port to listen on [default: 8000]
    #[arg(env = "FILESERVER_PORT")]
    pub port: Option<u16>,

    /// Directory to serve [default: current directory]
    #[arg(short, long, env = "FILESERVER_ROOT")]
    pub directory: Option<PathBuf>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<String>,
}

impl CliArgs {
    /// Arguments given on the command line override every other source
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            host: self.bind.clone(),
            port: self.port,
            root: self.directory.clone(),
        }
    }
}
