pub mod toml_config;

use crate::domain::model::AppRef;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_APP: &str = "main:app";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LOG_FILE: &str = "app.log";

/// Launch settings. Owned by the launcher once constructed; the bind
/// address never changes after start.
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "demo-service")]
#[command(about = "Serve a named web application on a fixed host and port")]
pub struct LaunchConfig {
    /// Application reference in `<module>:<attribute>` form
    #[arg(default_value = DEFAULT_APP)]
    pub app: String,

    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// File that receives a copy of every log line
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl LaunchConfig {
    pub fn new(app: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            app: app.into(),
            host: host.into(),
            port,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            verbose: false,
        }
    }

    pub fn app_ref(&self) -> Result<AppRef> {
        AppRef::parse(&self.app)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = validation::validate_ip_addr("host", &self.host)?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_APP, DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Validate for LaunchConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("app", &self.app)?;
        validation::validate_ip_addr("host", &self.host)?;
        validation::validate_range("port", self.port, 1, u16::MAX)?;
        validation::validate_path("log_file", &self.log_file.to_string_lossy())?;
        Ok(())
    }
}
