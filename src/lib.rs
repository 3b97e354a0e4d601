pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod traffic;
pub mod utils;

pub use app::{default_registry, DemoApp, DemoSettings};
pub use config::{toml_config::AssemblyConfig, LaunchConfig};
pub use core::{
    assembly::{Assembler, AssemblyReport, ImagePlan},
    installer::CommandInstaller,
    launch::{BoundServer, Launcher},
    layer_cache::LayerCache,
    registry::AppRegistry,
};
pub use traffic::{TrafficConfig, TrafficGenerator, TrafficReport};
pub use utils::error::{Result, ServiceError};
