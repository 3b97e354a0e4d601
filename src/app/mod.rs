pub mod demo;
pub mod error;
pub mod metrics;
pub mod middleware;

use crate::core::registry::AppRegistry;
use crate::domain::ports::Application;
use std::sync::Arc;

pub use demo::{DemoApp, DemoSettings};

/// Applications this binary can serve, addressed as `module:attribute`.
pub fn default_registry() -> AppRegistry {
    AppRegistry::new().register("main", "app", || {
        Ok(Arc::new(DemoApp::default()) as Arc<dyn Application>)
    })
}
