pub mod assembly;
pub mod installer;
pub mod launch;
pub mod layer_cache;
pub mod manifest;
pub mod registry;
pub mod staging;

pub use crate::domain::model::{AppRef, BuildStep, Dependency, DependencyManifest, ImageManifest};
pub use crate::domain::ports::{AppResolver, Application, DependencyInstaller, InstallRequest};
pub use crate::utils::error::Result;
