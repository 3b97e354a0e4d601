use crate::domain::model::{AppRef, Dependency};
use crate::utils::error::Result;
use async_trait::async_trait;
use axum::Router;
use std::path::Path;
use std::sync::Arc;

/// A web application the launcher can serve. The router receives every
/// request accepted on the bound socket.
pub trait Application: Send + Sync {
    fn router(&self) -> Router;
}

/// Maps a `module:attribute` reference to a loaded application.
pub trait AppResolver: Send + Sync {
    fn resolve(&self, app_ref: &AppRef) -> Result<Arc<dyn Application>>;
}

pub struct InstallRequest<'a> {
    /// The manifest as staged inside the image, not the build-context copy.
    pub manifest_path: &'a Path,
    pub dependencies: &'a [Dependency],
    /// Empty directory the installer must populate.
    pub target: &'a Path,
    /// Scratch directory for anything that must not end up in the image.
    pub scratch: &'a Path,
}

#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Identifies the install command; part of the install layer's cache key.
    fn fingerprint(&self) -> String;

    /// Installs every declared dependency into `request.target` and returns
    /// the names it installed.
    async fn install(&self, request: &InstallRequest<'_>) -> Result<Vec<String>>;
}
