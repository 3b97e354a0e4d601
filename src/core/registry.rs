use crate::domain::model::AppRef;
use crate::domain::ports::{AppResolver, Application};
use crate::utils::error::{Result, ServiceError};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

impl AppRef {
    pub fn parse(reference: &str) -> Result<Self> {
        match reference.split_once(':') {
            Some((module, attribute))
                if !module.trim().is_empty() && !attribute.trim().is_empty() =>
            {
                Ok(Self {
                    module: module.trim().to_string(),
                    attribute: attribute.trim().to_string(),
                })
            }
            _ => Err(ServiceError::resolution(
                reference,
                "import string must be in format \"<module>:<attribute>\"",
            )),
        }
    }
}

impl FromStr for AppRef {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

type AppLoader = Arc<dyn Fn() -> Result<Arc<dyn Application>> + Send + Sync>;

/// In-process application table: module -> attribute -> loader. Loaders run
/// on resolution, so a failing loader surfaces as a resolution error.
#[derive(Clone, Default)]
pub struct AppRegistry {
    modules: HashMap<String, HashMap<String, AppLoader>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a module with no attributes registered yet.
    pub fn module(mut self, module: &str) -> Self {
        self.modules.entry(module.to_string()).or_default();
        self
    }

    pub fn register<F>(mut self, module: &str, attribute: &str, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Application>> + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(attribute.to_string(), Arc::new(loader));
        self
    }

    pub fn contains(&self, app_ref: &AppRef) -> bool {
        self.modules
            .get(&app_ref.module)
            .is_some_and(|attrs| attrs.contains_key(&app_ref.attribute))
    }
}

impl AppResolver for AppRegistry {
    fn resolve(&self, app_ref: &AppRef) -> Result<Arc<dyn Application>> {
        let attributes = self.modules.get(&app_ref.module).ok_or_else(|| {
            ServiceError::resolution(
                app_ref.to_string(),
                format!("could not import module \"{}\"", app_ref.module),
            )
        })?;

        let loader = attributes.get(&app_ref.attribute).ok_or_else(|| {
            ServiceError::resolution(
                app_ref.to_string(),
                format!(
                    "attribute \"{}\" not found in module \"{}\"",
                    app_ref.attribute, app_ref.module
                ),
            )
        })?;

        loader().map_err(|e| match e {
            ServiceError::ResolutionError { .. } => e,
            other => ServiceError::resolution(app_ref.to_string(), other.to_string()),
        })
    }
}
