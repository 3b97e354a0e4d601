use crate::core::assembly::ImagePlan;
use crate::core::installer::CommandInstaller;
use crate::domain::model::LaunchSpec;
use crate::utils::error::{Result, ServiceError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Image assembly settings, read from `assembly.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    pub image: ImageConfig,
    pub sources: SourcesConfig,
    pub install: InstallConfig,
    pub cache: Option<CacheConfig>,
    pub output: OutputConfig,
    pub launch: LaunchSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub base: String,
    pub workdir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Build context; the other paths are relative to it.
    pub context: Option<String>,
    pub manifest: String,
    pub app_module: String,
    pub log_artifact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    pub program: String,
    pub args: Vec<String>,
    pub target: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: Option<bool>,
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSection {
    pub app: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl AssemblyConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ServiceError::config(format!(
                "cannot read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ServiceError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unset variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    fn context_dir(&self) -> PathBuf {
        PathBuf::from(self.sources.context.as_deref().unwrap_or("."))
    }

    pub fn workdir(&self) -> &str {
        self.image.workdir.as_deref().unwrap_or("/app")
    }

    pub fn deps_target(&self) -> &str {
        self.install.target.as_deref().unwrap_or("/opt/deps")
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.dir)
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache
            .as_ref()
            .filter(|c| c.enabled.unwrap_or(true))
            .map(|c| PathBuf::from(&c.dir))
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            app: self
                .launch
                .app
                .clone()
                .unwrap_or_else(|| crate::config::DEFAULT_APP.to_string()),
            host: self
                .launch
                .host
                .clone()
                .unwrap_or_else(|| crate::config::DEFAULT_HOST.to_string()),
            port: self.launch.port.unwrap_or(crate::config::DEFAULT_PORT),
        }
    }

    pub fn image_plan(&self) -> ImagePlan {
        let context = self.context_dir();
        ImagePlan::standard(
            self.image.base.clone(),
            self.workdir(),
            self.deps_target(),
            context.join(&self.sources.manifest),
            context.join(&self.sources.app_module),
            context.join(&self.sources.log_artifact),
            self.launch_spec(),
        )
    }

    pub fn installer(&self) -> CommandInstaller {
        let mut installer = CommandInstaller::new(self.install.program.clone(), self.install.args.clone())
            .with_env(self.install.env.clone().unwrap_or_default());
        if let Some(seconds) = self.install.timeout_seconds {
            installer = installer.with_timeout(Duration::from_secs(seconds));
        }
        installer
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_pinned_image("image.base", &self.image.base)?;
        validation::validate_absolute_path("image.workdir", self.workdir())?;
        validation::validate_absolute_path("install.target", self.deps_target())?;
        validation::validate_path("sources.manifest", &self.sources.manifest)?;
        validation::validate_path("sources.app_module", &self.sources.app_module)?;
        validation::validate_path("sources.log_artifact", &self.sources.log_artifact)?;
        validation::validate_non_empty_string("install.program", &self.install.program)?;
        validation::validate_path("output.dir", &self.output.dir)?;

        if let Some(cache) = &self.cache {
            validation::validate_path("cache.dir", &cache.dir)?;
        }

        let launch = self.launch_spec();
        validation::validate_non_empty_string("launch.app", &launch.app)?;
        validation::validate_ip_addr("launch.host", &launch.host)?;
        validation::validate_range("launch.port", launch.port, 1, u16::MAX)?;

        if !self.install.args.iter().any(|a| a.contains("{manifest}")) {
            return Err(ServiceError::InvalidConfigValueError {
                field: "install.args".to_string(),
                value: self.install.args.join(" "),
                reason: "Installer arguments must reference {manifest}".to_string(),
            });
        }

        Ok(())
    }
}

impl Validate for AssemblyConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
