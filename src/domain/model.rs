use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One `name<constraint>` entry of a dependency manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub constraint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManifest {
    pub dependencies: Vec<Dependency>,
}

/// `module:attribute` reference to an application object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppRef {
    pub module: String,
    pub attribute: String,
}

impl fmt::Display for AppRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.attribute)
    }
}

/// The command the image runs when started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub app: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    Base { image: String },
    Workdir { path: String },
    CopyManifest { source: PathBuf },
    InstallDependencies,
    CopyArtifacts { sources: Vec<PathBuf> },
}

impl BuildStep {
    pub fn kind(&self) -> &'static str {
        match self {
            BuildStep::Base { .. } => "base",
            BuildStep::Workdir { .. } => "workdir",
            BuildStep::CopyManifest { .. } => "copy-manifest",
            BuildStep::InstallDependencies => "install-dependencies",
            BuildStep::CopyArtifacts { .. } => "copy-artifacts",
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Base { image } => write!(f, "FROM {}", image),
            BuildStep::Workdir { path } => write!(f, "WORKDIR {}", path),
            BuildStep::CopyManifest { source } => write!(f, "COPY {} ./", file_label(source)),
            BuildStep::InstallDependencies => write!(f, "RUN install --no-cache"),
            BuildStep::CopyArtifacts { sources } => {
                let names: Vec<String> = sources.iter().map(|s| file_label(s)).collect();
                write!(f, "COPY {} ./", names.join(" "))
            }
        }
    }
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub step: String,
    pub instruction: String,
    pub key: String,
    pub cached: bool,
}

/// Written as `image.json` beside the staged root filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub base: String,
    pub workdir: String,
    pub deps_target: String,
    pub layers: Vec<LayerRecord>,
    pub cmd: LaunchSpec,
    pub created_at: String,
}

impl ImageManifest {
    pub fn layer(&self, kind: &str) -> Option<&LayerRecord> {
        self.layers.iter().find(|l| l.step == kind)
    }
}
