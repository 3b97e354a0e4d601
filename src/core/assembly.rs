use crate::core::layer_cache::{chain_key, file_digest, LayerCache};
use crate::core::manifest::normalize_name;
use crate::core::staging::{copy_dir_all, StagingRoot};
use crate::domain::model::{
    BuildStep, DependencyManifest, ImageManifest, LaunchSpec, LayerRecord,
};
use crate::domain::ports::{DependencyInstaller, InstallRequest};
use crate::utils::error::{Result, ServiceError};
use crate::utils::validation::{self, Validate};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_MANIFEST_FILE: &str = "image.json";
pub const ROOTFS_DIR: &str = "rootfs";

/// Ordered build steps plus the image metadata they produce.
#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub base: String,
    pub workdir: String,
    pub deps_target: String,
    /// Build-context path of the dependency manifest. The install step
    /// looks for its file name inside the image's working directory.
    pub manifest: PathBuf,
    pub steps: Vec<BuildStep>,
    pub launch: LaunchSpec,
}

impl ImagePlan {
    pub fn standard(
        base: impl Into<String>,
        workdir: impl Into<String>,
        deps_target: impl Into<String>,
        manifest: PathBuf,
        app_module: PathBuf,
        log_artifact: PathBuf,
        launch: LaunchSpec,
    ) -> Self {
        let base = base.into();
        let workdir = workdir.into();
        let steps = vec![
            BuildStep::Base {
                image: base.clone(),
            },
            BuildStep::Workdir {
                path: workdir.clone(),
            },
            BuildStep::CopyManifest {
                source: manifest.clone(),
            },
            BuildStep::InstallDependencies,
            BuildStep::CopyArtifacts {
                sources: vec![app_module, log_artifact],
            },
        ];

        Self {
            base,
            workdir,
            deps_target: deps_target.into(),
            manifest,
            steps,
            launch,
        }
    }

    pub fn instructions(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.to_string()).collect()
    }

    fn position(&self, kind: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.kind() == kind)
    }
}

impl Validate for ImagePlan {
    fn validate(&self) -> Result<()> {
        validation::validate_pinned_image("image.base", &self.base)?;
        validation::validate_absolute_path("image.workdir", &self.workdir)?;
        validation::validate_absolute_path("install.target", &self.deps_target)?;
        validation::validate_non_empty_string("launch.app", &self.launch.app)?;

        for step in &self.steps {
            if let BuildStep::Base { image } = step {
                validation::validate_pinned_image("image.base", image)?;
            }
        }

        if let (Some(install), Some(artifacts)) = (
            self.position("install-dependencies"),
            self.position("copy-artifacts"),
        ) {
            if artifacts < install {
                tracing::warn!(
                    "Application files are copied before dependencies are installed; \
                     every source change will invalidate the install layer"
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub output_dir: PathBuf,
    pub image: ImageManifest,
}

impl AssemblyReport {
    pub fn rootfs(&self) -> PathBuf {
        self.output_dir.join(ROOTFS_DIR)
    }
}

/// Executes an [`ImagePlan`] into `output_dir/rootfs`. The output directory
/// is only replaced once every step has succeeded.
pub struct Assembler<I: DependencyInstaller> {
    plan: ImagePlan,
    installer: I,
    cache: Option<LayerCache>,
    output_dir: PathBuf,
}

struct BuildState {
    root: StagingRoot,
    workdir: String,
    parent_key: String,
    staged: BTreeSet<String>,
    /// Top-level entries the install step placed in the dependency target.
    installed: BTreeSet<String>,
    layers: Vec<LayerRecord>,
}

impl<I: DependencyInstaller> Assembler<I> {
    pub fn new(plan: ImagePlan, installer: I, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            plan,
            installer,
            cache: None,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_cache(mut self, cache: LayerCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn plan(&self) -> &ImagePlan {
        &self.plan
    }

    pub async fn assemble(&self) -> Result<AssemblyReport> {
        self.plan.validate()?;
        tracing::info!("Assembling image from {}", self.plan.base);

        let parent = output_parent(&self.output_dir);
        fs::create_dir_all(&parent)?;
        let scratch = tempfile::Builder::new()
            .prefix(".assemble-")
            .tempdir_in(&parent)?;

        let mut state = BuildState {
            root: StagingRoot::new(scratch.path().join(ROOTFS_DIR)),
            workdir: "/".to_string(),
            parent_key: String::new(),
            staged: BTreeSet::new(),
            installed: BTreeSet::new(),
            layers: Vec::new(),
        };
        fs::create_dir_all(state.root.rootfs())?;

        let total = self.plan.steps.len();
        for (index, step) in self.plan.steps.iter().enumerate() {
            tracing::info!("Step {}/{}: {}", index + 1, total, step);
            let record = self.run_step(step, &mut state).await?;
            if record.cached {
                tracing::info!("  -> using cache {}", &record.key[..12]);
            }
            state.parent_key = record.key.clone();
            state.layers.push(record);
        }

        check_workdir(
            &state.root,
            &state.workdir,
            &self.plan.deps_target,
            &state.staged,
            &state.installed,
        )?;

        let image = ImageManifest {
            base: self.plan.base.clone(),
            workdir: state.workdir.clone(),
            deps_target: self.plan.deps_target.clone(),
            layers: state.layers,
            cmd: self.plan.launch.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        fs::write(
            scratch.path().join(IMAGE_MANIFEST_FILE),
            serde_json::to_vec_pretty(&image)?,
        )?;

        publish(scratch.path(), &self.output_dir)?;

        tracing::info!("Image written to {}", self.output_dir.display());
        Ok(AssemblyReport {
            output_dir: self.output_dir.clone(),
            image,
        })
    }

    async fn run_step(&self, step: &BuildStep, state: &mut BuildState) -> Result<LayerRecord> {
        let instruction = step.to_string();
        let mut cached = false;

        let key = match step {
            BuildStep::Base { .. } => chain_key(&state.parent_key, &instruction, &[]),
            BuildStep::Workdir { path } => {
                state.root.create_dir(path)?;
                state.workdir = path.clone();
                chain_key(&state.parent_key, &instruction, &[])
            }
            BuildStep::CopyManifest { source } => {
                let digest = file_digest(source).map_err(|_| ServiceError::ManifestMissing {
                    path: source.clone(),
                })?;
                self.stage_file(source, state)?;
                chain_key(&state.parent_key, &instruction, &[digest])
            }
            BuildStep::CopyArtifacts { sources } => {
                let mut digests = Vec::with_capacity(sources.len());
                for source in sources {
                    digests.push(
                        file_digest(source)
                            .map_err(|e| ServiceError::staging(source, e.to_string()))?,
                    );
                    self.stage_file(source, state)?;
                }
                chain_key(&state.parent_key, &instruction, &digests)
            }
            BuildStep::InstallDependencies => {
                let key = chain_key(
                    &state.parent_key,
                    &format!("{} {}", instruction, self.installer.fingerprint()),
                    &[],
                );
                cached = self.install_dependencies(&key, state).await?;
                key
            }
        };

        Ok(LayerRecord {
            step: step.kind().to_string(),
            instruction,
            key,
            cached,
        })
    }

    fn stage_file(&self, source: &Path, state: &mut BuildState) -> Result<()> {
        let dest = state.root.copy_file_into(source, &state.workdir)?;
        if let Some(name) = dest.file_name() {
            state.staged.insert(name.to_string_lossy().into_owned());
        }
        Ok(())
    }

    /// Returns whether the layer came from the cache.
    async fn install_dependencies(&self, key: &str, state: &mut BuildState) -> Result<bool> {
        let manifest_name = self.plan.manifest.file_name().ok_or_else(|| {
            ServiceError::config("dependency manifest path has no file name")
        })?;
        let staged_manifest = state.root.resolve(&state.workdir).join(manifest_name);
        let manifest = DependencyManifest::from_file(&staged_manifest)?;
        tracing::info!(
            "Manifest declares {} dependencies: {}",
            manifest.len(),
            manifest.names().join(", ")
        );

        let target = state.root.create_dir(&self.plan.deps_target)?;

        if let Some(snapshot) = self.cache.as_ref().and_then(|c| c.lookup(key)) {
            copy_dir_all(&snapshot, &target)?;
            state.installed = top_level_entries(&snapshot)?;
            return Ok(true);
        }

        let work = tempfile::Builder::new().prefix("install-").tempdir()?;
        let install_target = work.path().join("target");
        let install_scratch = work.path().join("scratch");
        fs::create_dir_all(&install_target)?;
        fs::create_dir_all(&install_scratch)?;

        let installed = self
            .installer
            .install(&InstallRequest {
                manifest_path: &staged_manifest,
                dependencies: &manifest.dependencies,
                target: &install_target,
                scratch: &install_scratch,
            })
            .await?;

        ensure_complete(&manifest, &installed)?;

        copy_dir_all(&install_target, &target)?;
        state.installed = top_level_entries(&install_target)?;
        if let Some(cache) = &self.cache {
            cache.store(key, "install-dependencies", &install_target)?;
        }
        Ok(false)
    }
}

fn output_parent(output: &Path) -> PathBuf {
    match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn top_level_entries(dir: &Path) -> Result<BTreeSet<String>> {
    let mut entries = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        entries.insert(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(entries)
}

/// The working directory may only hold staged files plus whatever the
/// dependency target contributes: its first component when it sits below
/// the workdir, or the installer's own entries when it is the workdir.
fn check_workdir(
    root: &StagingRoot,
    workdir: &str,
    deps_target: &str,
    staged: &BTreeSet<String>,
    installed: &BTreeSet<String>,
) -> Result<()> {
    let mut expected = staged.clone();
    let workdir_path = Path::new(workdir);
    if let Ok(relative) = Path::new(deps_target).strip_prefix(workdir_path) {
        match relative.components().next() {
            Some(first) => {
                expected.insert(first.as_os_str().to_string_lossy().into_owned());
            }
            None => expected.extend(installed.iter().cloned()),
        }
    }

    let actual = root.list_dir(workdir)?;
    let unexpected: Vec<&String> = actual.difference(&expected).collect();
    if !unexpected.is_empty() {
        return Err(ServiceError::staging(
            root.resolve(workdir),
            format!("unexpected entries in working directory: {:?}", unexpected),
        ));
    }
    Ok(())
}

/// Moves `staged` into place at `output`. An existing output is set aside
/// first, put back if the swap fails and deleted once it succeeds.
fn publish(staged: &Path, output: &Path) -> Result<()> {
    if output.symlink_metadata().is_err() {
        fs::rename(staged, output)?;
        return Ok(());
    }

    let previous = output_parent(output).join(format!(".previous-{}", std::process::id()));
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    fs::rename(output, &previous)?;

    if let Err(e) = fs::rename(staged, output) {
        if let Err(restore) = fs::rename(&previous, output) {
            tracing::error!(
                "Could not restore previous image, it is kept at {}: {}",
                previous.display(),
                restore
            );
        }
        return Err(e.into());
    }

    if let Err(e) = fs::remove_dir_all(&previous) {
        tracing::warn!("Could not remove previous image {}: {}", previous.display(), e);
    }
    Ok(())
}

fn ensure_complete(manifest: &DependencyManifest, installed: &[String]) -> Result<()> {
    let installed: HashSet<String> = installed
        .iter()
        .map(|name| normalize_name(name))
        .collect();

    let missing: Vec<&str> = manifest
        .dependencies
        .iter()
        .filter(|d| !installed.contains(&d.normalized_name()))
        .map(|d| d.name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::install(format!(
            "installer reported a partial install; missing: {}",
            missing.join(", ")
        )))
    }
}
