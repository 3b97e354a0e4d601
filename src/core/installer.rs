use crate::core::manifest::normalize_name;
use crate::domain::ports::{DependencyInstaller, InstallRequest};
use crate::utils::error::{Result, ServiceError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 20;

/// Runs an external package installer. `{manifest}` and `{target}` in the
/// arguments are replaced with the staged manifest and the install target.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn render_args(&self, request: &InstallRequest<'_>) -> Vec<String> {
        let manifest = request.manifest_path.display().to_string();
        let target = request.target.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{manifest}", &manifest).replace("{target}", &target))
            .collect()
    }
}

#[async_trait]
impl DependencyInstaller for CommandInstaller {
    fn fingerprint(&self) -> String {
        let env: Vec<String> = self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{} {} [{}]", self.program, self.args.join(" "), env.join(" "))
    }

    async fn install(&self, request: &InstallRequest<'_>) -> Result<Vec<String>> {
        let args = self.render_args(request);
        tracing::info!("Running installer: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .current_dir(request.scratch)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServiceError::install(format!("failed to start {}: {}", self.program, e)))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ServiceError::install(format!("installer timed out after {:?}", limit)))??,
            None => child.wait_with_output().await?,
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!("[installer] {}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(ServiceError::install(format!(
                "{} exited with {}: {}",
                self.program, output.status, tail
            )));
        }

        let installed = installed_names(request.target)?;
        tracing::debug!("Installer produced: {}", installed.join(", "));
        Ok(installed)
    }
}

/// Normalised distribution names found at the top of an install target.
/// `name-version.dist-info` and `name-version.egg-info` metadata give the
/// distribution name; other entries count under their own stem.
pub fn installed_names(target: &Path) -> Result<Vec<String>> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(target)? {
        let file_name = entry?.file_name().to_string_lossy().into_owned();
        let name = match file_name
            .strip_suffix(".dist-info")
            .or_else(|| file_name.strip_suffix(".egg-info"))
        {
            Some(stem) => stem.split('-').next().unwrap_or(stem),
            None => file_name.split('.').next().unwrap_or(&file_name),
        };
        if !name.is_empty() {
            names.insert(normalize_name(name));
        }
    }
    Ok(names.into_iter().collect())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::model::Dependency;
    use tempfile::TempDir;

    fn request_paths(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
        let manifest = dir.path().join("requirements.txt");
        std::fs::write(&manifest, "fastapi==0.104.1\n").unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir_all(&target).unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        (manifest, target, scratch)
    }

    #[tokio::test]
    async fn test_substitutes_placeholders() {
        let dir = TempDir::new().unwrap();
        let (manifest, target, scratch) = request_paths(&dir);
        let deps = vec![Dependency {
            name: "fastapi".to_string(),
            constraint: "==0.104.1".to_string(),
        }];

        let installer = CommandInstaller::new(
            "sh",
            vec![
                "-c".to_string(),
                "cp {manifest} {target}/installed.txt && mkdir {target}/fastapi-0.104.1.dist-info"
                    .to_string(),
            ],
        );
        let installed = installer
            .install(&InstallRequest {
                manifest_path: &manifest,
                dependencies: &deps,
                target: &target,
                scratch: &scratch,
            })
            .await
            .unwrap();

        assert!(installed.contains(&"fastapi".to_string()));
        assert_eq!(
            std::fs::read_to_string(target.join("installed.txt")).unwrap(),
            "fastapi==0.104.1\n"
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_install_error() {
        let dir = TempDir::new().unwrap();
        let (manifest, target, scratch) = request_paths(&dir);

        let installer = CommandInstaller::new(
            "sh",
            vec!["-c".to_string(), "echo 'no matching distribution' >&2; exit 1".to_string()],
        );
        let err = installer
            .install(&InstallRequest {
                manifest_path: &manifest,
                dependencies: &[],
                target: &target,
                scratch: &scratch,
            })
            .await
            .unwrap_err();

        match err {
            ServiceError::InstallError { message } => {
                assert!(message.contains("no matching distribution"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_successful_exit_without_output_reports_nothing() {
        let dir = TempDir::new().unwrap();
        let (manifest, target, scratch) = request_paths(&dir);
        let deps = vec![Dependency {
            name: "fastapi".to_string(),
            constraint: "==0.104.1".to_string(),
        }];

        let installer =
            CommandInstaller::new("sh", vec!["-c".to_string(), "true {manifest}".to_string()]);
        let installed = installer
            .install(&InstallRequest {
                manifest_path: &manifest,
                dependencies: &deps,
                target: &target,
                scratch: &scratch,
            })
            .await
            .unwrap();

        assert!(installed.is_empty());
    }

    #[test]
    fn test_installed_names_reads_distribution_metadata() {
        let dir = TempDir::new().unwrap();
        for entry in [
            "fastapi",
            "fastapi-0.104.1.dist-info",
            "prometheus_client-0.19.0.dist-info",
            "PyYAML-6.0.1.dist-info",
            "yaml",
            "legacy_pkg-1.0-py3.11.egg-info",
        ] {
            std::fs::create_dir(dir.path().join(entry)).unwrap();
        }
        std::fs::write(dir.path().join("six.py"), "").unwrap();

        let names = installed_names(dir.path()).unwrap();
        assert_eq!(
            names,
            vec!["fastapi", "legacy-pkg", "prometheus-client", "pyyaml", "six", "yaml"]
        );
    }

    #[test]
    fn test_fingerprint_includes_env() {
        let mut env = BTreeMap::new();
        env.insert("PIP_NO_CACHE_DIR".to_string(), "1".to_string());
        let a = CommandInstaller::new("pip", vec!["install".to_string()]);
        let b = a.clone().with_env(env);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
