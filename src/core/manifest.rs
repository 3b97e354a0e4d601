use crate::domain::model::{Dependency, DependencyManifest};
use crate::utils::error::{Result, ServiceError};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?P<rest>(?:\[[A-Za-z0-9._,\s-]*\])?\s*(?:[=<>!~;].*)?)$")
        .expect("requirement pattern is valid")
});

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("separator pattern is valid"));

/// Case-insensitive form with `-`, `_` and `.` runs folded to `-`.
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(&name.to_ascii_lowercase(), "-")
        .into_owned()
}

impl Dependency {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn requirement_line(&self) -> String {
        format!("{}{}", self.name, self.constraint)
    }
}

impl DependencyManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ServiceError::ManifestMissing {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut dependencies = Vec::new();
        let mut seen = HashSet::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('-') {
                return Err(ServiceError::ManifestError {
                    line: line_no,
                    message: format!("installer options are not supported: {}", line),
                });
            }

            let caps = REQUIREMENT
                .captures(line)
                .ok_or_else(|| ServiceError::ManifestError {
                    line: line_no,
                    message: format!("not a `name<constraint>` entry: {}", line),
                })?;

            let dependency = Dependency {
                name: caps["name"].to_string(),
                constraint: caps["rest"].trim().to_string(),
            };

            if !seen.insert(dependency.normalized_name()) {
                return Err(ServiceError::ManifestError {
                    line: line_no,
                    message: format!("duplicate dependency: {}", dependency.name),
                });
            }

            dependencies.push(dependency);
        }

        Ok(Self { dependencies })
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.dependencies.iter().map(|d| d.name.clone()).collect()
    }
}

/// `#` starts a comment at line start or after whitespace; a `#` glued to
/// other text (as in URL fragments) is kept.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return &line[..i];
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_declaration_order() {
        let manifest = DependencyManifest::parse(
            "# runtime\nfastapi==0.104.1\nuvicorn[standard]>=0.24\n\nprometheus-client\n",
        )
        .unwrap();

        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.dependencies[0].name, "fastapi");
        assert_eq!(manifest.dependencies[0].constraint, "==0.104.1");
        assert_eq!(manifest.dependencies[1].name, "uvicorn");
        assert_eq!(manifest.dependencies[1].constraint, "[standard]>=0.24");
        assert_eq!(manifest.dependencies[2].constraint, "");
    }

    #[test]
    fn test_parse_strips_trailing_comments() {
        let manifest = DependencyManifest::parse("requests>=2.31  # http client").unwrap();
        assert_eq!(manifest.dependencies[0].requirement_line(), "requests>=2.31");
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = DependencyManifest::parse("fastapi\n==1.0\n").unwrap_err();
        match err {
            ServiceError::ManifestError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_normalized_duplicates() {
        let err = DependencyManifest::parse("prometheus_client\nPrometheus-Client==0.19\n")
            .unwrap_err();
        assert!(matches!(err, ServiceError::ManifestError { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_installer_options() {
        assert!(DependencyManifest::parse("-r other.txt").is_err());
    }

    #[test]
    fn test_from_file_missing_manifest() {
        let err = DependencyManifest::from_file("/nonexistent/requirements.txt").unwrap_err();
        assert!(matches!(err, ServiceError::ManifestMissing { .. }));
    }
}
