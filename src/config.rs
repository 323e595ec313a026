//! Project configuration for Vervet.
//!
//! A project file (`.vervet.yaml`) enumerates the APIs to compile, where
//! their resources live, and where output goes:
//!
//! ```yaml
//! # .vervet.yaml
//! apis:
//!   registry:
//!     resources:
//!       - path: resources
//!         excludes:
//!           - "**/_examples/**"
//!     overlays:
//!       - include: overlays/servers.yaml
//!       - inline: |
//!           info:
//!             title: Registry API
//!     output:
//!       path: versions
//! ```
//!
//! Defaults are applied by an explicit [`Project::normalize`] called once
//! after load; there is no global state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the project file searched for by the CLI.
pub const DEFAULT_PROJECT_FILE: &str = ".vervet.yaml";

/// A whole project: one entry per API.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Project {
    /// APIs by name.
    pub apis: BTreeMap<String, ApiConfig>,
}

/// Configuration of one API.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    /// Resource directory sets to aggregate.
    pub resources: Vec<ResourceSet>,

    /// Overlays merged on top of the aggregate, in order.
    pub overlays: Vec<Overlay>,

    /// Where compiled versions are written. Absent means build-only checks.
    pub output: Option<Output>,
}

/// A root directory containing versioned resource directories.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResourceSet {
    /// Directory containing `<resource>/<YYYY-MM-DD>/spec.yaml` trees.
    pub path: PathBuf,

    /// Glob patterns (relative to `path`) of spec files to skip.
    pub excludes: Vec<String>,
}

/// An overlay document: either a file include or an inline literal.
/// Exactly one of the two must be set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Overlay {
    /// Path of an OpenAPI fragment to merge.
    pub include: Option<PathBuf>,

    /// Inline OpenAPI fragment (YAML) to merge.
    pub inline: Option<String>,
}

/// Output options of one API.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Output {
    /// Directory receiving one `<version>/spec.{json,yaml}` pair per
    /// effective version.
    pub path: PathBuf,
}

impl Project {
    /// Load a project file, normalize defaults, and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound { path: path.to_path_buf() });
        }
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a project from YAML, normalize defaults, and validate.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut project: Self = serde_yaml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(Box::new(e)),
        })?;
        project.normalize();
        project.validate()?;
        Ok(project)
    }

    /// Apply defaults after load: de-duplicate exclusion patterns and trim
    /// empty overlay fields down to `None`.
    pub fn normalize(&mut self) {
        for api in self.apis.values_mut() {
            for resource_set in &mut api.resources {
                resource_set.excludes.sort();
                resource_set.excludes.dedup();
            }
            for overlay in &mut api.overlays {
                if overlay.inline.as_deref().is_some_and(str::is_empty) {
                    overlay.inline = None;
                }
            }
        }
    }

    /// Validate the project structure.
    pub fn validate(&self) -> Result<()> {
        if self.apis.is_empty() {
            return Err(Error::ConfigMissing { key: "apis".to_string() });
        }
        for (name, api) in &self.apis {
            if api.resources.is_empty() {
                return Err(Error::ConfigMissing {
                    key: format!("apis.{name}.resources"),
                });
            }
            for (i, resource_set) in api.resources.iter().enumerate() {
                if resource_set.path.as_os_str().is_empty() {
                    return Err(Error::ConfigMissing {
                        key: format!("apis.{name}.resources[{i}].path"),
                    });
                }
            }
            for (i, overlay) in api.overlays.iter().enumerate() {
                match (&overlay.include, &overlay.inline) {
                    (Some(_), Some(_)) => {
                        return Err(Error::ConfigValue {
                            key: format!("apis.{name}.overlays[{i}]"),
                            message: "specify either include or inline, not both".to_string(),
                        });
                    }
                    (None, None) => {
                        return Err(Error::ConfigValue {
                            key: format!("apis.{name}.overlays[{i}]"),
                            message: "specify one of include or inline".to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// An example project file, written by `vervet init`.
    #[must_use]
    pub fn example() -> &'static str {
        r#"# Vervet project configuration
apis:
  my-api:
    resources:
      - path: resources
        excludes:
          - "**/_examples/**"
    overlays:
      - inline: |
          servers:
            - url: https://example.com/api/v3
    output:
      path: versions
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_project() {
        let project = Project::from_yaml(
            "apis:\n  registry:\n    resources:\n      - path: resources\n",
        )
        .unwrap();
        let api = &project.apis["registry"];
        assert_eq!(api.resources[0].path, PathBuf::from("resources"));
        assert!(api.overlays.is_empty());
        assert!(api.output.is_none());
    }

    #[test]
    fn example_config_is_valid() {
        let project = Project::from_yaml(Project::example()).unwrap();
        let api = &project.apis["my-api"];
        assert_eq!(api.resources[0].excludes, vec!["**/_examples/**".to_string()]);
        assert!(api.overlays[0].inline.is_some());
        assert_eq!(api.output.as_ref().unwrap().path, PathBuf::from("versions"));
    }

    #[test]
    fn rejects_empty_project() {
        assert!(Project::from_yaml("apis: {}\n").is_err());
    }

    #[test]
    fn rejects_api_without_resources() {
        let err = Project::from_yaml("apis:\n  registry: {}\n").unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { .. }));
    }

    #[test]
    fn rejects_ambiguous_overlay() {
        let err = Project::from_yaml(
            "apis:\n  registry:\n    resources:\n      - path: resources\n    overlays:\n      - include: overlay.yaml\n        inline: 'info: {}'\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValue { .. }));
    }

    #[test]
    fn rejects_empty_overlay() {
        let err = Project::from_yaml(
            "apis:\n  registry:\n    resources:\n      - path: resources\n    overlays:\n      - {}\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValue { .. }));
    }

    #[test]
    fn normalize_dedups_excludes() {
        let project = Project::from_yaml(
            "apis:\n  registry:\n    resources:\n      - path: resources\n        excludes:\n          - \"a/**\"\n          - \"a/**\"\n",
        )
        .unwrap();
        assert_eq!(project.apis["registry"].resources[0].excludes.len(), 1);
    }
}
