//! Loading of one resource's dated version directories.
//!
//! A resource directory holds one subdirectory per release date, each with a
//! `spec.yaml` snapshot:
//!
//! ```text
//! hello-world/
//!   2021-06-01/spec.yaml
//!   2021-06-07/spec.yaml
//!   2021-06-13/spec.yaml   # x-snyk-api-stability: beta
//! ```
//!
//! Loading validates each snapshot, expands included headers, localizes
//! external references, and stamps every operation with its effective
//! version, lifecycle, and deprecation metadata derived from the resource's
//! own timeline.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::document::{CancelToken, Document, RefResolver, HTTP_METHODS};
use crate::error::{Error, Result};
use crate::include_headers;
use crate::localize;
use crate::version::{resolve, Lifecycle, Stability, Version};

/// Top-level extension naming a snapshot's stability.
pub const STABILITY_EXTENSION: &str = "x-snyk-api-stability";
/// Operation-level extension carrying the effective version, produced.
pub const VERSION_EXTENSION: &str = "x-snyk-api-version";
/// Operation-level extension carrying the lifecycle, produced.
pub const LIFECYCLE_EXTENSION: &str = "x-snyk-api-lifecycle";
/// Operation-level extension naming the deprecating version, produced.
pub const DEPRECATED_BY_EXTENSION: &str = "x-snyk-deprecated-by";
/// Operation-level extension listing superseded pre-GA releases, produced.
pub const RELEASES_EXTENSION: &str = "x-snyk-api-releases";

/// Compiled exclusion globs, matched against spec file paths relative to
/// the root they were configured for.
#[derive(Debug, Default)]
pub struct ExcludeFilter {
    root: PathBuf,
    patterns: Vec<glob::Pattern>,
}

impl ExcludeFilter {
    /// Compile exclusion patterns relative to `root`.
    pub fn new(root: impl Into<PathBuf>, patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| Error::ConfigValue {
                    key: "excludes".to_string(),
                    message: format!("invalid glob '{p}': {e}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { root: root.into(), patterns: compiled })
    }

    /// An empty filter that excludes nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether `path` matches any exclusion pattern.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.patterns.iter().any(|p| p.matches_path(relative))
    }
}

/// One loaded snapshot of a resource.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Resource name (the directory containing the version directories).
    pub name: String,
    /// Version of this snapshot.
    pub version: Version,
    /// The processed document.
    pub document: Document,
    /// The `spec.yaml` this snapshot was loaded from.
    pub source_file: PathBuf,
}

/// Non-empty, version-sorted snapshots of one resource.
#[derive(Debug)]
pub struct ResourceVersions {
    name: String,
    resources: Vec<Resource>,
}

impl ResourceVersions {
    /// Load a resource directory, stamping lifecycles against the current
    /// UTC date.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load_at(dir, Utc::now().date_naive())
    }

    /// Load a resource directory, stamping lifecycles as of `now`.
    pub fn load_at(dir: impl AsRef<Path>, now: NaiveDate) -> Result<Self> {
        Self::load_at_excluding(dir, now, &ExcludeFilter::none())
    }

    /// Load a resource directory as of `now`, skipping version spec files
    /// matched by `excludes`.
    pub fn load_at_excluding(
        dir: impl AsRef<Path>,
        now: NaiveDate,
        excludes: &ExcludeFilter,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::DirectoryNotFound { path: dir.to_path_buf() });
        }
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::internal(format!("unnamed resource directory {}", dir.display())))?
            .to_string();

        let mut resolver = RefResolver::new();
        let cancel = CancelToken::new();
        let mut loaded: Vec<Resource> = Vec::new();

        for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
            let entry = entry.map_err(|e| Error::io(dir, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(date) = version_date(&path) else {
                continue;
            };
            let spec_file = path.join("spec.yaml");
            if !spec_file.is_file() {
                tracing::warn!(dir = %path.display(), "Version directory has no spec.yaml, skipping");
                continue;
            }
            if excludes.is_excluded(&spec_file) {
                tracing::debug!(file = %spec_file.display(), "Excluded by pattern");
                continue;
            }

            tracing::debug!(file = %spec_file.display(), "Loading resource version");
            let mut document = Document::from_file(&spec_file)?;
            document.validate(&mut resolver, &cancel)?;
            include_headers::expand(&mut document, &mut resolver)?;
            localize::localize(&mut document, &mut resolver)?;

            let stability = document_stability(document.value())?;
            loaded.push(Resource {
                name: name.clone(),
                version: Version::new(date, stability),
                document,
                source_file: spec_file,
            });
        }

        if loaded.is_empty() {
            return Err(Error::internal(format!(
                "resource '{name}' has no version directories"
            )));
        }
        loaded.sort_by_key(|r| r.version);

        let timeline: Vec<Version> = loaded.iter().map(|r| r.version).collect();
        for resource in &mut loaded {
            stamp_operations(resource, &timeline, now);
        }

        tracing::info!(
            resource = %name,
            versions = loaded.len(),
            "Loaded resource versions"
        );
        Ok(Self { name, resources: loaded })
    }

    /// The resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All versions of this resource, ascending.
    #[must_use]
    pub fn versions(&self) -> Vec<Version> {
        self.resources.iter().map(|r| r.version).collect()
    }

    /// The snapshots, version-sorted.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// The snapshot effective for `query`, following the stability ladder.
    pub fn at(&self, query: Version) -> Result<&Resource> {
        let effective = resolve(&self.versions(), query)?;
        self.resources
            .iter()
            .find(|r| r.version == effective)
            .ok_or(Error::NoMatchingVersion)
    }
}

/// Parse a version directory name as a calendar date.
fn version_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    name.parse::<Version>()
        .ok()
        .filter(|v| v.stability == Stability::Ga && v.to_string() == name)
        .map(|v| v.date)
}

/// Read `x-snyk-api-stability` from the top level, defaulting to GA.
fn document_stability(value: &Value) -> Result<Stability> {
    match value.get(STABILITY_EXTENSION) {
        None => Ok(Stability::Ga),
        Some(Value::String(s)) => s.parse(),
        Some(other) => Err(Error::version_parse(
            other.to_string(),
            format!("{STABILITY_EXTENSION} must be a string"),
        )),
    }
}

/// Stamp version, lifecycle, and deprecation extensions into every
/// operation of a snapshot.
fn stamp_operations(resource: &mut Resource, timeline: &[Version], now: NaiveDate) {
    let version = resource.version;
    let deprecated_by = version.deprecated_by(timeline);
    let lifecycle = version.lifecycle_at(now, deprecated_by.as_ref());
    let releases = if version.stability == Stability::Ga {
        let mut superseded: Vec<String> = timeline
            .iter()
            .filter(|w| {
                w.stability < Stability::Ga && w.deprecated_by(timeline) == Some(version)
            })
            .map(Version::to_string)
            .collect();
        superseded.sort();
        superseded
    } else {
        Vec::new()
    };

    let Some(paths) = resource
        .document
        .value_mut()
        .get_mut("paths")
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    for path_item in paths.values_mut() {
        let Some(path_item) = path_item.as_object_mut() else {
            continue;
        };
        for method in HTTP_METHODS {
            let Some(operation) = path_item.get_mut(method).and_then(Value::as_object_mut) else {
                continue;
            };
            operation.insert(
                VERSION_EXTENSION.to_string(),
                Value::String(version.to_string()),
            );
            if lifecycle != Lifecycle::Unreleased {
                operation.insert(
                    LIFECYCLE_EXTENSION.to_string(),
                    Value::String(lifecycle.to_string()),
                );
            }
            if let Some(by) = deprecated_by {
                operation.insert(
                    DEPRECATED_BY_EXTENSION.to_string(),
                    Value::String(by.to_string()),
                );
            }
            if !releases.is_empty() {
                operation.insert(
                    RELEASES_EXTENSION.to_string(),
                    Value::Array(releases.iter().cloned().map(Value::String).collect()),
                );
            }
        }
    }
}
