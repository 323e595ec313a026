//! Aggregation of many resources into effective API documents.
//!
//! [`SpecVersions`] holds the [`ResourceVersions`] of every resource found
//! under one or more roots. The union of their versions is the set of
//! effective versions of the whole API; [`SpecVersions::at`] materializes
//! the aggregate document for any one of them by merging each resource's
//! effective snapshot into an OpenAPI skeleton.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::merge::merge;
use crate::resource::{ExcludeFilter, ResourceVersions};
use crate::version::{sort_dedup, Version};

/// OpenAPI version written into aggregate skeletons.
const OPENAPI_VERSION: &str = "3.0.3";

/// File name of a version snapshot within its date directory.
const SPEC_FILE: &str = "spec.yaml";

/// All resources of an API, loaded from versioned directories.
#[derive(Debug, Default)]
pub struct SpecVersions {
    resources: Vec<ResourceVersions>,
}

impl SpecVersions {
    /// Create an empty set, to be populated with [`SpecVersions::add_root`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every resource under `root`, stamping lifecycles against the
    /// current UTC date.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        Self::load_at(root, Utc::now().date_naive())
    }

    /// Load every resource under `root` as of `now`.
    pub fn load_at(root: impl AsRef<Path>, now: NaiveDate) -> Result<Self> {
        let mut this = Self::new();
        this.add_root(root, now, &[])?;
        Ok(this)
    }

    /// Discover and load the resources under `root`, appending them to this
    /// set. `excludes` are glob patterns matched against paths relative to
    /// `root`; matching spec files are skipped.
    ///
    /// A resource directory is any directory containing at least one
    /// `<YYYY-MM-DD>/spec.yaml`. Resource names starting with `_` are
    /// reserved for examples and fixtures and are ignored.
    pub fn add_root(
        &mut self,
        root: impl AsRef<Path>,
        now: NaiveDate,
        excludes: &[String],
    ) -> Result<()> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::DirectoryNotFound { path: root.to_path_buf() });
        }
        let filter = ExcludeFilter::new(root, excludes)?;

        let mut resource_dirs: Vec<PathBuf> = Vec::new();
        for entry in walkdir::WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name().to_str() != Some(SPEC_FILE) {
                continue;
            }
            if filter.is_excluded(entry.path()) {
                tracing::debug!(file = %entry.path().display(), "Excluded by pattern");
                continue;
            }
            // <resource>/<date>/spec.yaml: the version directory's parent
            // names the resource
            let Some(version_dir) = entry.path().parent() else {
                continue;
            };
            let Some(resource_dir) = version_dir.parent() else {
                continue;
            };
            let Some(resource_name) = resource_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if resource_name.starts_with('_') {
                tracing::debug!(resource = %resource_name, "Ignoring reserved resource");
                continue;
            }
            let resource_dir = resource_dir.to_path_buf();
            if !resource_dirs.contains(&resource_dir) {
                resource_dirs.push(resource_dir);
            }
        }
        resource_dirs.sort();

        for dir in resource_dirs {
            tracing::debug!(dir = %dir.display(), "Loading resource");
            self.resources
                .push(ResourceVersions::load_at_excluding(&dir, now, &filter)?);
        }
        self.resources.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(())
    }

    /// The loaded resources, sorted by name.
    #[must_use]
    pub fn resources(&self) -> &[ResourceVersions] {
        &self.resources
    }

    /// Sorted union of all resources' versions, de-duplicated by
    /// (date, stability).
    #[must_use]
    pub fn versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .resources
            .iter()
            .flat_map(ResourceVersions::versions)
            .collect();
        sort_dedup(&mut versions);
        versions
    }

    /// The aggregate document effective at `query`.
    ///
    /// Resources without a matching version are skipped; a conflict between
    /// two resources is an error naming both.
    pub fn at(&self, query: Version) -> Result<Value> {
        let mut aggregate = json!({
            "openapi": OPENAPI_VERSION,
            "paths": {},
        });
        let mut merged: Vec<&ResourceVersions> = Vec::new();

        for resource in &self.resources {
            let snapshot = match resource.at(query) {
                Ok(snapshot) => snapshot,
                Err(err) if err.is_no_matching_version() => {
                    tracing::debug!(
                        resource = %resource.name(),
                        version = %query,
                        "No matching version, skipping resource"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            merge(&mut aggregate, snapshot.document.value(), false).map_err(|err| {
                attribute_conflict(err, resource.name(), &merged)
            })?;
            merged.push(resource);
        }
        Ok(aggregate)
    }
}

/// Rewrite a merge conflict to name both contributing resources.
fn attribute_conflict(err: Error, current: &str, merged: &[&ResourceVersions]) -> Error {
    let Error::Conflict { pointer, message } = err else {
        return err;
    };
    let fragment = pointer.trim_start_matches('#').to_string();
    let other = merged
        .iter()
        .find(|r| {
            r.resources()
                .iter()
                .any(|snapshot| snapshot.document.value().pointer(&fragment).is_some())
        })
        .map_or_else(|| "a previously merged resource".to_string(), |r| {
            format!("resource '{}'", r.name())
        });
    Error::conflict(
        pointer,
        format!("between resource '{current}' and {other}: {message}"),
    )
}
