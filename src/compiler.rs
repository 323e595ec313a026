//! Compilation of configured APIs into versioned output documents.
//!
//! For every API in the project, the compiler loads its resource roots,
//! enumerates the union of effective versions, merges the aggregate at each
//! version, applies overlays, and writes one `spec.json` / `spec.yaml` pair
//! per version under the API's output directory.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::config::{ApiConfig, Project};
use crate::document::{Document, RefResolver};
use crate::error::{Error, Result};
use crate::localize;
use crate::merge::merge;
use crate::spec::SpecVersions;
use crate::version::Version;

/// Comment line prefixed to every generated YAML document.
pub const GENERATED_COMMENT: &str = "# OpenAPI spec generated by vervet, DO NOT EDIT";

/// One compiled (API, version) output.
#[derive(Debug)]
pub struct CompiledVersion {
    /// API name from the project configuration.
    pub api: String,
    /// Effective version compiled.
    pub version: Version,
    /// Directory the version was written to, when the API has an output.
    pub path: Option<PathBuf>,
}

/// Compiles a project's APIs.
#[derive(Debug)]
pub struct Compiler {
    project: Project,
    root: PathBuf,
    now: NaiveDate,
}

impl Compiler {
    /// Create a compiler rooted at the project file's directory, building
    /// against the current UTC date.
    #[must_use]
    pub fn new(project: Project, root: impl Into<PathBuf>) -> Self {
        Self::at(project, root, Utc::now().date_naive())
    }

    /// Create a compiler building as of `now`.
    #[must_use]
    pub fn at(project: Project, root: impl Into<PathBuf>, now: NaiveDate) -> Self {
        Self { project, root: root.into(), now }
    }

    /// The configured project.
    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// The date lifecycles are evaluated against.
    #[must_use]
    pub fn now(&self) -> NaiveDate {
        self.now
    }

    /// Load the resources of one configured API.
    pub fn load_api(&self, name: &str) -> Result<SpecVersions> {
        let api = self.api_config(name)?;
        let mut specs = SpecVersions::new();
        for resource_set in &api.resources {
            let root = self.root.join(&resource_set.path);
            specs.add_root(&root, self.now, &resource_set.excludes)?;
        }
        Ok(specs)
    }

    /// The aggregate of one API at a version, overlays applied.
    pub fn resolve(&self, name: &str, query: Version) -> Result<Value> {
        let api = self.api_config(name)?;
        let specs = self.load_api(name)?;
        let mut document = specs.at(query)?;
        self.apply_overlays(api, &mut document)?;
        Ok(document)
    }

    /// Build every configured API.
    pub fn build_all(&self) -> Result<Vec<CompiledVersion>> {
        let mut compiled = Vec::new();
        for name in self.project.apis.keys() {
            compiled.extend(self.build_api(name)?);
        }
        Ok(compiled)
    }

    /// Build one API: compile the aggregate at every effective version and
    /// write outputs when the API has an output directory.
    pub fn build_api(&self, name: &str) -> Result<Vec<CompiledVersion>> {
        let api = self.api_config(name)?;
        let specs = self.load_api(name)?;
        let versions = specs.versions();
        tracing::info!(api = %name, versions = versions.len(), "Building API");

        let out_dir = api.output.as_ref().map(|o| self.root.join(&o.path));
        if let Some(dir) = &out_dir {
            clear_generated_versions(dir)?;
        }

        let mut compiled = Vec::new();
        for version in versions {
            let mut document = specs.at(version)?;
            self.apply_overlays(api, &mut document)?;

            let path = match &out_dir {
                Some(dir) => Some(write_version(dir, version, &document)?),
                None => None,
            };
            tracing::debug!(api = %name, version = %version, "Compiled version");
            compiled.push(CompiledVersion { api: name.to_string(), version, path });
        }
        Ok(compiled)
    }

    fn api_config(&self, name: &str) -> Result<&ApiConfig> {
        self.project.apis.get(name).ok_or_else(|| Error::ConfigMissing {
            key: format!("apis.{name}"),
        })
    }

    /// Merge each overlay into `document` with `replace` semantics, in
    /// declaration order.
    fn apply_overlays(&self, api: &ApiConfig, document: &mut Value) -> Result<()> {
        for overlay in &api.overlays {
            if let Some(include) = &overlay.include {
                // overlays are fragments, not complete documents; they get
                // ref localization but not structural validation
                let path = self.root.join(include);
                let mut doc = Document::from_file(&path)?;
                let mut resolver = RefResolver::new();
                localize::localize(&mut doc, &mut resolver)?;
                merge(document, doc.value(), true)?;
            } else if let Some(inline) = &overlay.inline {
                let yaml: serde_yaml::Value =
                    serde_yaml::from_str(inline).map_err(|e| Error::ConfigParse {
                        message: format!("invalid inline overlay: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                let value = serde_json::to_value(yaml)?;
                merge(document, &value, true)?;
            }
        }
        Ok(())
    }
}

/// Remove previously generated version directories from an output dir.
/// Only directories whose names parse as versions are touched.
fn clear_generated_versions(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let is_version_dir = path.is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.parse::<Version>().is_ok());
        if is_version_dir {
            std::fs::remove_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        }
    }
    Ok(())
}

fn write_version(out_dir: &Path, version: Version, document: &Value) -> Result<PathBuf> {
    let dir = out_dir.join(version.to_string());
    std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

    let json = serde_json::to_string_pretty(document)?;
    let json_path = dir.join("spec.json");
    std::fs::write(&json_path, format!("{json}\n")).map_err(|e| Error::io(&json_path, e))?;

    let yaml = serde_yaml::to_string(document)
        .map_err(|e| Error::internal(format!("cannot serialize document as YAML: {e}")))?;
    let yaml_path = dir.join("spec.yaml");
    std::fs::write(&yaml_path, format!("{GENERATED_COMMENT}\n{yaml}"))
        .map_err(|e| Error::io(&yaml_path, e))?;

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn now() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 7, 1).unwrap()
    }

    fn write_version_dir(root: &Path, resource: &str, date: &str, servers: bool) {
        let dir = root.join("resources").join(resource).join(date);
        std::fs::create_dir_all(&dir).unwrap();
        let servers_block = if servers {
            "servers:\n  - url: /api/v3\n"
        } else {
            ""
        };
        std::fs::write(
            dir.join("spec.yaml"),
            format!(
                "openapi: 3.0.3\n{servers_block}info:\n  title: Registry\n  version: '3.0'\npaths:\n  /{resource}:\n    get:\n      operationId: get-{resource}\n      responses:\n        '200':\n          description: ok\n"
            ),
        )
        .unwrap();
    }

    fn project(overlay: &str) -> Project {
        Project::from_yaml(&format!(
            "apis:\n  registry:\n    resources:\n      - path: resources\n{overlay}    output:\n      path: versions\n"
        ))
        .unwrap()
    }

    #[test]
    fn builds_outputs_per_version() {
        let root = tempfile::tempdir().unwrap();
        write_version_dir(root.path(), "hello-world", "2021-06-01", false);
        write_version_dir(root.path(), "hello-world", "2021-06-07", false);

        let compiler = Compiler::at(project(""), root.path(), now());
        let compiled = compiler.build_all().unwrap();
        assert_eq!(compiled.len(), 2);

        let out = root.path().join("versions/2021-06-07");
        let yaml = std::fs::read_to_string(out.join("spec.yaml")).unwrap();
        assert!(yaml.starts_with(GENERATED_COMMENT));

        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("spec.json")).unwrap()).unwrap();
        assert!(json["paths"]["/hello-world"]["get"].is_object());
    }

    #[test]
    fn inline_overlay_replaces_servers() {
        let root = tempfile::tempdir().unwrap();
        write_version_dir(root.path(), "hello-world", "2021-06-01", true);

        let overlay = "    overlays:\n      - inline: |\n          servers:\n            - url: https://example.com/api/v3\n";
        let compiler = Compiler::at(project(overlay), root.path(), now());
        let document = compiler
            .resolve("registry", "2021-07-01".parse().unwrap())
            .unwrap();

        assert_eq!(
            document["servers"],
            json!([{"url": "https://example.com/api/v3"}])
        );
    }

    #[test]
    fn include_overlay_is_merged() {
        let root = tempfile::tempdir().unwrap();
        write_version_dir(root.path(), "hello-world", "2021-06-01", false);
        std::fs::write(
            root.path().join("overlay.yaml"),
            "info:\n  title: Public Registry API\n  version: '3.0'\n",
        )
        .unwrap();

        let overlay = "    overlays:\n      - include: overlay.yaml\n";
        let compiler = Compiler::at(project(overlay), root.path(), now());
        let document = compiler
            .resolve("registry", "2021-07-01".parse().unwrap())
            .unwrap();

        assert_eq!(document["info"]["title"], json!("Public Registry API"));
    }

    #[test]
    fn rebuild_clears_stale_version_dirs() {
        let root = tempfile::tempdir().unwrap();
        write_version_dir(root.path(), "hello-world", "2021-06-01", false);

        let stale = root.path().join("versions/2020-01-01");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("spec.json"), "{}").unwrap();

        let compiler = Compiler::at(project(""), root.path(), now());
        compiler.build_all().unwrap();

        assert!(!stale.exists());
        assert!(root.path().join("versions/2021-06-01/spec.yaml").exists());
    }

    #[test]
    fn unknown_api_is_a_config_error() {
        let root = tempfile::tempdir().unwrap();
        let compiler = Compiler::at(project(""), root.path(), now());
        assert!(matches!(
            compiler.resolve("nope", "2021-07-01".parse().unwrap()),
            Err(Error::ConfigMissing { .. })
        ));
    }
}
