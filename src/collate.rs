//! Collation of specs published by independent services.
//!
//! Each service provides already-compiled documents as
//! [`ContentRevision`]s, one per version. Collation enumerates every
//! (date, stability) pair drawn from the union of revision dates and the
//! stabilities observed anywhere in the input, resolves each service at
//! that version, and merges the results into one aggregate per version.
//! Conflicts between services at the same path or component are fatal and
//! name both services.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::error::{Error, ErrorCollector, Result};
use crate::merge::merge;
use crate::version::{resolve, sort_dedup, Version};

/// A document revision published by a service at one version.
#[derive(Debug, Clone)]
pub struct ContentRevision {
    /// The version this revision was published at.
    pub version: Version,
    /// Raw document contents (YAML or JSON).
    pub contents: String,
}

impl ContentRevision {
    /// Create a revision from its version and raw contents.
    #[must_use]
    pub fn new(version: Version, contents: impl Into<String>) -> Self {
        Self { version, contents: contents.into() }
    }
}

/// Result of a collation: the effective version set and one aggregate
/// document per version.
#[derive(Debug)]
pub struct Collated {
    /// Sorted effective versions.
    pub versions: Vec<Version>,
    /// Aggregate document per version.
    pub documents: BTreeMap<Version, Value>,
}

/// Accumulates per-service revisions and merges them per version.
#[derive(Debug, Default)]
pub struct Collator {
    revisions: BTreeMap<String, Vec<ContentRevision>>,
}

impl Collator {
    /// Create an empty collator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service's revision.
    pub fn add(&mut self, service: impl Into<String>, revision: ContentRevision) {
        self.revisions.entry(service.into()).or_default().push(revision);
    }

    /// Collate all added revisions.
    ///
    /// Parse failures and cross-service conflicts are accumulated and
    /// reported together; nothing is returned if any occurred.
    pub fn collate(&self) -> Result<Collated> {
        let mut errors = ErrorCollector::new();

        // parse every revision up front; a bad revision fails its service
        // but collation of the rest proceeds far enough to report all errors
        let mut parsed: BTreeMap<&str, Vec<(Version, Value)>> = BTreeMap::new();
        for (service, revisions) in &self.revisions {
            let mut docs: Vec<(Version, Value)> = Vec::new();
            for revision in revisions {
                match parse_revision(revision) {
                    Ok(value) => docs.push((revision.version, value)),
                    Err(err) => {
                        tracing::warn!(
                            service = %service,
                            version = %revision.version,
                            error = %err,
                            "Failed to parse service revision"
                        );
                        errors.add(err);
                    }
                }
            }
            docs.sort_by_key(|(version, _)| *version);
            parsed.insert(service.as_str(), docs);
        }
        if !errors.is_empty() {
            return Err(errors.into_result().unwrap_err());
        }

        let candidates = candidate_versions(&parsed);
        let mut collated = Collated {
            versions: Vec::new(),
            documents: BTreeMap::new(),
        };

        for version in candidates {
            let mut aggregate: Option<Value> = None;
            let mut merged_services: Vec<(&str, &Value)> = Vec::new();

            for (service, docs) in &parsed {
                let versions: Vec<Version> = docs.iter().map(|(v, _)| *v).collect();
                let Ok(effective) = resolve(&versions, version) else {
                    continue;
                };
                let (_, value) = docs
                    .iter()
                    .find(|(v, _)| *v == effective)
                    .expect("resolved version is present");

                let target = aggregate.get_or_insert_with(|| json!({"paths": {}}));
                match merge(target, value, false) {
                    Ok(()) => merged_services.push((*service, value)),
                    Err(err) => {
                        errors.add(attribute_conflict(err, service, &merged_services));
                    }
                }

            }

            if let Some(document) = aggregate {
                collated.versions.push(version);
                collated.documents.insert(version, document);
            }
        }

        errors.into_result()?;
        sort_dedup(&mut collated.versions);
        tracing::info!(
            services = self.revisions.len(),
            versions = collated.versions.len(),
            "Collation complete"
        );
        Ok(collated)
    }
}

fn parse_revision(revision: &ContentRevision) -> Result<Value> {
    let trimmed = revision.contents.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(&revision.contents).map_err(|e| {
            Error::document_parse(revision.version.to_string(), format!("invalid JSON: {e}"))
        })
    } else {
        let yaml: serde_yaml::Value = serde_yaml::from_str(&revision.contents).map_err(|e| {
            Error::document_parse(revision.version.to_string(), format!("invalid YAML: {e}"))
        })?;
        serde_json::to_value(yaml).map_err(|e| {
            Error::document_parse(
                revision.version.to_string(),
                format!("unsupported YAML structure: {e}"),
            )
        })
    }
}

/// Every (date, stability) pair worth publishing: the union of revision
/// dates crossed with the stabilities observed anywhere, restricted to
/// pairs at which at least one service resolves.
fn candidate_versions(parsed: &BTreeMap<&str, Vec<(Version, Value)>>) -> Vec<Version> {
    let mut dates = Vec::new();
    let mut stabilities = Vec::new();
    for docs in parsed.values() {
        for (version, _) in docs {
            if !dates.contains(&version.date) {
                dates.push(version.date);
            }
            if !stabilities.contains(&version.stability) {
                stabilities.push(version.stability);
            }
        }
    }
    dates.sort_unstable();
    stabilities.sort_unstable();

    let mut candidates = Vec::new();
    for date in &dates {
        for stability in &stabilities {
            let candidate = Version::new(*date, *stability);
            let resolvable = parsed.values().any(|docs| {
                let versions: Vec<Version> = docs.iter().map(|(v, _)| *v).collect();
                resolve(&versions, candidate).is_ok()
            });
            if resolvable {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

/// Rewrite a merge conflict to name both contributing services.
fn attribute_conflict(err: Error, current: &str, merged: &[(&str, &Value)]) -> Error {
    let Error::Conflict { pointer, message } = err else {
        return err;
    };
    let fragment = pointer.trim_start_matches('#').to_string();
    let other = merged
        .iter()
        .find(|(_, value)| value.pointer(&fragment).is_some())
        .map_or_else(|| "a previously merged service".to_string(), |(name, _)| {
            format!("service '{name}'")
        });
    Error::conflict(
        pointer,
        format!("between service '{current}' and {other}: {message}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn spec_with_path(path: &str, op_id: &str) -> String {
        format!(
            "openapi: 3.0.3\ninfo:\n  title: Service\n  version: '3.0'\npaths:\n  {path}:\n    get:\n      operationId: {op_id}\n      responses:\n        '200':\n          description: ok\n"
        )
    }

    fn two_services() -> Collator {
        let mut collator = Collator::new();
        collator.add(
            "service-a",
            ContentRevision::new(v("2022-02-01~beta"), spec_with_path("/test", "test")),
        );
        collator.add(
            "service-b",
            ContentRevision::new(v("2022-04-01"), spec_with_path("/example", "example")),
        );
        collator
    }

    #[test]
    fn version_set_spans_dates_and_observed_stabilities() {
        let collated = two_services().collate().unwrap();
        assert_eq!(
            collated.versions,
            vec![v("2022-02-01~beta"), v("2022-04-01~beta"), v("2022-04-01")]
        );
    }

    #[test]
    fn aggregates_follow_the_stability_ladder() {
        let collated = two_services().collate().unwrap();

        let early_beta = &collated.documents[&v("2022-02-01~beta")];
        assert!(early_beta["paths"]["/test"].is_object());
        assert!(early_beta["paths"].get("/example").is_none());

        // at 2022-04-01, a beta consumer sees both services
        let later_beta = &collated.documents[&v("2022-04-01~beta")];
        assert!(later_beta["paths"]["/test"].is_object());
        assert!(later_beta["paths"]["/example"].is_object());

        let ga = &collated.documents[&v("2022-04-01")];
        assert!(ga["paths"]["/example"].is_object());
    }

    #[test]
    fn conflicting_services_are_both_named() {
        let mut collator = Collator::new();
        collator.add(
            "service-a",
            ContentRevision::new(v("2022-02-01"), spec_with_path("/shared", "aView")),
        );
        collator.add(
            "service-b",
            ContentRevision::new(v("2022-02-01"), spec_with_path("/shared", "bView")),
        );

        let err = collator.collate().unwrap_err();
        let rendered = format!("{err}");
        let conflict = match err {
            Error::Conflict { .. } => err,
            Error::Multiple { errors, .. } => errors
                .into_iter()
                .find(|e| matches!(e, Error::Conflict { .. }))
                .unwrap_or_else(|| panic!("no conflict among: {rendered}")),
            other => panic!("expected Conflict, got {other:?}"),
        };
        match conflict {
            Error::Conflict { pointer, message } => {
                assert_eq!(pointer, "#/paths/~1shared");
                assert!(message.contains("service-a"), "message: {message}");
                assert!(message.contains("service-b"), "message: {message}");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn unparseable_revision_fails_collation() {
        let mut collator = Collator::new();
        collator.add(
            "service-a",
            ContentRevision::new(v("2022-02-01"), "{not json"),
        );
        assert!(collator.collate().is_err());
    }

    #[test]
    fn empty_collator_yields_no_versions() {
        let collated = Collator::new().collate().unwrap();
        assert!(collated.versions.is_empty());
        assert!(collated.documents.is_empty());
    }
}
