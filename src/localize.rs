//! Localization of external `$ref`s.
//!
//! After merging, an aggregate document must be self-contained: every
//! reference into another file is rewritten to an internal
//! `#/components/<kind>/<name>` reference and the referent is copied into
//! that slot. Referents are localized transitively through a work queue
//! keyed by (source URL, fragment); cycles terminate by referencing the
//! already-allocated slot.
//!
//! Component names derive from the last fragment segment, falling back to
//! the referent's file stem. A name already taken by a structurally
//! different definition is a [`Error::Conflict`] naming the JSON pointer.

use std::collections::{HashMap, VecDeque};

use serde_json::{Map, Value};
use url::Url;

use crate::document::{pointer_token, Document, RefResolver};
use crate::error::{Error, Result};
use crate::include_headers::INCLUDE_HEADERS_EXTENSION;
use crate::merge::COMPONENT_KINDS;

/// Keys whose children are schema objects, for kind inference by context.
const SCHEMA_CONTEXT_KEYS: [&str; 8] = [
    "schema",
    "schemas",
    "items",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "additionalProperties",
];

#[derive(Debug, Clone)]
struct Slot {
    kind: &'static str,
    name: String,
}

#[derive(Debug)]
struct QueueItem {
    url: Url,
    slot: Slot,
    value: Value,
}

/// Rewrite every external `$ref` in `doc` into an internal component
/// reference, copying referents under `components/*`.
pub fn localize(doc: &mut Document, resolver: &mut RefResolver) -> Result<()> {
    let root = doc.url().clone();
    let mut localizer = Localizer {
        resolver,
        slots: HashMap::new(),
        queue: VecDeque::new(),
    };

    localizer.rewrite(doc.value_mut(), &root, true, None)?;

    // Localize referent contents transitively. Items discovered while
    // processing are appended to the same queue.
    let mut pending: Vec<QueueItem> = Vec::new();
    while let Some(mut item) = localizer.queue.pop_front() {
        let url = item.url.clone();
        localizer.rewrite(&mut item.value, &url, false, Some(item.slot.kind))?;
        pending.push(item);
    }

    for item in pending {
        insert_component(doc.value_mut(), &item.slot, item.value)?;
    }

    tracing::debug!(
        url = %root,
        components = localizer.slots.len(),
        "Localized external references"
    );
    Ok(())
}

struct Localizer<'a> {
    resolver: &'a mut RefResolver,
    slots: HashMap<(Url, String), Slot>,
    queue: VecDeque<QueueItem>,
}

impl Localizer<'_> {
    /// Walk `node`, rewriting refs. `is_root` marks the owning document,
    /// whose `#/` refs are already internal and stay untouched; inside a
    /// copied referent, `#/` refs point into the referent's own file and
    /// must be localized as well.
    fn rewrite(
        &mut self,
        node: &mut Value,
        base: &Url,
        is_root: bool,
        context: Option<&'static str>,
    ) -> Result<()> {
        match node {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let reference = reference.clone();
                    let internal = reference.starts_with("#/");
                    if !(is_root && internal) {
                        let slot = self.slot_for(base, &reference, context)?;
                        map.insert(
                            "$ref".to_string(),
                            Value::String(format!("#/components/{}/{}", slot.kind, slot.name)),
                        );
                    }
                    return Ok(());
                }
                for (key, child) in map.iter_mut() {
                    if key == INCLUDE_HEADERS_EXTENSION {
                        continue;
                    }
                    let child_context = context_for_key(key).or(context);
                    self.rewrite(child, base, is_root, child_context)?;
                }
            }
            Value::Array(items) => {
                for child in items {
                    self.rewrite(child, base, is_root, context)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Allocate (or reuse) the component slot for a reference target and
    /// enqueue its content for localization on first sight.
    fn slot_for(
        &mut self,
        base: &Url,
        reference: &str,
        context: Option<&'static str>,
    ) -> Result<Slot> {
        let target = self.resolver.resolve(base, reference)?;
        let key = (target.url.clone(), target.fragment.clone());
        if let Some(slot) = self.slots.get(&key) {
            return Ok(slot.clone());
        }

        let kind = infer_kind(&target.fragment, context);
        let name = component_name(&target.url, &target.fragment);
        let slot = Slot { kind, name };
        self.slots.insert(key, slot.clone());
        self.queue.push_back(QueueItem {
            url: target.url,
            slot: slot.clone(),
            value: target.value,
        });
        Ok(slot)
    }
}

/// Component kind for a referent: taken from a `/components/<kind>/` segment
/// in its fragment when present, otherwise from the reference site's
/// context, defaulting to `schemas`.
fn infer_kind(fragment: &str, context: Option<&'static str>) -> &'static str {
    let mut segments = fragment.split('/').peekable();
    while let Some(segment) = segments.next() {
        if segment == "components" {
            if let Some(next) = segments.peek() {
                if let Some(kind) = COMPONENT_KINDS.iter().find(|k| *k == next) {
                    return kind;
                }
            }
        }
    }
    context.unwrap_or("schemas")
}

fn context_for_key(key: &str) -> Option<&'static str> {
    if SCHEMA_CONTEXT_KEYS.contains(&key) || key == "properties" {
        return Some("schemas");
    }
    COMPONENT_KINDS.iter().find(|k| **k == key).copied()
}

/// Derive a component name from the last fragment segment, or the file stem
/// when the reference targets a whole file. Characters outside the OpenAPI
/// component-key alphabet are replaced.
fn component_name(url: &Url, fragment: &str) -> String {
    let raw = fragment
        .rsplit('/')
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            url.path_segments()
                .and_then(|mut s| s.next_back())
                .map(|file| file.split('.').next().unwrap_or(file).to_string())
        })
        .unwrap_or_else(|| "component".to_string());
    sanitize_name(&raw)
}

fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn insert_component(doc: &mut Value, slot: &Slot, value: Value) -> Result<()> {
    let map = doc
        .as_object_mut()
        .ok_or_else(|| Error::internal("document is not an object"))?;
    let components = map
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()));
    let components = components
        .as_object_mut()
        .ok_or_else(|| Error::internal("'components' is not an object"))?;
    let kind_map = components
        .entry(slot.kind)
        .or_insert_with(|| Value::Object(Map::new()));
    let kind_map = kind_map
        .as_object_mut()
        .ok_or_else(|| Error::internal(format!("'components/{}' is not an object", slot.kind)))?;

    match kind_map.get(&slot.name) {
        None => {
            kind_map.insert(slot.name.clone(), value);
            Ok(())
        }
        Some(existing) if *existing == value => Ok(()),
        Some(_) => Err(Error::conflict(
            format!(
                "#/components/{}/{}",
                slot.kind,
                pointer_token(&slot.name)
            ),
            "component name is taken by a structurally different definition".to_string(),
        )),
    }
}

/// Whether any `$ref` in `value` still points outside the document.
/// Used by callers (and tests) to assert localization completeness.
#[must_use]
pub fn has_external_refs(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                if !reference.starts_with("#/") {
                    return true;
                }
            }
            map.iter()
                .filter(|(key, _)| *key != INCLUDE_HEADERS_EXTENSION)
                .any(|(_, child)| has_external_refs(child))
        }
        Value::Array(items) => items.iter().any(has_external_refs),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn spec_with_ref(dir: &Path, reference: &str) -> std::path::PathBuf {
        write(
            dir,
            "spec.yaml",
            &format!(
                "openapi: 3.0.3\ninfo:\n  title: T\n  version: '1'\npaths:\n  /thing:\n    get:\n      responses:\n        '200':\n          description: ok\n          content:\n            application/json:\n              schema:\n                $ref: '{reference}'\n"
            ),
        )
    }

    #[test]
    fn external_schema_ref_is_localized() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common.yaml",
            "components:\n  schemas:\n    Thing:\n      type: object\n      properties:\n        id:\n          type: string\n",
        );
        let spec = spec_with_ref(dir.path(), "common.yaml#/components/schemas/Thing");
        let mut doc = Document::from_file(&spec).unwrap();
        let mut resolver = RefResolver::new();

        localize(&mut doc, &mut resolver).unwrap();

        let schema_ref = &doc.value()["paths"]["/thing"]["get"]["responses"]["200"]["content"]
            ["application/json"]["schema"]["$ref"];
        assert_eq!(schema_ref, &json!("#/components/schemas/Thing"));
        assert_eq!(
            doc.value()["components"]["schemas"]["Thing"]["properties"]["id"],
            json!({"type": "string"})
        );
        assert!(!has_external_refs(doc.value()));
    }

    #[test]
    fn transitive_refs_are_localized() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common.yaml",
            "components:\n  schemas:\n    Outer:\n      type: object\n      properties:\n        inner:\n          $ref: '#/components/schemas/Inner'\n    Inner:\n      type: string\n",
        );
        let spec = spec_with_ref(dir.path(), "common.yaml#/components/schemas/Outer");
        let mut doc = Document::from_file(&spec).unwrap();
        let mut resolver = RefResolver::new();

        localize(&mut doc, &mut resolver).unwrap();

        assert_eq!(
            doc.value()["components"]["schemas"]["Outer"]["properties"]["inner"]["$ref"],
            json!("#/components/schemas/Inner")
        );
        assert_eq!(
            doc.value()["components"]["schemas"]["Inner"],
            json!({"type": "string"})
        );
        assert!(!has_external_refs(doc.value()));
    }

    #[test]
    fn cyclic_refs_reuse_allocated_slots() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common.yaml",
            "components:\n  schemas:\n    Node:\n      type: object\n      properties:\n        next:\n          $ref: '#/components/schemas/Node'\n",
        );
        let spec = spec_with_ref(dir.path(), "common.yaml#/components/schemas/Node");
        let mut doc = Document::from_file(&spec).unwrap();
        let mut resolver = RefResolver::new();

        localize(&mut doc, &mut resolver).unwrap();

        assert_eq!(
            doc.value()["components"]["schemas"]["Node"]["properties"]["next"]["$ref"],
            json!("#/components/schemas/Node")
        );
        assert!(!has_external_refs(doc.value()));
    }

    #[test]
    fn name_collision_with_different_definition_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common.yaml",
            "components:\n  schemas:\n    Thing:\n      type: integer\n",
        );
        let spec = write(
            dir.path(),
            "spec.yaml",
            "openapi: 3.0.3\ninfo:\n  title: T\n  version: '1'\npaths:\n  /thing:\n    get:\n      responses:\n        '200':\n          description: ok\n          content:\n            application/json:\n              schema:\n                $ref: 'common.yaml#/components/schemas/Thing'\ncomponents:\n  schemas:\n    Thing:\n      type: object\n",
        );
        let mut doc = Document::from_file(&spec).unwrap();
        let mut resolver = RefResolver::new();

        let err = localize(&mut doc, &mut resolver).unwrap_err();
        match err {
            Error::Conflict { pointer, .. } => {
                assert_eq!(pointer, "#/components/schemas/Thing");
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn whole_file_ref_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "address.yaml", "type: object\nproperties:\n  street:\n    type: string\n");
        let spec = spec_with_ref(dir.path(), "address.yaml");
        let mut doc = Document::from_file(&spec).unwrap();
        let mut resolver = RefResolver::new();

        localize(&mut doc, &mut resolver).unwrap();

        assert_eq!(
            doc.value()["paths"]["/thing"]["get"]["responses"]["200"]["content"]
                ["application/json"]["schema"]["$ref"],
            json!("#/components/schemas/address")
        );
        assert!(doc.value()["components"]["schemas"]["address"].is_object());
    }

    #[test]
    fn header_refs_land_under_headers() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "headers.yaml",
            "components:\n  headers:\n    RequestId:\n      schema:\n        type: string\n",
        );
        let spec = write(
            dir.path(),
            "spec.yaml",
            "openapi: 3.0.3\ninfo:\n  title: T\n  version: '1'\npaths:\n  /thing:\n    get:\n      responses:\n        '200':\n          description: ok\n          headers:\n            request-id:\n              $ref: 'headers.yaml#/components/headers/RequestId'\n",
        );
        let mut doc = Document::from_file(&spec).unwrap();
        let mut resolver = RefResolver::new();

        localize(&mut doc, &mut resolver).unwrap();

        assert_eq!(
            doc.value()["paths"]["/thing"]["get"]["responses"]["200"]["headers"]["request-id"]
                ["$ref"],
            json!("#/components/headers/RequestId")
        );
        assert!(doc.value()["components"]["headers"]["RequestId"].is_object());
    }
}
