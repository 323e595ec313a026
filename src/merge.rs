//! Deep merge of one OpenAPI document into another with conflict detection.
//!
//! [`merge`] overlays `source` into a caller-owned `target`:
//!
//! - `paths` merge per (path, method); an existing differing operation is a
//!   conflict unless `replace` is set, in which case the source wins.
//! - `components` merge per kind and name with the same rule.
//! - `servers`, `security` and `tags` arrays are concatenated and
//!   de-duplicated structurally (or overwritten wholesale under `replace`).
//! - Remaining top-level fields (`info`, `externalDocs`, `openapi`) keep the
//!   target's value unless `replace` is set.
//! - `x-*` extensions merge by key with the replace/conflict rule.
//!
//! Structurally equal entries never conflict, which makes a repeated merge
//! of the same source a no-op. Conflict errors name the first differing
//! JSON pointer.

use serde_json::{Map, Value};

use crate::document::pointer_token;
use crate::error::{Error, Result};

/// Component kinds merged by name.
pub const COMPONENT_KINDS: [&str; 9] = [
    "schemas",
    "parameters",
    "responses",
    "headers",
    "requestBodies",
    "securitySchemes",
    "examples",
    "links",
    "callbacks",
];

/// Top-level arrays that concatenate instead of conflicting.
const MERGED_ARRAYS: [&str; 3] = ["servers", "security", "tags"];

/// Top-level fields where the target wins unless `replace` is set.
const KEPT_FIELDS: [&str; 3] = ["openapi", "info", "externalDocs"];

/// Deep-merge `source` into `target`.
///
/// # Errors
///
/// Returns [`Error::Conflict`] naming the first differing JSON pointer when
/// both documents define different values for the same path, component, or
/// extension and `replace` is false.
pub fn merge(target: &mut Value, source: &Value, replace: bool) -> Result<()> {
    let source_map = source
        .as_object()
        .ok_or_else(|| Error::internal("merge source is not an object"))?;
    if !target.is_object() {
        return Err(Error::internal("merge target is not an object"));
    }

    if let Some(paths) = source_map.get("paths") {
        merge_paths(target, paths, replace)?;
    }
    if let Some(components) = source_map.get("components") {
        merge_components(target, components, replace)?;
    }

    let target_map = target.as_object_mut().expect("checked above");
    for (key, value) in source_map {
        match key.as_str() {
            "paths" | "components" => {}
            k if MERGED_ARRAYS.contains(&k) => merge_array(target_map, key, value, replace),
            k if KEPT_FIELDS.contains(&k) => {
                if replace || !target_map.contains_key(key) {
                    target_map.insert(key.clone(), value.clone());
                }
            }
            _ => {
                // extensions and any remaining top-level keys
                merge_keyed(target_map, key, value, replace, "")?;
            }
        }
    }
    Ok(())
}

fn merge_paths(target: &mut Value, source_paths: &Value, replace: bool) -> Result<()> {
    let Some(source_paths) = source_paths.as_object() else {
        return Err(Error::internal("source 'paths' is not an object"));
    };
    let target_map = target.as_object_mut().expect("target is an object");
    let target_paths = target_map
        .entry("paths")
        .or_insert_with(|| Value::Object(Map::new()));
    let target_paths = target_paths
        .as_object_mut()
        .ok_or_else(|| Error::internal("target 'paths' is not an object"))?;

    for (path, source_item) in source_paths {
        let pointer = format!("#/paths/{}", pointer_token(path));
        match target_paths.get_mut(path) {
            None => {
                target_paths.insert(path.clone(), source_item.clone());
            }
            Some(target_item) => {
                let (Some(target_ops), Some(source_ops)) =
                    (target_item.as_object_mut(), source_item.as_object())
                else {
                    return Err(Error::internal(format!(
                        "path item at {pointer} is not an object"
                    )));
                };
                for (method, source_op) in source_ops {
                    match target_ops.get(method) {
                        None => {
                            target_ops.insert(method.clone(), source_op.clone());
                        }
                        Some(target_op) if target_op == source_op => {}
                        Some(_) if replace => {
                            target_ops.insert(method.clone(), source_op.clone());
                        }
                        Some(_) => {
                            return Err(Error::conflict(
                                pointer,
                                format!("operation '{method}' is defined differently"),
                            ));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn merge_components(target: &mut Value, source_components: &Value, replace: bool) -> Result<()> {
    let Some(source_components) = source_components.as_object() else {
        return Err(Error::internal("source 'components' is not an object"));
    };
    let target_map = target.as_object_mut().expect("target is an object");
    let target_components = target_map
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()));
    let target_components = target_components
        .as_object_mut()
        .ok_or_else(|| Error::internal("target 'components' is not an object"))?;

    for (kind, source_kind) in source_components {
        if !COMPONENT_KINDS.contains(&kind.as_str()) {
            // extensions on the components object itself
            merge_keyed(target_components, kind, source_kind, replace, "/components")?;
            continue;
        }
        let Some(source_kind) = source_kind.as_object() else {
            return Err(Error::internal(format!(
                "source 'components/{kind}' is not an object"
            )));
        };
        let target_kind = target_components
            .entry(kind.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        let target_kind = target_kind.as_object_mut().ok_or_else(|| {
            Error::internal(format!("target 'components/{kind}' is not an object"))
        })?;
        for (name, value) in source_kind {
            merge_keyed(target_kind, name, value, replace, &format!("/components/{kind}"))?;
        }
    }
    Ok(())
}

/// Merge a single keyed entry with the replace/conflict rule.
fn merge_keyed(
    target: &mut Map<String, Value>,
    key: &str,
    value: &Value,
    replace: bool,
    parent_pointer: &str,
) -> Result<()> {
    match target.get(key) {
        None => {
            target.insert(key.to_string(), value.clone());
            Ok(())
        }
        Some(existing) if existing == value => Ok(()),
        Some(_) if replace => {
            target.insert(key.to_string(), value.clone());
            Ok(())
        }
        Some(_) => Err(Error::conflict(
            format!("#{parent_pointer}/{}", pointer_token(key)),
            "defined differently in both documents".to_string(),
        )),
    }
}

/// Concatenate and structurally de-duplicate a top-level array, or replace
/// it wholesale.
fn merge_array(target: &mut Map<String, Value>, key: &str, value: &Value, replace: bool) {
    if replace || !target.contains_key(key) {
        target.insert(key.to_string(), value.clone());
        return;
    }
    let Some(Value::Array(target_items)) = target.get_mut(key) else {
        target.insert(key.to_string(), value.clone());
        return;
    };
    if let Value::Array(source_items) = value {
        for item in source_items {
            if !target_items.contains(item) {
                target_items.push(item.clone());
            }
        }
    }
}
