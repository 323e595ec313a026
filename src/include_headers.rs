//! Expansion of the `x-snyk-include-headers` response extension.
//!
//! Authors attach a shared set of response headers by reference:
//!
//! ```yaml
//! responses:
//!   '200':
//!     description: ok
//!     x-snyk-include-headers:
//!       $ref: '../../schemas/headers/common.yaml#/components/headers'
//! ```
//!
//! The referent must be a mapping whose keys name headers and whose values
//! are Header objects or Header refs. Each entry is added to the response's
//! `headers` mapping unless a header of that name is already defined
//! explicitly; the extension itself is removed after expansion. Included
//! values are deeply dereferenced so the owning document stays
//! self-contained.

use serde_json::{Map, Value};

use crate::document::{Document, RefResolver, HTTP_METHODS};
use crate::error::{Error, Result};

/// The response-level extension consumed by this pass.
pub const INCLUDE_HEADERS_EXTENSION: &str = "x-snyk-include-headers";

/// Expand `x-snyk-include-headers` on every response of every operation.
pub fn expand(doc: &mut Document, resolver: &mut RefResolver) -> Result<()> {
    let base = doc.url().clone();
    let Some(paths) = doc.value_mut().get_mut("paths").and_then(Value::as_object_mut) else {
        return Ok(());
    };
    for path_item in paths.values_mut() {
        let Some(path_item) = path_item.as_object_mut() else {
            continue;
        };
        for method in HTTP_METHODS {
            let Some(responses) = path_item
                .get_mut(method)
                .and_then(|op| op.get_mut("responses"))
                .and_then(Value::as_object_mut)
            else {
                continue;
            };
            for response in responses.values_mut() {
                expand_response(response, &base, resolver)?;
            }
        }
    }
    Ok(())
}

fn expand_response(response: &mut Value, base: &url::Url, resolver: &mut RefResolver) -> Result<()> {
    let Some(response_map) = response.as_object_mut() else {
        return Ok(());
    };
    let Some(extension) = response_map.remove(INCLUDE_HEADERS_EXTENSION) else {
        return Ok(());
    };

    let reference = extension
        .as_object()
        .and_then(|m| m.get("$ref"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::reference(
                INCLUDE_HEADERS_EXTENSION,
                "extension value must be an object with a $ref",
            )
        })?
        .to_string();

    let target = resolver.resolve(base, &reference)?;
    let included = resolver.deep_resolve(&target.url, &target.value)?;
    let included = as_header_mapping(&reference, included)?;

    let headers = response_map
        .entry("headers")
        .or_insert_with(|| Value::Object(Map::new()));
    let headers = headers
        .as_object_mut()
        .ok_or_else(|| Error::reference(reference.clone(), "response 'headers' is not an object"))?;

    for (name, header) in included {
        // explicit wins
        if !headers.contains_key(&name) {
            headers.insert(name, header);
        }
    }
    Ok(())
}

/// Check that the referent is a mapping of header names to Header objects.
fn as_header_mapping(reference: &str, value: Value) -> Result<Map<String, Value>> {
    let Value::Object(map) = value else {
        return Err(Error::reference(
            reference,
            "referent is neither a Header nor a mapping of Headers",
        ));
    };
    for (name, header) in &map {
        let looks_like_header = header
            .as_object()
            .is_some_and(|h| !h.contains_key("name") && !h.contains_key("in"));
        if !looks_like_header {
            return Err(Error::reference(
                reference,
                format!("entry '{name}' is not a Header object"),
            ));
        }
    }
    Ok(map)
}
