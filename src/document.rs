//! OpenAPI document loading and reference resolution.
//!
//! A [`Document`] wraps a parsed OpenAPI 3 tree together with the absolute
//! URL it was loaded from, which serves as the base for resolving relative
//! `$ref` targets. Content is held as an ordered JSON tree so key order
//! survives merging and output.
//!
//! The [`RefResolver`] caches every external file it loads, keyed by
//! absolute URL, so a shared schema file referenced by many resources is
//! read once.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

/// Cooperative cancellation handle checked by [`Document::validate`].
///
/// Cloning shares the underlying flag. All other core operations are
/// short-lived in-process computations and do not observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been canceled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Escape a key for use as a JSON pointer token (RFC 6901).
#[must_use]
pub(crate) fn pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Keys of a path item that hold operations.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// A parsed OpenAPI 3 document plus its source location.
#[derive(Debug, Clone)]
pub struct Document {
    url: Url,
    value: Value,
}

impl Document {
    /// Load a document from a file, detecting YAML vs JSON by content
    /// rather than extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound { path: path.to_path_buf() });
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let abs = std::fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        let url = Url::from_file_path(&abs).map_err(|()| {
            Error::internal(format!("cannot build file URL for {}", abs.display()))
        })?;
        let value = parse_content(&content)
            .map_err(|message| Error::document_parse(path, message))?;
        Ok(Self { url, value })
    }

    /// Construct a document from an already parsed tree.
    #[must_use]
    pub fn new(url: Url, value: Value) -> Self {
        Self { url, value }
    }

    /// The absolute URL this document was loaded from.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The document tree.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Mutable access to the document tree.
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    /// Consume the document, yielding its tree.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// OpenAPI 3 structural validation with full `$ref` traversal.
    ///
    /// Deserializes into the typed OpenAPI 3 model, then walks every
    /// reference in the tree, loading external targets through `resolver`.
    /// The cancellation token is checked once per visited subtree.
    pub fn validate(&self, resolver: &mut RefResolver, cancel: &CancelToken) -> Result<()> {
        let openapi = self
            .value
            .get("openapi")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !openapi.starts_with('3') {
            return Err(Error::Validation {
                url: self.url.to_string(),
                pointer: "/openapi".to_string(),
                message: format!("unsupported OpenAPI version '{openapi}'"),
            });
        }

        let deserializer = self.value.clone();
        if let Err(err) =
            serde_path_to_error::deserialize::<_, openapiv3::OpenAPI>(deserializer)
        {
            let pointer = format!("/{}", err.path().to_string().replace('.', "/"));
            return Err(Error::Validation {
                url: self.url.to_string(),
                pointer,
                message: err.into_inner().to_string(),
            });
        }

        resolver.ensure_loaded(&self.url, &self.value);
        let mut visited = HashSet::new();
        self.walk_refs(resolver, cancel, &self.url, &self.value, &mut visited)
    }

    /// Ensure every `$ref` in the document resolves to a concrete node,
    /// loading external targets as needed. Cycles terminate via the visited
    /// set. This is the dereference pass the merger relies on; the tree
    /// itself is not rewritten (see the localizer for that).
    pub fn resolve_refs_in_place(&self, resolver: &mut RefResolver) -> Result<()> {
        resolver.ensure_loaded(&self.url, &self.value);
        let mut visited = HashSet::new();
        self.walk_refs(resolver, &CancelToken::new(), &self.url, &self.value, &mut visited)
    }

    fn walk_refs(
        &self,
        resolver: &mut RefResolver,
        cancel: &CancelToken,
        base: &Url,
        node: &Value,
        visited: &mut HashSet<(Url, String)>,
    ) -> Result<()> {
        cancel.check()?;
        match node {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let target = resolver.resolve(base, reference)?;
                    let key = (target.url.clone(), target.fragment.clone());
                    if visited.insert(key) {
                        let value = target.value.clone();
                        self.walk_refs(resolver, cancel, &target.url.clone(), &value, visited)?;
                    }
                }
                for (key, child) in map {
                    // the include-headers extension holds a $ref expanded by
                    // a dedicated pass, not a document reference
                    if key == crate::include_headers::INCLUDE_HEADERS_EXTENSION {
                        continue;
                    }
                    self.walk_refs(resolver, cancel, base, child, visited)?;
                }
            }
            Value::Array(items) => {
                for child in items {
                    self.walk_refs(resolver, cancel, base, child, visited)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// A resolved reference target.
#[derive(Debug, Clone)]
pub struct RefTarget {
    /// Absolute URL of the document holding the target.
    pub url: Url,
    /// JSON pointer fragment within that document (may be empty).
    pub fragment: String,
    /// The referenced node.
    pub value: Value,
}

impl RefTarget {
    /// Whether the reference stayed within the document it appeared in.
    #[must_use]
    pub fn is_internal(&self, base: &Url) -> bool {
        self.url == *base
    }
}

/// Loads and caches referenced documents, and resolves `$ref` strings
/// against a base URL.
#[derive(Debug, Default)]
pub struct RefResolver {
    cache: HashMap<Url, Value>,
}

impl RefResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with an already loaded document.
    pub fn ensure_loaded(&mut self, url: &Url, value: &Value) {
        self.cache
            .entry(url.clone())
            .or_insert_with(|| value.clone());
    }

    /// Resolve a `$ref` string against `base`, loading the target file when
    /// it is external. The fragment must be a JSON pointer.
    pub fn resolve(&mut self, base: &Url, reference: &str) -> Result<RefTarget> {
        let (location, fragment) = match reference.split_once('#') {
            Some((loc, frag)) => (loc, frag.to_string()),
            None => (reference, String::new()),
        };

        let url = if location.is_empty() {
            base.clone()
        } else {
            base.join(location).map_err(|e| {
                Error::reference(reference, format!("cannot resolve against '{base}': {e}"))
            })?
        };

        let doc = self.load(&url, reference)?;
        let value = if fragment.is_empty() {
            doc.clone()
        } else {
            doc.pointer(&fragment)
                .cloned()
                .ok_or_else(|| {
                    Error::reference(
                        reference,
                        format!("no node at pointer '{fragment}' in '{url}'"),
                    )
                })?
        };

        Ok(RefTarget { url, fragment, value })
    }

    /// Fully dereference `value`: every `$ref` object is replaced by a deep
    /// copy of its target. Used when inlining nodes whose relative refs
    /// would otherwise dangle after re-parenting.
    pub fn deep_resolve(&mut self, base: &Url, value: &Value) -> Result<Value> {
        let mut in_flight = HashSet::new();
        self.deep_resolve_inner(base, value, &mut in_flight)
    }

    fn deep_resolve_inner(
        &mut self,
        base: &Url,
        value: &Value,
        in_flight: &mut HashSet<(Url, String)>,
    ) -> Result<Value> {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let target = self.resolve(base, reference)?;
                    let key = (target.url.clone(), target.fragment.clone());
                    if !in_flight.insert(key.clone()) {
                        return Err(Error::reference(
                            reference.clone(),
                            "cyclic reference cannot be inlined",
                        ));
                    }
                    let resolved =
                        self.deep_resolve_inner(&target.url.clone(), &target.value.clone(), in_flight)?;
                    in_flight.remove(&key);
                    return Ok(resolved);
                }
                let mut out = serde_json::Map::new();
                for (key, child) in map {
                    out.insert(key.clone(), self.deep_resolve_inner(base, child, in_flight)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    out.push(self.deep_resolve_inner(base, child, in_flight)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn load(&mut self, url: &Url, reference: &str) -> Result<&Value> {
        if !self.cache.contains_key(url) {
            let path = url.to_file_path().map_err(|()| {
                Error::reference(reference, format!("'{url}' is not a local file URL"))
            })?;
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::reference(reference, format!("cannot read '{}': {e}", path.display()))
            })?;
            let value = parse_content(&content)
                .map_err(|message| Error::document_parse(path, message))?;
            self.cache.insert(url.clone(), value);
        }
        Ok(&self.cache[url])
    }
}

/// Parse document content, distinguishing YAML from JSON by content.
fn parse_content(content: &str) -> std::result::Result<Value, String> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))
    } else {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| format!("invalid YAML: {e}"))?;
        serde_json::to_value(yaml).map_err(|e| format!("unsupported YAML structure: {e}"))
    }
}
