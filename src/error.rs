//! Error types for Vervet.
//!
//! This module defines the crate-wide error hierarchy using `thiserror`.
//! All errors are values surfaced to the caller and can be propagated with
//! the `?` operator; nothing is retried or recovered silently.
//!
//! # Error Categories
//!
//! - **Parse errors**: malformed version strings or documents
//! - **Validation errors**: OpenAPI 3 structural violations
//! - **Conflict errors**: incompatible merges or component name collisions
//! - **Resolution errors**: no version matches a query, unresolvable `$ref`
//! - **IO errors**: file system operations
//! - **Config errors**: invalid project configuration
//!
//! # Example
//!
//! ```rust
//! use vervet::error::{Error, Result};
//!
//! fn read_spec(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).map_err(|e| Error::Io {
//!         path: path.into(),
//!         source: e,
//!     })
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// A specialized Result type for Vervet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Vervet.
///
/// This enum covers all failure conditions that can occur while loading,
/// validating, merging, localizing, resolving, and compiling specs.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File not found.
    #[error("File not found: {}", .path.display())]
    FileNotFound {
        /// The missing file path
        path: PathBuf,
    },

    /// Directory not found.
    #[error("Directory not found: {}", .path.display())]
    DirectoryNotFound {
        /// The missing directory path
        path: PathBuf,
    },

    // =========================================================================
    // Version Errors
    // =========================================================================
    /// Version string parsing error.
    #[error("Failed to parse version '{version}': {message}")]
    VersionParse {
        /// The version string that failed to parse
        version: String,
        /// Human-readable reason
        message: String,
    },

    /// No version in the available set satisfies the query.
    #[error("No matching version")]
    NoMatchingVersion,

    // =========================================================================
    // Document Errors
    // =========================================================================
    /// Document parsing error (YAML or JSON).
    #[error("Failed to parse document '{}': {message}", .file.display())]
    DocumentParse {
        /// The file being parsed
        file: PathBuf,
        /// Error message
        message: String,
    },

    /// OpenAPI 3 structural validation error.
    #[error("Invalid OpenAPI document '{url}' at {pointer}: {message}")]
    Validation {
        /// Source URL of the offending document
        url: String,
        /// JSON pointer to the failing node
        pointer: String,
        /// Description of the violation
        message: String,
    },

    /// Unresolvable or cyclic reference.
    #[error("Failed to resolve reference '{reference}': {message}")]
    Ref {
        /// The `$ref` value that failed
        reference: String,
        /// Error message
        message: String,
    },

    /// Validation was canceled by the caller.
    #[error("Operation canceled")]
    Canceled,

    // =========================================================================
    // Merge and Localization Errors
    // =========================================================================
    /// Incompatible merge or component name collision.
    #[error("Conflict at {pointer}: {message}")]
    Conflict {
        /// JSON pointer to the first differing node
        pointer: String,
        /// Description naming the contributing sources
        message: String,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {key}")]
    ConfigMissing {
        /// The missing configuration key
        key: String,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Internal error (should not happen in normal operation).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },

    /// Multiple errors occurred.
    #[error("Multiple errors occurred ({count} total)")]
    Multiple {
        /// Number of errors
        count: usize,
        /// The individual errors
        errors: Vec<Error>,
    },
}

impl Error {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Creates a `VersionParse` error.
    #[must_use]
    pub fn version_parse(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VersionParse { version: version.into(), message: message.into() }
    }

    /// Creates a `DocumentParse` error.
    #[must_use]
    pub fn document_parse(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DocumentParse { file: file.into(), message: message.into() }
    }

    /// Creates a `Conflict` error.
    #[must_use]
    pub fn conflict(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict { pointer: pointer.into(), message: message.into() }
    }

    /// Creates a `Ref` error.
    #[must_use]
    pub fn reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ref { reference: reference.into(), message: message.into() }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns true when this is the `NoMatchingVersion` sentinel, so callers
    /// can iterate stability ladders without string matching.
    #[must_use]
    pub fn is_no_matching_version(&self) -> bool {
        matches!(self, Self::NoMatchingVersion)
    }

    /// Determines if the error is recoverable (e.g., loading should continue
    /// with the remaining resources).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VersionParse { .. }
                | Self::DocumentParse { .. }
                | Self::Validation { .. }
                | Self::Ref { .. }
                | Self::NoMatchingVersion
        )
    }

    /// Returns the appropriate process exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::FileNotFound { .. } => 14,
            Self::DirectoryNotFound { .. } => 15,
            Self::VersionParse { .. } => 16,
            Self::NoMatchingVersion => 17,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::ConfigMissing { .. } => 20,
            Self::Multiple { .. } => 21,
            Self::Conflict { .. } => 22,
            Self::Validation { .. } => 23,
            _ => 1,
        }
    }

    /// Consolidates multiple errors into a single `Error::Multiple` if there
    /// is more than one. Otherwise returns the single error or `Ok(())`.
    pub fn collect(errors: Vec<Self>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.into_iter().next().unwrap())
        } else {
            Err(Self::Multiple {
                count: errors.len(),
                errors,
            })
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        // Used when a PathBuf is not readily available; where a path is known,
        // prefer Error::io(path, source)
        Self::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization/deserialization error: {source}"),
        }
    }
}

/// A utility for collecting multiple errors during loading or collation.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<Error>,
}

impl ErrorCollector {
    /// Create a new error collector.
    #[must_use]
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error to the collection.
    pub fn add(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Get the number of collected errors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    /// Check if there are any errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert to a Result, returning a `Multiple` error if there are any.
    pub fn into_result(self) -> Result<()> {
        Error::collect(self.errors)
    }
}
