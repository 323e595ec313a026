//! # Vervet
//!
//! A versioned OpenAPI management toolkit.
//!
//! Vervet aggregates a repository of individually authored OpenAPI 3
//! "resource" documents, each pinned to a calendar date and a stability
//! level (`wip`, `experimental`, `beta`, `ga`), into the effective API
//! document for any requested version.
//!
//! ## Features
//!
//! - **Version algebra**: parse, compare, and resolve (date, stability)
//!   versions, with deprecation and sunset lifecycles
//! - **Resource loading**: discover dated version directories, validate
//!   each snapshot, and stamp operations with their effective version
//! - **Spec merging**: overlay resources, shared includes, and inline
//!   fragments into one document with conflict detection
//! - **Reference localization**: rewrite external `$ref`s so aggregates
//!   are self-contained
//! - **Collation**: merge specs published by independent services, keyed
//!   by version
//!
//! ## Example
//!
//! ```rust,no_run
//! use vervet::{SpecVersions, Version};
//!
//! fn main() -> anyhow::Result<()> {
//!     let specs = SpecVersions::load("./resources")?;
//!     let query: Version = "2021-07-01~beta".parse()?;
//!     let document = specs.at(query)?;
//!     println!("{}", serde_json::to_string_pretty(&document)?);
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod cli;
pub mod collate;
pub mod compiler;
pub mod config;
pub mod document;
pub mod error;
pub mod include_headers;
pub mod localize;
pub mod merge;
pub mod resource;
pub mod spec;
pub mod version;

// Re-export commonly used types at crate root
pub use collate::{Collated, Collator, ContentRevision};
pub use compiler::Compiler;
pub use config::Project;
pub use document::{CancelToken, Document, RefResolver};
pub use error::{Error, Result};
pub use resource::{ExcludeFilter, Resource, ResourceVersions};
pub use spec::SpecVersions;
pub use version::{Lifecycle, Stability, Version};
