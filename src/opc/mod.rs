//! Open Packaging Conventions (OPC) layer.
//!
//! A package is a ZIP archive of XML parts tied together by relationship
//! tables and described by a content-type registry. This module provides the
//! building blocks the spreadsheet document is assembled from:
//!
//! - [`archive`]: the ZIP container behind the [`Archive`] trait
//! - [`packuri`]: normalized partnames
//! - [`part`] and [`store`]: lazily parsed parts behind shared handles
//! - [`rel`]: relationship tables with monotonic `rId` allocation
//! - [`content_types`]: the `[Content_Types].xml` registry

pub mod archive;
pub mod constants;
pub mod content_types;
pub mod error;
pub mod options;
pub mod packuri;
pub mod part;
pub mod rel;
pub mod store;

pub use archive::{Archive, ArchiveError, ZipArchiveStore};
pub use content_types::ContentTypeRegistry;
pub use error::{OpcError, Result};
pub use options::{CompressionMethod, PackageOptions};
pub use packuri::PackURI;
pub use part::{XmlPart, XmlPartRef};
pub use rel::{Relationship, RelationshipSet, TargetMode};
pub use store::PartStore;
