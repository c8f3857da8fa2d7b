//! Spreadsheet (`.xlsx`) documents.
//!
//! [`Document`] ties the package layer together: it opens or creates the
//! archive, keeps the root and workbook relationship tables and the content
//! types in step with the parts, and answers [`Command`]s and [`Query`]s.
//! Object-model code reaches the package through the [`PackageAccess`] trait.

pub mod command;
pub mod document;
pub mod error;
pub mod properties;
pub mod templates;
pub mod workbook;

#[cfg(test)]
mod tests;

pub use command::{Command, PartOwner, Query};
pub use document::{Document, DocumentState, PackageAccess};
pub use error::{Result, XlsxError};
pub use properties::{Property, PropertyPart};
pub use workbook::{SheetEntry, SheetState, Workbook};
