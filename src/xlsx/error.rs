//! Error types for spreadsheet document operations.
use crate::common::xml::XmlError;
use crate::opc::error::OpcError;
use thiserror::Error;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, XlsxError>;

/// Errors raised by [`Document`](crate::xlsx::Document) and its commands.
#[derive(Error, Debug)]
pub enum XlsxError {
    /// Package layer error
    #[error("OPC error: {0}")]
    Opc(#[from] OpcError),

    /// The file is not a readable container.
    #[error("Not a valid spreadsheet archive: {0}")]
    ArchiveCorrupt(String),

    /// The package is missing mandatory parts or its bookkeeping is
    /// inconsistent.
    #[error("Package integrity error: {0}")]
    PackageIntegrity(String),

    /// The operation is not allowed in the document's current state.
    #[error("Cannot {operation} while the document is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Writing the archive to its destination failed. The destination is
    /// left untouched.
    #[error("Failed to write {path}: {source}")]
    IoWrite {
        path: String,
        #[source]
        source: OpcError,
    },

    #[error("A sheet named '{0}' already exists")]
    SheetNameCollision(String),

    #[error("Invalid sheet name '{name}': {reason}")]
    InvalidSheetName { name: String, reason: &'static str },

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Cannot delete '{0}': a workbook must keep at least one sheet")]
    LastSheet(String),

    /// No built-in template exists for the requested content type.
    #[error("No template for content type: {0}")]
    NoTemplate(String),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),
}
