//! Error types for OPC package operations.
use crate::common::xml::XmlError;
use crate::opc::archive::ArchiveError;
use thiserror::Error;

/// Errors raised by the package layer (archive, parts, relationships,
/// content types).
#[derive(Error, Debug)]
pub enum OpcError {
    /// The underlying container could not be read or written.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A part's bytes are not well-formed XML.
    #[error("Malformed XML in part {partname}: {source}")]
    MalformedXml {
        partname: String,
        #[source]
        source: XmlError,
    },

    #[error("Part already exists: {0}")]
    DuplicatePart(String),

    #[error("Part not found: {0}")]
    PartNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    #[error("Content type not found for partname: {0}")]
    UnknownContentType(String),

    #[error("Invalid pack URI: {0}")]
    InvalidPackUri(String),
}

pub type Result<T> = std::result::Result<T, OpcError>;
