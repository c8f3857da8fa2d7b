//! Commands and queries accepted by a [`Document`](crate::xlsx::Document).
//!
//! Both sets are closed: every variant carries exactly the data its handler
//! needs, and dispatch is an exhaustive `match`.

use crate::opc::packuri::PackURI;
use crate::xlsx::properties::Property;

/// Which relationship table a new part is linked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOwner {
    /// `_rels/.rels`
    Package,
    /// The workbook part's `.rels`
    Workbook,
}

/// A mutation of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append a new, empty worksheet.
    AddWorksheet { name: String },
    /// Delete a worksheet and everything that only it referenced.
    DeleteWorksheet { name: String },
    RenameWorksheet { old_name: String, new_name: String },
    /// Copy a worksheet's part under a new name, placed after the source.
    CloneWorksheet { source: String, name: String },
    /// Move a worksheet to a zero-based position.
    MoveWorksheet { name: String, index: usize },
    /// Add an arbitrary XML part, register its content type and link it.
    AddPart {
        partname: PackURI,
        content_type: String,
        relationship_type: String,
        owner: PartOwner,
        content: Vec<u8>,
    },
    /// Delete a part, its relationships and its content-type override.
    DeletePart { partname: PackURI },
}

impl Command {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddWorksheet { .. } => "AddWorksheet",
            Command::DeleteWorksheet { .. } => "DeleteWorksheet",
            Command::RenameWorksheet { .. } => "RenameWorksheet",
            Command::CloneWorksheet { .. } => "CloneWorksheet",
            Command::MoveWorksheet { .. } => "MoveWorksheet",
            Command::AddPart { .. } => "AddPart",
            Command::DeletePart { .. } => "DeletePart",
        }
    }
}

/// A read-only question about the document. Answers are strings: booleans
/// as `"true"`/`"false"`, numbers in decimal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    SheetExists { name: String },
    SheetCount,
    /// Zero-based position of a sheet.
    SheetIndex { name: String },
    /// Partname of a sheet's part.
    SheetPath { name: String },
    SheetId { name: String },
    ContentType { partname: PackURI },
    PartExists { partname: PackURI },
    /// Target of a relationship in the given table, as stored.
    RelationshipTarget { owner: PartOwner, id: String },
    Property { property: Property },
}

/// Encode a boolean answer.
#[inline]
pub fn bool_answer(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Encode a numeric answer.
#[inline]
pub fn number_answer<N: itoa::Integer>(value: N) -> String {
    itoa::Buffer::new().format(value).to_string()
}
