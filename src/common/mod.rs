//! Utilities shared by the package and spreadsheet layers.

pub mod xml;
