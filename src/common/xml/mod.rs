//! XML support: a mutable element tree used for every package part.

pub mod dom;

pub use dom::{XmlDeclaration, XmlDocument, XmlElement, XmlError, XmlNode};
