//! Part names within a package.
//!
//! A [`PackURI`] is the normalized, slash-rooted name of a part such as
//! `/xl/worksheets/sheet1.xml`. The ZIP member name is the same string
//! without the leading slash.

use crate::opc::error::{OpcError, Result};
use std::fmt;

/// The package pseudo-partname, used as the source of the root relationships.
pub const PACKAGE_URI: &str = "/";

/// The partname of the content types part.
pub const CONTENT_TYPES_URI: &str = "/[Content_Types].xml";

/// A normalized partname.
///
/// Construction normalizes backslashes to forward slashes, resolves `.` and
/// `..` segments and collapses repeated separators, so two `PackURI`s compare
/// equal exactly when they name the same archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackURI {
    uri: String,
}

impl PackURI {
    /// Create a new PackURI. The URI must begin with a forward slash.
    pub fn new<S: AsRef<str>>(uri: S) -> Result<Self> {
        let raw = uri.as_ref().replace('\\', "/");
        if !raw.starts_with('/') {
            return Err(OpcError::InvalidPackUri(format!(
                "PackURI must begin with slash, got '{}'",
                uri.as_ref()
            )));
        }
        Ok(Self {
            uri: normalize_path(&raw),
        })
    }

    /// Build a PackURI from a ZIP member name (no leading slash).
    pub fn from_member_name(name: &str) -> Result<Self> {
        let name = name.replace('\\', "/");
        Self::new(format!("/{}", name.trim_start_matches('/')))
    }

    /// Resolve a relationship target against the base URI of its source.
    ///
    /// Absolute targets (leading slash) are taken as they are; relative
    /// targets such as `../styles.xml` are joined onto `base_uri`.
    pub fn from_rel_ref(base_uri: &str, relative_ref: &str) -> Result<Self> {
        if relative_ref.starts_with('/') {
            return Self::new(relative_ref);
        }
        let joined = if base_uri.ends_with('/') {
            format!("{}{}", base_uri, relative_ref)
        } else {
            format!("{}/{}", base_uri, relative_ref)
        };
        Self::new(joined)
    }

    /// The package pseudo-partname `/`.
    pub fn package() -> Self {
        Self {
            uri: PACKAGE_URI.to_string(),
        }
    }

    /// The content types partname `/[Content_Types].xml`.
    pub fn content_types() -> Self {
        Self {
            uri: CONTENT_TYPES_URI.to_string(),
        }
    }

    /// Directory portion, e.g. `/xl/worksheets` for `/xl/worksheets/sheet1.xml`.
    pub fn base_uri(&self) -> &str {
        match self.uri.rfind('/') {
            Some(0) | None => "/",
            Some(pos) => &self.uri[..pos],
        }
    }

    /// Filename portion; empty for the package pseudo-partname.
    pub fn filename(&self) -> &str {
        match self.uri.rfind('/') {
            Some(pos) => &self.uri[pos + 1..],
            None => "",
        }
    }

    /// Extension without the leading period, e.g. `xml`.
    pub fn ext(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(pos) => &filename[pos + 1..],
            None => "",
        }
    }

    /// The ZIP member name (URI with the leading slash stripped).
    pub fn membername(&self) -> &str {
        &self.uri[1..]
    }

    pub fn is_package(&self) -> bool {
        self.uri == PACKAGE_URI
    }

    /// True for relationship parts (`*.rels`).
    pub fn is_rels(&self) -> bool {
        self.ext().eq_ignore_ascii_case("rels")
    }

    /// Relative reference from `base_uri` to this partname.
    ///
    /// `/xl/styles.xml` seen from `/xl/worksheets` is `../styles.xml`.
    pub fn relative_ref(&self, base_uri: &str) -> String {
        if base_uri == "/" {
            return self.membername().to_string();
        }

        let from: Vec<&str> = base_uri.split('/').filter(|s| !s.is_empty()).collect();
        let to: Vec<&str> = self.uri.split('/').filter(|s| !s.is_empty()).collect();

        // The filename is never part of the shared prefix.
        let common = from
            .iter()
            .zip(to.iter().take(to.len().saturating_sub(1)))
            .take_while(|(a, b)| a == b)
            .count();

        let mut segments: Vec<&str> = Vec::with_capacity(from.len() - common + to.len() - common);
        segments.extend(std::iter::repeat_n("..", from.len() - common));
        segments.extend(&to[common..]);
        segments.join("/")
    }

    /// The partname of the relationships part belonging to this part.
    ///
    /// `/xl/_rels/workbook.xml.rels` for `/xl/workbook.xml`, and
    /// `/_rels/.rels` for the package itself.
    pub fn rels_uri(&self) -> PackURI {
        let base = self.base_uri();
        let uri = if base == "/" {
            format!("/_rels/{}.rels", self.filename())
        } else {
            format!("{}/_rels/{}.rels", base, self.filename())
        };
        PackURI { uri }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

/// Resolve `.`/`..` segments and collapse empty ones. Input starts with `/`.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            _ => parts.push(segment),
        }
    }

    let mut out = String::with_capacity(path.len());
    for part in &parts {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

impl fmt::Display for PackURI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl AsRef<str> for PackURI {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}
