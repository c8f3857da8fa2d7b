//! Options controlling how a package is read and written.

/// Default maximum inflated size of a single part (256 MiB).
///
/// Guards against ZIP bombs and forged size fields in untrusted files.
pub const DEFAULT_MAX_PART_SIZE: u64 = 256 * 1024 * 1024;

/// Compression used for entries written by `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// Deflate, as every Office application writes.
    #[default]
    Deflated,
    /// No compression. Faster, larger files.
    Stored,
}

/// Package-wide options.
///
/// # Example
///
/// ```
/// use longan::opc::options::{CompressionMethod, PackageOptions};
///
/// let options = PackageOptions::default()
///     .with_compression(CompressionMethod::Deflated)
///     .with_compression_level(Some(9))
///     .with_max_part_size(64 * 1024 * 1024);
/// assert_eq!(options.max_part_size, 64 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    /// Compression method for entries written on save.
    pub compression: CompressionMethod,
    /// Deflate level (0-9); `None` uses the codec default.
    pub compression_level: Option<i64>,
    /// Largest inflated entry accepted when reading.
    pub max_part_size: u64,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
            compression_level: None,
            max_part_size: DEFAULT_MAX_PART_SIZE,
        }
    }
}

impl PackageOptions {
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_compression_level(mut self, level: Option<i64>) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_max_part_size(mut self, bytes: u64) -> Self {
        self.max_part_size = bytes;
        self
    }
}
