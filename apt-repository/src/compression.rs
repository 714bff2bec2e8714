//! Compression support for APT index files.

use crate::Result;
use std::io::{Read, Write};

/// Compression formats written next to a plain index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression.
    None,
    /// Gzip compression.
    Gzip,
}

impl Compression {
    /// Get the file extension for this compression format.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
        }
    }

    /// Compress data using this compression format.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut compressed = Vec::new();
                let mut encoder =
                    flate2::write::GzEncoder::new(&mut compressed, flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?;
                Ok(compressed)
            }
        }
    }

    /// Decompress data using this compression format.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut decompressed = Vec::new();
                flate2::read::GzDecoder::new(data).read_to_end(&mut decompressed)?;
                Ok(decompressed)
            }
        }
    }

    /// Formats every Packages index is published in.
    pub fn all() -> &'static [Compression] {
        &[Compression::None, Compression::Gzip]
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}
