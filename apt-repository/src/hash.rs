//! Cryptographic hashing support for APT repositories.
//!
//! Every digest that ends up in a Packages stanza or a Release manifest is
//! computed with [`MultiHasher`], which feeds the same bytes to MD5, SHA1 and
//! SHA256 in a single pass so the three values can never disagree about the
//! content they describe.

use sha2::Digest;
use std::fmt;

/// Hash algorithms listed in Release files and Packages stanzas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// MD5 hash algorithm.
    Md5,
    /// SHA-1 hash algorithm.
    Sha1,
    /// SHA-256 hash algorithm.
    Sha256,
}

impl HashAlgorithm {
    /// Get the block label used in Release files.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5Sum",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    /// Get the field name used in Packages stanzas.
    pub fn control_field(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5sum",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    /// All algorithms, in the order they appear in a Release file.
    pub fn all() -> &'static [HashAlgorithm] {
        &[HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256]
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Size and hex digests of one byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    /// Number of bytes hashed.
    pub size: u64,
    /// Lowercase hex MD5.
    pub md5: String,
    /// Lowercase hex SHA-1.
    pub sha1: String,
    /// Lowercase hex SHA-256.
    pub sha256: String,
}

impl Digests {
    /// Get the digest for one algorithm.
    pub fn get(&self, algorithm: HashAlgorithm) -> &str {
        match algorithm {
            HashAlgorithm::Md5 => &self.md5,
            HashAlgorithm::Sha1 => &self.sha1,
            HashAlgorithm::Sha256 => &self.sha256,
        }
    }
}

/// A file with its path relative to the distribution root and its digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFile {
    /// The path of the file relative to the distribution root.
    pub path: String,
    /// Size and digests of the file contents.
    pub digests: Digests,
}

impl HashedFile {
    /// Hash `data` and record it under `path`.
    pub fn from_data<S: Into<String>>(path: S, data: &[u8]) -> Self {
        Self {
            path: path.into(),
            digests: hash_data(data),
        }
    }

    /// The size of the file in bytes.
    pub fn size(&self) -> u64 {
        self.digests.size
    }

    /// Get a hash by algorithm.
    pub fn get_hash(&self, algorithm: HashAlgorithm) -> &str {
        self.digests.get(algorithm)
    }
}

/// Computes MD5, SHA1 and SHA256 simultaneously.
pub struct MultiHasher {
    md5: md5::Context,
    sha1: sha1::Sha1,
    sha256: sha2::Sha256,
    size: u64,
}

impl MultiHasher {
    /// Create a new multi-hasher.
    pub fn new() -> Self {
        Self {
            md5: md5::Context::new(),
            sha1: sha1::Sha1::new(),
            sha256: sha2::Sha256::new(),
            size: 0,
        }
    }

    /// Update the hashes with the given data.
    pub fn update(&mut self, data: &[u8]) {
        self.size += data.len() as u64;
        self.md5.consume(data);
        sha1::Digest::update(&mut self.sha1, data);
        self.sha256.update(data);
    }

    /// Finalize the hashes and return the results.
    pub fn finalize(self) -> Digests {
        Digests {
            size: self.size,
            md5: format!("{:x}", self.md5.compute()),
            sha1: hex::encode(sha1::Digest::finalize(self.sha1)),
            sha256: hex::encode(self.sha256.finalize()),
        }
    }

    /// Get the number of bytes seen so far.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Default for MultiHasher {
    fn default() -> Self {
        Self::new()
    }
}


/// Hash a byte slice.
pub fn hash_data(data: &[u8]) -> Digests {
    let mut hasher = MultiHasher::new();
    hasher.update(data);
    hasher.finalize()
}
