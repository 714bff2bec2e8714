//! # APT Repository Library
//!
//! Formats and primitives for maintaining a Debian-style package repository:
//! control stanzas and Packages indices, Release manifests with MD5, SHA1 and
//! SHA256 digest blocks, gzip encoding of index files, and reading the control
//! data out of binary package archives.
//!
//! Nothing in this crate performs I/O against a repository tree; callers hand
//! in bytes and get bytes or typed documents back.
//!
//! ## Example
//!
//! ```rust
//! use apt_repository::{HashedFile, ReleaseBuilder};
//!
//! let release = ReleaseBuilder::new()
//!     .origin("Example Origin")
//!     .label("Example Repository")
//!     .suite("stable")
//!     .codename("stable")
//!     .architectures(["amd64", "i386"])
//!     .components(vec!["main".to_string()])
//!     .add_file(HashedFile::from_data("main/binary-amd64/Packages", b""))
//!     .build();
//!
//! assert!(release.render().starts_with("Origin: Example Origin\n"));
//! ```

pub mod compression;
pub mod deb;
pub mod error;
pub mod hash;
pub mod packages;
pub mod release;

pub use compression::Compression;
pub use deb::{read_binary_control, BinaryControl};
pub use error::{AptRepositoryError, Result};
pub use hash::{hash_data, Digests, HashAlgorithm, HashedFile, MultiHasher};
pub use packages::{ControlStanza, STANZA_SEPARATOR};
pub use release::{DigestEntry, Release, ReleaseBuilder};
