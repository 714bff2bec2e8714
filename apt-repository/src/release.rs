//! Release file generation for APT repositories.

use crate::hash::{Digests, HashAlgorithm, HashedFile};
use crate::{AptRepositoryError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

/// Date format used in the `Date` field (RFC 1123, always UTC).
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// One line of a hash block in a Release file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    /// Hex digest.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Path relative to the distribution root.
    pub path: String,
}

/// The top-level manifest of a distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Origin of the repository.
    pub origin: String,
    /// Label for the repository.
    pub label: String,
    /// Suite name.
    pub suite: String,
    /// Codename.
    pub codename: String,
    /// Date of the release.
    pub date: DateTime<Utc>,
    /// Architectures with a Packages index, sorted and deduplicated.
    pub architectures: Vec<String>,
    /// Repository components.
    pub components: Vec<String>,
    /// Description.
    pub description: String,
    /// Index files in discovery order.
    pub files: Vec<HashedFile>,
}

impl Release {
    /// Create an empty Release dated now.
    pub fn new() -> Self {
        Self {
            origin: String::new(),
            label: String::new(),
            suite: String::new(),
            codename: String::new(),
            date: Utc::now(),
            architectures: Vec::new(),
            components: Vec::new(),
            description: String::new(),
            files: Vec::new(),
        }
    }

    /// Add a file to the release.
    pub fn add_file(&mut self, file: HashedFile) {
        self.files.push(file);
    }

    /// The hash block for one algorithm, in file order.
    pub fn digest_list(&self, algorithm: HashAlgorithm) -> Vec<DigestEntry> {
        self.files
            .iter()
            .map(|file| DigestEntry {
                hash: file.get_hash(algorithm).to_string(),
                size: file.size(),
                path: file.path.clone(),
            })
            .collect()
    }

    /// Render the Release file.
    ///
    /// Field order is fixed; every field is emitted even when empty, and each
    /// hash line is indented by exactly one space.
    pub fn render(&self) -> String {
        let mut content = String::new();

        content.push_str(&format!("Origin: {}\n", self.origin));
        content.push_str(&format!("Label: {}\n", self.label));
        content.push_str(&format!("Suite: {}\n", self.suite));
        content.push_str(&format!("Codename: {}\n", self.codename));
        content.push_str(&format!("Date: {}\n", self.date.format(DATE_FORMAT)));
        content.push_str(&format!(
            "Architectures: {}\n",
            self.architectures.join(" ")
        ));
        content.push_str(&format!("Components: {}\n", self.components.join(" ")));
        content.push_str(&format!("Description: {}\n", self.description));

        for algorithm in HashAlgorithm::all() {
            content.push_str(&format!("{}:\n", algorithm.as_str()));
            for entry in self.digest_list(*algorithm) {
                content.push_str(&format!(" {} {} {}\n", entry.hash, entry.size, entry.path));
            }
        }

        content
    }

    /// Parse a Release file produced by [`Release::render`].
    pub fn parse(content: &str) -> Result<Self> {
        let mut release = Release::new();
        let mut date = None;
        let mut blocks: Vec<(HashAlgorithm, Vec<DigestEntry>)> = Vec::new();

        for line in content.lines() {
            if let Some(entry) = line.strip_prefix(' ') {
                let (_, current) = blocks.last_mut().ok_or_else(|| {
                    AptRepositoryError::InvalidRelease(format!("stray hash line: {:?}", line))
                })?;
                current.push(parse_digest_line(entry)?);
                continue;
            }
            if line.is_empty() {
                continue;
            }

            let (field, value) = line.split_once(':').ok_or_else(|| {
                AptRepositoryError::InvalidRelease(format!("invalid line format: {:?}", line))
            })?;
            let value = value.trim();

            if let Some(algorithm) = HashAlgorithm::all()
                .iter()
                .find(|a| a.as_str().eq_ignore_ascii_case(field))
            {
                blocks.push((*algorithm, Vec::new()));
                continue;
            }

            match field.to_ascii_lowercase().as_str() {
                "origin" => release.origin = value.to_string(),
                "label" => release.label = value.to_string(),
                "suite" => release.suite = value.to_string(),
                "codename" => release.codename = value.to_string(),
                "date" => {
                    let parsed = NaiveDateTime::parse_from_str(value, DATE_FORMAT)
                        .map_err(|_| AptRepositoryError::invalid_field("Date", value))?;
                    date = Some(parsed.and_utc());
                }
                "architectures" => {
                    release.architectures =
                        value.split_whitespace().map(str::to_string).collect()
                }
                "components" => {
                    release.components = value.split_whitespace().map(str::to_string).collect()
                }
                "description" => release.description = value.to_string(),
                _ => {}
            }
        }

        release.date = date.ok_or_else(|| AptRepositoryError::missing_field("Date"))?;
        release.files = merge_blocks(blocks)?;
        Ok(release)
    }
}

fn parse_digest_line(line: &str) -> Result<DigestEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(AptRepositoryError::InvalidRelease(format!(
            "invalid file list line: {:?}",
            line
        )));
    }
    let size = parts[1]
        .parse::<u64>()
        .map_err(|_| AptRepositoryError::invalid_field("size", parts[1]))?;
    Ok(DigestEntry {
        hash: parts[0].to_string(),
        size,
        path: parts[2].to_string(),
    })
}

/// Rebuild per-file records from the three hash blocks.
fn merge_blocks(blocks: Vec<(HashAlgorithm, Vec<DigestEntry>)>) -> Result<Vec<HashedFile>> {
    let mut files: Vec<HashedFile> = Vec::new();

    for (algorithm, entries) in blocks {
        for entry in entries {
            let index = match files.iter().position(|f| f.path == entry.path) {
                Some(index) => index,
                None => {
                    files.push(HashedFile {
                        path: entry.path.clone(),
                        digests: Digests {
                            size: entry.size,
                            md5: String::new(),
                            sha1: String::new(),
                            sha256: String::new(),
                        },
                    });
                    files.len() - 1
                }
            };
            let file = &mut files[index];
            if file.digests.size != entry.size {
                return Err(AptRepositoryError::InvalidRelease(format!(
                    "size mismatch for {}",
                    entry.path
                )));
            }
            match algorithm {
                HashAlgorithm::Md5 => file.digests.md5 = entry.hash,
                HashAlgorithm::Sha1 => file.digests.sha1 = entry.hash,
                HashAlgorithm::Sha256 => file.digests.sha256 = entry.hash,
            }
        }
    }

    Ok(files)
}

impl Default for Release {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Builder for creating Release files.
#[derive(Debug, Clone)]
pub struct ReleaseBuilder {
    release: Release,
    architectures: BTreeSet<String>,
}

impl ReleaseBuilder {
    /// Create a new Release builder.
    pub fn new() -> Self {
        Self {
            release: Release::new(),
            architectures: BTreeSet::new(),
        }
    }

    /// Set the origin.
    pub fn origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.release.origin = origin.into();
        self
    }

    /// Set the label.
    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.release.label = label.into();
        self
    }

    /// Set the suite.
    pub fn suite<S: Into<String>>(mut self, suite: S) -> Self {
        self.release.suite = suite.into();
        self
    }

    /// Set the codename.
    pub fn codename<S: Into<String>>(mut self, codename: S) -> Self {
        self.release.codename = codename.into();
        self
    }

    /// Set the date.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.release.date = date;
        self
    }

    /// Add an architecture; duplicates are ignored.
    pub fn architecture<S: Into<String>>(mut self, architecture: S) -> Self {
        self.architectures.insert(architecture.into());
        self
    }

    /// Add several architectures.
    pub fn architectures<I, S>(mut self, architectures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.architectures
            .extend(architectures.into_iter().map(Into::into));
        self
    }

    /// Set the components.
    pub fn components(mut self, components: Vec<String>) -> Self {
        self.release.components = components;
        self
    }

    /// Set the description.
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.release.description = description.into();
        self
    }

    /// Add a file.
    pub fn add_file(mut self, file: HashedFile) -> Self {
        self.release.add_file(file);
        self
    }

    /// Build the Release.
    pub fn build(mut self) -> Release {
        self.release.architectures = self.architectures.into_iter().collect();
        self.release
    }
}

impl Default for ReleaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
